//! Conversation events for live rendering of an in-flight operation.

use serde::{Deserialize, Serialize};

/// Which public entry point started an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Send,
    Edit { index: usize },
    Regenerate { index: usize },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Send => "send",
            Operation::Edit { .. } => "edit",
            Operation::Regenerate { .. } => "regenerate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConversationEvent {
    /// Operation accepted; loading flag set
    Started { operation: Operation },
    /// Streamed text fragment, already appended to the partial buffer
    Delta(String),
    /// A message was appended at `index`
    MessageAppended { index: usize },
    /// The rate-limit pre-check refused the operation
    RateLimited,
    /// Operation failed; `error` is the user-facing text
    Failed { error: String },
    /// Operation ended (success or failure); loading flag cleared
    Finished {
        operation: Operation,
        duration_ms: u64,
    },
}

//! Independent conversations keyed by session id.
//!
//! Each session is guarded by its own async mutex. Operations never queue:
//! if a session is already running something, the new call fails with
//! [`ChatError::Busy`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use shared::chat::{ChatError, Message};
use shared::events::ConversationEvent;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::conversation::{ChatServices, Conversation, LiveState};

pub struct SessionStore {
    services: Arc<ChatServices>,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Conversation>>>>,
}

impl SessionStore {
    pub fn new(services: Arc<ChatServices>) -> Self {
        Self {
            services,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start an empty conversation; events for it go to `events` when given.
    pub fn create(&self, events: Option<mpsc::UnboundedSender<ConversationEvent>>) -> (Uuid, LiveState) {
        let id = Uuid::new_v4();
        let conversation = match events {
            Some(tx) => Conversation::with_events(Arc::clone(&self.services), tx),
            None => Conversation::new(Arc::clone(&self.services)),
        };
        let live = conversation.live();
        self.sessions
            .write()
            .insert(id, Arc::new(Mutex::new(conversation)));
        tracing::info!(session = %id, "Session created");
        (id, live)
    }

    pub fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().remove(&id).is_some();
        if removed {
            tracing::info!(session = %id, "Session removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub async fn send(&self, id: Uuid, input: &str) -> Result<(), ChatError> {
        self.acquire(id)?.send(input).await
    }

    pub async fn edit(&self, id: Uuid, index: usize, input: &str) -> Result<(), ChatError> {
        self.acquire(id)?.edit(index, input).await
    }

    pub async fn regenerate(&self, id: Uuid, index: usize) -> Result<(), ChatError> {
        self.acquire(id)?.regenerate(index).await
    }

    pub fn reset(&self, id: Uuid) -> Result<(), ChatError> {
        self.acquire(id)?.reset();
        Ok(())
    }

    /// Snapshot of the history. Fails with `Busy` while an operation runs.
    pub fn messages(&self, id: Uuid) -> Result<Vec<Message>, ChatError> {
        Ok(self.acquire(id)?.messages().to_vec())
    }

    pub fn last_error(&self, id: Uuid) -> Result<Option<String>, ChatError> {
        Ok(self.acquire(id)?.last_error().map(str::to_string))
    }

    fn acquire(&self, id: Uuid) -> Result<OwnedMutexGuard<Conversation>, ChatError> {
        let session = self
            .sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| ChatError::UnknownSession(id.to_string()))?;
        session.try_lock_owned().map_err(|_| {
            tracing::debug!(session = %id, "Session busy; rejecting operation");
            ChatError::Busy
        })
    }
}

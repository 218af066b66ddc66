//! Websearch Chat - terminal front end for the chat orchestration core.

mod commands;

use std::io::Write;
use std::path::PathBuf;

use agent_host::AgentHost;
use anyhow::{Context, Result};
use clap::Parser;
use shared::chat::{Message, Role};
use shared::events::ConversationEvent;
use shared::settings::AppSettings;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::commands::{Command, HELP};

#[derive(Parser, Debug)]
#[command(name = "websearch-chat")]
#[command(about = "Chat with web search, news, stocks, places, shopping and images", long_about = None)]
struct Args {
    /// Settings file (defaults to the per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the default settings to the settings path and exit
    #[arg(long)]
    init: bool,
}

fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com.local", "Websearch Chat", "WebsearchChat")
        .map(|proj| proj.config_dir().join("settings.json"))
}

fn print_history(messages: &[Message]) {
    if messages.is_empty() {
        println!("(no messages)");
        return;
    }
    for (i, message) in messages.iter().enumerate() {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        println!("[{}] {}: {}", i, who, message.text());
        for image in message.images() {
            println!("      image: {}", image.url);
        }
    }
}

/// Image URLs and citations of a freshly appended reply.
fn print_attachments(message: &Message) {
    for image in message.images() {
        println!("  image: {}", image.url);
    }
    if !message.links().is_empty() {
        println!("\nSources:");
        for link in message.links() {
            println!("  [{}] {} ({}) {}", link.sequence_number, link.title, link.domain, link.url);
        }
    }
}

async fn render_events(mut rx: mpsc::UnboundedReceiver<ConversationEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            ConversationEvent::Delta(text) => {
                print!("{}", text);
                let _ = std::io::stdout().flush();
            }
            ConversationEvent::RateLimited => println!("(rate limited)"),
            ConversationEvent::Failed { error } => println!("\nerror: {}", error),
            ConversationEvent::Finished { duration_ms, .. } => {
                tracing::debug!(duration_ms, "Turn finished");
                println!();
            }
            ConversationEvent::Started { .. } | ConversationEvent::MessageAppended { .. } => {}
        }
    }
}

async fn run_command(host: &AgentHost, session: Uuid, command: Command) -> Result<bool> {
    let sessions = host.sessions();
    let outcome = match command {
        Command::Send(text) => sessions.send(session, &text).await,
        Command::Edit { index, text } => sessions.edit(session, index, &text).await,
        Command::Regenerate { index } => sessions.regenerate(session, index).await,
        Command::History => {
            print_history(&sessions.messages(session)?);
            return Ok(true);
        }
        Command::Reset => {
            sessions.reset(session)?;
            println!("Conversation cleared.");
            return Ok(true);
        }
        Command::Help => {
            println!("{}", HELP);
            return Ok(true);
        }
        Command::Quit => return Ok(false),
    };

    // Validation errors never reach the event stream.
    if let Err(e) = &outcome {
        if matches!(
            e,
            shared::chat::ChatError::InvalidIndex { .. } | shared::chat::ChatError::NoPriorUserMessage { .. }
        ) {
            println!("error: {}", e.user_message());
        }
        return Ok(true);
    }

    if let Some(reply) = sessions.messages(session)?.last().filter(|m| m.role == Role::Assistant) {
        print_attachments(reply);
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let path = args
        .config
        .or_else(config_path)
        .context("Could not determine a settings path; pass --config")?;

    if args.init {
        AppSettings::default().save(&path)?;
        println!("Wrote default settings to {}", path.display());
        return Ok(());
    }

    let settings = AppSettings::load_or_default(&path)?;
    tracing::info!(path = %path.display(), "Settings loaded");

    let host = AgentHost::new(settings)?;
    let (tx, rx) = mpsc::unbounded_channel();
    let (session, _live) = host.sessions().create(Some(tx));
    let renderer = tokio::spawn(render_events(rx));

    println!("websearch-chat ready. Type /help for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match commands::parse(&line) {
            Ok(Some(command)) => {
                if !run_command(&host, session, command).await? {
                    break;
                }
            }
            Ok(None) => {}
            Err(message) => println!("{}", message),
        }
    }

    host.sessions().remove(session);
    drop(host);
    let _ = renderer.await;
    Ok(())
}

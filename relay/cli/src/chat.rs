//! Interactive chat loop
//!
//! Each stdin line is either a slash command or a message for the active
//! thread. The active thread is snapshotted into the request context when a
//! message is sent, so `/thread` never retargets a response already running.

use anyhow::{Context, Result};
use relay_core::{ActiveThread, AgentClient, EventBus, RelayConfig, RequestContext, TodoBoard};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::output::{self, ChatSink};
use crate::pump_to;

/// One line of chat input
#[derive(Debug, PartialEq, Eq)]
enum ChatCommand {
    /// `/thread <id>`
    Thread(String),
    /// `/forget`
    Forget,
    /// `/sessions`
    Sessions,
    /// `/todos`
    Todos,
    /// `/quit` or `/exit`
    Quit,
    /// `/help`
    Help,
    /// Unrecognised slash command
    Unknown(String),
    /// Anything else
    Message(String),
    /// Blank line
    Empty,
}

impl ChatCommand {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Message(line.to_string());
        };

        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(n, r)| (n, r.trim()));
        match name {
            "thread" if !rest.is_empty() => Self::Thread(rest.to_string()),
            "forget" => Self::Forget,
            "sessions" => Self::Sessions,
            "todos" => Self::Todos,
            "quit" | "exit" => Self::Quit,
            "help" => Self::Help,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

const HELP: &str = "\
/thread <id>  switch the active thread
/forget       drop the active thread's session and cancel its responses
/sessions     list thread bindings
/todos        show the todo board
/quit         exit";

fn status(message: &str) {
    eprintln!("» {message}");
}

/// Run the chat until stdin closes, `/quit`, or Ctrl+C at the prompt
pub async fn run(config: &RelayConfig, thread: String, token: Option<String>) -> Result<()> {
    let bus = EventBus::new();
    let board = TodoBoard::new();
    let _feeder = board.attach(&bus);

    let client = AgentClient::from_config(config)
        .await
        .context("Failed to set up agent client")?
        .with_bus(bus);
    info!(transport = client.transport_name(), "Chat started");

    let active = ActiveThread::new();
    active.set(Some(thread.clone()));
    let watch = active.watch();
    status(&format!("thread {thread}, /help for commands"));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted at prompt");
                None
            }
        };
        let Some(line) = line else {
            break;
        };

        match ChatCommand::parse(&line) {
            ChatCommand::Empty => {}
            ChatCommand::Quit => break,
            ChatCommand::Help => status(HELP),
            ChatCommand::Unknown(line) => status(&format!("unknown command: {line}")),
            ChatCommand::Thread(id) => {
                status(&format!("thread {id}"));
                active.set(Some(id));
            }
            ChatCommand::Forget => {
                if let Some(id) = active.get() {
                    let aborted = client.delete_thread(&id);
                    status(&format!("forgot thread {id} ({aborted} responses cancelled)"));
                }
            }
            ChatCommand::Sessions => {
                output::write_sessions(&mut std::io::stdout().lock(), &client.sessions().list())?;
            }
            ChatCommand::Todos => {
                output::write_todos(&mut std::io::stdout().lock(), &board.lists())?;
            }
            ChatCommand::Message(text) => {
                let ctx = RequestContext::from_active(&watch).with_token(token.clone());
                let mut stream = client.send(text, &ctx);
                let mut sink = ChatSink::stdout();
                if !pump_to(&mut stream, &mut sink).await? {
                    status("cancelled");
                }
            }
        }
    }

    client.shutdown();
    if let Err(e) = client.sessions().flush().await {
        debug!(error = %e, "Session store not written");
    }
    Ok(())
}

//! agent-relay - Command-Line Surface for the Agent Relay
//!
//! Sends messages to the agent backend and prints the translated chunk
//! stream. Logs go to stderr so stdout stays machine-readable.
//!
//! # Usage
//!
//! ```bash
//! # One request, NDJSON chunks on stdout
//! agent-relay send --thread t1 "Summarise the logs"
//!
//! # Interactive chat on a thread
//! agent-relay chat --thread t1
//!
//! # Over HTTP instead of WebSocket
//! agent-relay --transport http --http-url http://agent:10338/agentOS/v1/stream send hi
//!
//! # Session store maintenance
//! agent-relay sessions list
//! agent-relay sessions remove t1
//!
//! # Verbose logging
//! RUST_LOG=debug agent-relay send hi
//! ```
//!
//! # Signals
//!
//! - `Ctrl+C` while a response streams: abort it, no completion is printed
//! - `Ctrl+C` again: exit

mod chat;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relay_core::{
    load_config_from_path, AgentClient, ConfigOverrides, RelayConfig, RequestContext,
    ResponseStream, ThreadSessionStore, TransportKind,
};
use tracing::{debug, info, warn};

use output::ChunkSink;

/// Exit code after a second interrupt
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// agent-relay - Stream agent responses as renderer chunks
#[derive(Parser, Debug)]
#[command(name = "agent-relay")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, global = true, env = "AGENT_RELAY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Transport to the agent (websocket, http)
    #[arg(short = 't', long, global = true, value_name = "KIND")]
    transport: Option<TransportKind>,

    /// WebSocket endpoint
    #[arg(long, global = true, value_name = "URL")]
    ws_url: Option<String>,

    /// HTTP streaming endpoint
    #[arg(long, global = true, value_name = "URL")]
    http_url: Option<String>,

    /// Thread-to-session store file
    #[arg(long, global = true, value_name = "PATH")]
    session_store: Option<PathBuf>,

    /// Connect timeout in milliseconds (0 disables)
    #[arg(long, global = true, value_name = "MS")]
    connect_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short = 'l',
        long,
        global = true,
        env = "AGENT_RELAY_LOG_LEVEL",
        default_value = "warn"
    )]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one message and print the response chunks as NDJSON
    Send {
        /// Thread the message belongs to
        #[arg(long)]
        thread: Option<String>,

        /// Bearer token
        #[arg(long, env = "AGENT_RELAY_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Message text (words are joined with spaces)
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Interactive chat reading messages from stdin
    Chat {
        /// Initial thread
        #[arg(long, default_value = "default")]
        thread: String,

        /// Bearer token
        #[arg(long, env = "AGENT_RELAY_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Inspect or edit the thread-to-session store
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum SessionsAction {
    /// Print every binding as `thread<TAB>session`
    List,
    /// Forget every binding
    Clear,
    /// Forget one thread's binding
    Remove {
        /// Thread id
        thread: String,
    },
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(transport) = self.transport {
            overrides = overrides.with_transport(transport);
        }
        if let Some(url) = &self.ws_url {
            overrides = overrides.with_ws_url(url.clone());
        }
        if let Some(url) = &self.http_url {
            overrides = overrides.with_http_url(url.clone());
        }
        if let Some(path) = &self.session_store {
            overrides = overrides.with_session_store(path.clone());
        }
        if let Some(ms) = self.connect_timeout_ms {
            overrides = overrides.with_connect_timeout_ms(ms);
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("agent_relay={level},relay_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Resolve configuration: file, then environment, then flags
fn resolve_config(args: &Args) -> Result<RelayConfig> {
    let mut config = load_config_from_path(args.config.clone())
        .context("Failed to load relay configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid relay configuration")?;
    Ok(config)
}

/// Drain `stream` into `sink`, aborting on the first Ctrl+C
///
/// Returns `false` if the stream was aborted.
pub(crate) async fn pump_to(stream: &mut ResponseStream, sink: &mut impl ChunkSink) -> Result<bool> {
    let mut aborted = false;
    loop {
        tokio::select! {
            chunk = stream.next() => match chunk {
                Some(chunk) => sink.chunk(&chunk)?,
                None => break,
            },
            interrupt = tokio::signal::ctrl_c() => {
                interrupt.context("Failed to listen for Ctrl+C")?;
                if aborted {
                    warn!("Interrupted twice, exiting");
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
                info!(request_id = %stream.request_id(), "Aborting response");
                stream.abort();
                aborted = true;
            }
        }
    }
    sink.flush()?;
    Ok(!aborted)
}

async fn run_send(
    config: &RelayConfig,
    thread: Option<String>,
    token: Option<String>,
    message: &[String],
) -> Result<()> {
    let client = AgentClient::from_config(config)
        .await
        .context("Failed to set up agent client")?;
    let ctx = RequestContext {
        thread_id: thread,
        auth_token: token,
    };

    let mut stream = client.send(message.join(" "), &ctx);
    debug!(request_id = %stream.request_id(), "Request sent");

    let mut sink = output::NdjsonSink::stdout();
    if !pump_to(&mut stream, &mut sink).await? {
        info!("Response aborted");
    }
    Ok(())
}

async fn run_sessions(config: &RelayConfig, action: &SessionsAction) -> Result<()> {
    let path = config
        .session_store
        .as_ref()
        .context("No session store path configured (use --session-store)")?;
    let store = ThreadSessionStore::open(path)
        .await
        .with_context(|| format!("Failed to open session store: {}", path.display()))?;

    match action {
        SessionsAction::List => {
            output::write_sessions(&mut std::io::stdout().lock(), &store.list())?;
        }
        SessionsAction::Clear => {
            let count = store.len();
            store.clear_all();
            info!(count, "Cleared session bindings");
        }
        SessionsAction::Remove { thread } => match store.remove_session_id(thread) {
            Some(session) => info!(thread_id = %thread, session_id = %session, "Removed binding"),
            None => warn!(thread_id = %thread, "Thread has no session binding"),
        },
    }
    store
        .flush()
        .await
        .context("Failed to write session store")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let config = resolve_config(&args)?;
    info!(
        transport = %config.agent.transport,
        endpoint = %config.agent.endpoint(),
        source = ?config.source(),
        "Configuration loaded"
    );

    match args.command {
        Command::Send {
            thread,
            token,
            message,
        } => run_send(&config, thread, token, &message).await,
        Command::Chat { thread, token } => chat::run(&config, thread, token).await,
        Command::Sessions { action } => run_sessions(&config, &action).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_send_with_global_flags() {
        let args = Args::try_parse_from([
            "agent-relay",
            "send",
            "--thread",
            "t1",
            "--transport",
            "http",
            "--connect-timeout-ms",
            "250",
            "hello",
            "there",
        ])
        .unwrap();

        assert_eq!(args.transport, Some(TransportKind::Http));
        let Command::Send {
            thread, message, ..
        } = &args.command
        else {
            panic!("expected send");
        };
        assert_eq!(thread.as_deref(), Some("t1"));
        assert_eq!(message.join(" "), "hello there");

        let overrides = args.overrides();
        assert_eq!(overrides.transport, Some(TransportKind::Http));
        assert_eq!(overrides.connect_timeout_ms, Some(250));
        assert!(overrides.ws_url.is_none());
    }

    #[test]
    fn test_send_requires_message() {
        assert!(Args::try_parse_from(["agent-relay", "send"]).is_err());
    }

    #[test]
    fn test_parse_sessions_remove() {
        let args = Args::try_parse_from(["agent-relay", "sessions", "remove", "t9"]).unwrap();
        let Command::Sessions { action } = args.command else {
            panic!("expected sessions");
        };
        assert_eq!(
            action,
            SessionsAction::Remove {
                thread: "t9".to_string()
            }
        );
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[agent]\ntransport = \"websocket\"\nws_url = \"ws://file:1/ws\"\n"
        )
        .unwrap();

        let args = Args::try_parse_from([
            "agent-relay",
            "--config",
            file.path().to_str().unwrap(),
            "--ws-url",
            "ws://flag:2/ws",
            "sessions",
            "list",
        ])
        .unwrap();
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.agent.ws_url, "ws://flag:2/ws");
        assert_eq!(config.agent.transport, TransportKind::Websocket);
    }

    #[tokio::test]
    async fn test_sessions_commands_edit_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thread-sessions.json");
        let store = ThreadSessionStore::open(&path).await.unwrap();
        store.set_session_id("a", "S-a");
        store.set_session_id("b", "S-b");
        store.flush().await.unwrap();

        let mut config = RelayConfig::new();
        config.session_store = Some(path.clone());

        run_sessions(
            &config,
            &SessionsAction::Remove {
                thread: "a".to_string(),
            },
        )
        .await
        .unwrap();
        let reopened = ThreadSessionStore::open(&path).await.unwrap();
        assert_eq!(reopened.list(), vec![("b".to_string(), "S-b".to_string())]);

        run_sessions(&config, &SessionsAction::Clear).await.unwrap();
        assert!(ThreadSessionStore::open(&path).await.unwrap().is_empty());
    }
}

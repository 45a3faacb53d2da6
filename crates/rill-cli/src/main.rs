//! rill - terminal front end for the streaming chat client

mod config;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rill_client::{ChatEvent, ChatSession, HttpTransport, SessionIdentity};
use tokio::io::{AsyncBufReadExt, BufReader};

/// rill - chat with a document-aware agent service
#[derive(Parser, Debug)]
#[command(name = "rill")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the chat service (overrides config and RILL_BASE_URL)
    #[arg(short, long)]
    base_url: Option<String>,

    /// Send a single message and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Upload a document before the first message
    #[arg(short, long)]
    upload: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Forget the stored session identity and start a new conversation
    #[arg(long)]
    reset_session: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("rill=debug,rill_client=debug")
            .init();
    }

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    if args.reset_session {
        let path = SessionIdentity::storage_path();
        match std::fs::remove_file(&path) {
            Ok(()) => println!("Session identity cleared."),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                println!("No stored session identity.");
            }
            Err(e) => anyhow::bail!("failed to clear session identity: {}", e),
        }
        if args.command.is_none() && args.upload.is_none() {
            return Ok(());
        }
    }

    let config = config::Config::load();
    let base_url = args
        .base_url
        .or_else(|| std::env::var("RILL_BASE_URL").ok().filter(|v| !v.is_empty()))
        .or(config.base_url)
        .context("no base URL configured; pass --base-url, set RILL_BASE_URL, or run --init-config")?;

    let identity = SessionIdentity::load_or_create();
    if !identity.is_persistent() {
        eprintln!("Warning: session identity could not be persisted; this conversation will not survive a restart.");
    }

    let transport = Arc::new(HttpTransport::new(base_url));
    let mut session = ChatSession::new(transport, identity);

    let printer = spawn_printer(session.subscribe());

    if let Some(path) = &args.upload {
        upload_path(&mut session, path).await?;
    }

    let result = if let Some(message) = &args.command {
        session.send_message(message).await;
        Ok(())
    } else {
        run_repl(&mut session).await
    };

    // Dropping the session closes the event channel, letting the printer
    // drain whatever is buffered and exit.
    drop(session);
    let _ = printer.await;
    result
}

/// Drain session events and render them as they arrive. Deltas print
/// incrementally; a turn that produced no deltas (failure notice, or a
/// full-replace-only stream) prints its committed message instead.
fn spawn_printer(
    mut rx: tokio::sync::broadcast::Receiver<ChatEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut printed_delta = false;
        while let Ok(event) = rx.recv().await {
            match event {
                ChatEvent::TurnStart => {
                    printed_delta = false;
                }
                ChatEvent::Delta { text } => {
                    printed_delta = true;
                    print!("{}", text);
                    let _ = std::io::stdout().flush();
                }
                ChatEvent::TurnEnd { message } => {
                    if printed_delta {
                        println!();
                    } else {
                        println!("{}", message.content);
                    }
                }
                ChatEvent::UploadEnd { message } => {
                    println!("{}", message.content);
                }
            }
        }
    })
}

async fn upload_path(session: &mut ChatSession, path: &str) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path))?;
    let filename = Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_owned();
    session.upload_document(&filename, bytes).await;
    Ok(())
}

async fn run_repl(session: &mut ChatSession) -> anyhow::Result<()> {
    println!("rill - session {}", session.session_id());
    println!("Type a message, /upload <path> to add a document, /quit to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            _ if line.starts_with("/upload") => {
                let path = line.trim_start_matches("/upload").trim();
                if path.is_empty() {
                    println!("Usage: /upload <path>");
                    continue;
                }
                if let Err(e) = upload_path(session, path).await {
                    eprintln!("{}", e);
                }
            }
            _ => session.send_message(line).await,
        }
    }
    Ok(())
}

//! pairlink: a terminal peer. Listens and/or dials over TCP, sends typed lines,
//! prints every connection event.

mod config;
mod console;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use pairlink_runtime::tcp::TcpTransport;
use pairlink_runtime::{ConnectionManager, EventStream, ManagerError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use console::Command;

#[derive(Debug, Parser)]
#[command(name = "pairlink", version, about = "Single-peer link over TCP")]
struct Cli {
    /// Config file (default: ~/.config/pairlink/config.toml, then /etc/pairlink/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local listen address; overrides config
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Peer to dial after startup; overrides config
    #[arg(short, long)]
    dial: Option<String>,

    /// Do not listen at startup
    #[arg(long)]
    no_listen: bool,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut cfg = config::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        cfg.listen = listen;
    }
    if cli.dial.is_some() {
        cfg.dial = cli.dial.clone();
    }
    tracing::info!(listen = %cfg.listen, "pairlink {}", env!("CARGO_PKG_VERSION"));

    let (manager, events) = ConnectionManager::new(TcpTransport::new(cfg.listen), cfg.manager.clone());
    tokio::spawn(print_events(events));

    if !cli.no_listen {
        manager.start().await?;
    }
    if let Some(peer) = &cfg.dial {
        manager.dial(peer).await?;
    }

    tokio::select! {
        result = command_loop(&manager) => result?,
        result = shutdown_signal() => result?,
    }
    manager.stop().await;
    Ok(())
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn print_events(mut events: EventStream) {
    while let Some(event) = events.recv().await {
        println!("{}", console::render(&event));
    }
}

/// Read stdin lines until EOF or /quit.
async fn command_loop(manager: &ConnectionManager) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(command) = console::parse(&line) else {
            continue;
        };
        let outcome = match command {
            Command::Start => manager.start().await,
            Command::Stop => {
                manager.stop().await;
                Ok(())
            }
            Command::Dial(peer) => manager.dial(&peer).await,
            Command::Send(bytes) => manager.send(bytes),
            Command::Status => {
                let roles = manager.active_roles();
                match manager.connected_peer() {
                    Some(peer) => println!("state: {} ({})", manager.state(), peer),
                    None => println!("state: {}", manager.state()),
                }
                println!(
                    "roles: listener={} initiator={} session={}",
                    roles.listener, roles.initiator, roles.session
                );
                Ok(())
            }
            Command::Help => {
                println!("{}", console::HELP);
                Ok(())
            }
            Command::Quit => break,
            Command::Unknown(name) => {
                eprintln!("unknown command /{}; try /help", name);
                Ok(())
            }
        };
        match outcome {
            Ok(()) => {}
            Err(ManagerError::NotConnected) => eprintln!("not connected; /dial a peer or wait for one"),
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}

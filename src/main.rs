//! cad-bridge-mcp: owner-thread command bridge for AI-driven CAD viewports
//!
//! `serve` runs the tool server next to the host's owner thread; `bridge`
//! runs the stdio MCP front end that forwards tool calls to it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use cad_bridge_mcp::config::{self, Config};
use cad_bridge_mcp::diagnostics::Diagnostics;
use cad_bridge_mcp::dispatcher::Dispatcher;
use cad_bridge_mcp::executor::Executor;
use cad_bridge_mcp::mcp::McpServer;
use cad_bridge_mcp::session::Session;
use cad_bridge_mcp::tcp::{TcpServer, ToolClient};
use cad_bridge_mcp::tools::ToolRegistry;

/// Owner-thread command bridge exposing a CAD viewport to AI assistants.
#[derive(Parser, Debug)]
#[command(name = "cad-bridge-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the tool server and the host's owner thread (default)
    Serve,
    /// Run the stdio MCP bridge to a running tool server
    Bridge,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Logs go to stderr; stdout carries the MCP stream in bridge mode.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nConfig read from: {}", default_path.display());
                    eprintln!("See config/example-config.json for the format");
                }
            }
            return ExitCode::FAILURE;
        }
    };

    init_tracing(get_log_level(args.verbose, args.quiet, &cfg.logging.level));

    let command = args.command.unwrap_or(Command::Serve);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        ?command,
        "Starting cad-bridge-mcp"
    );

    let runtime = match command {
        Command::Serve => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build(),
        Command::Bridge => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build(),
    };
    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Could not create the async runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = match command {
        Command::Serve => runtime.block_on(serve(&cfg)),
        Command::Bridge => runtime.block_on(bridge(&cfg)),
    };

    match result {
        Ok(()) => {
            info!("Shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn serve(cfg: &Config) -> Result<(), BoxError> {
    let registry = Arc::new(ToolRegistry::builtin()?);
    let diagnostics = Diagnostics::new();

    let session_config = cfg.clone();
    let session_diagnostics = diagnostics.clone();
    let (executor, owner) = Executor::spawn(
        "cad-owner",
        move || Session::from_config(&session_config, session_diagnostics),
        diagnostics,
    )?;
    info!(tools = registry.len(), "Owner thread started");

    let dispatcher = Dispatcher::new(registry, executor.clone(), cfg.executor.timeout());
    let handle = TcpServer::new(dispatcher, &cfg.server)
        .start(&cfg.server.address())
        .await?;
    info!(address = %handle.local_addr(), "Ready for tool calls");

    shutdown_signal().await?;

    handle.close().await?;
    Session::teardown(&executor, cfg.executor.timeout()).await;
    executor.shutdown();
    // The owner thread is a plain OS thread; joining blocks.
    tokio::task::spawn_blocking(move || owner.join()).await??;
    Ok(())
}

async fn bridge(cfg: &Config) -> Result<(), BoxError> {
    let registry = ToolRegistry::builtin()?;
    let client = ToolClient::new(cfg.bridge.address(), cfg.bridge.timeout());
    info!(address = client.address(), "Forwarding tool calls");

    let mut server = McpServer::new(client, registry.definitions());
    server.run().await?;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
    }
    Ok(())
}

#[cfg(windows)]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");
    Ok(())
}

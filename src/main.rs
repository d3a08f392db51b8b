//! Skill Bridge - Entry Point
//!
//! Runs the bundled notes skill over stdio. stdout carries protocol frames
//! only; all logging goes to stderr.

use skillbridge::config::LogFormat;
use skillbridge::{notes, Config, ServeOutcome, SkillServer};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Skill Bridge v{}", env!("CARGO_PKG_VERSION"));
        eprintln!();
        eprintln!("Usage: skillbridge");
        eprintln!();
        eprintln!("Speaks newline-delimited JSON-RPC 2.0 on stdin/stdout.");
        eprintln!();
        eprintln!("Environment variables:");
        eprintln!("  SKILL_RPC_TIMEOUT_SECS  Reverse-call timeout (default: 30)");
        eprintln!("  SKILL_DATA_DIR          Initial data directory");
        eprintln!("  SKILL_LOG_FORMAT        json (default) or text");
        eprintln!("  RUST_LOG                Log filter (default: info)");
        return Ok(());
    }

    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    match config.log_format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
    }

    info!("Skill Bridge v{}", env!("CARGO_PKG_VERSION"));

    let server = SkillServer::new(notes::notes_skill(), config)?;
    let outcome = server.run_stdio().await?;
    info!(?outcome, "Exiting");

    if outcome == ServeOutcome::Shutdown {
        // the ack is already flushed; a pending blocking stdin read would
        // otherwise keep the runtime alive until the host closes the pipe
        std::process::exit(0);
    }

    Ok(())
}

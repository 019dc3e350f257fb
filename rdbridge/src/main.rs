//! rdbridge — entry point.
//!
//! ```text
//! rdbridge                      Run the session bridge
//! rdbridge --session-id <id>   Override the session id
//! rdbridge --config <path>     Load a custom config TOML
//! rdbridge --gen-config        Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rdbridge::config::BridgeConfig;
use rdbridge::platform;
use rdbridge::session::Bridge;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rdbridge", about = "RDP to web gateway session bridge")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "rdbridge.toml")]
    config: PathBuf,

    /// Remote session id (overrides config and environment).
    #[arg(short, long)]
    session_id: Option<u32>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&BridgeConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = BridgeConfig::load(&cli.config);
    if let Some(id) = cli.session_id {
        config.session.id = id;
    }

    init_tracing(&config)?;

    info!("rdbridge v{}", env!("CARGO_PKG_VERSION"));

    // Session id 0 disables the whole subsystem.
    if config.session.id == 0 {
        info!("session id 0: bridge disabled, exiting");
        return Ok(());
    }
    info!("session id: {}", config.session.id);

    let facades = platform::native_facades()?;
    let bridge = Bridge::new(
        config,
        facades.rdp,
        facades.surface,
        facades.pointer,
        facades.spooler,
    );

    // Ctrl-C tears the session down like a gateway CLO would.
    let state = bridge.state().clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received — shutting down");
        state.shutdown();
    });

    bridge.run().await?;
    Ok(())
}

/// Initialize tracing, redirecting output to a per-process log file when
/// the debug-log knob is set.
fn init_tracing(config: &BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if config.logging.debug_log
        && let Some(log_dir) = BridgeConfig::log_dir()
    {
        std::fs::create_dir_all(&log_dir)?;
        let path = log_dir.join(format!("rdbridge.{}.log", std::process::id()));
        let file = std::sync::Arc::new(std::fs::File::create(&path)?);
        builder.with_ansi(false).with_writer(file).init();
        return Ok(());
    }

    builder.init();
    Ok(())
}

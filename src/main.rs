use anyhow::Result;
use clap::Parser;
use nas_engine::{config::Config, server};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/Default.toml")]
    config: String,

    /// Port to listen on for metrics (overrides config)
    #[arg(short, long, env = "NAS_ENGINE_PORT")]
    port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long, env = "NAS_ENGINE_ADDR")]
    addr: Option<String>,

    /// Also track loop devices as disks
    #[arg(long)]
    include_loop_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting NAS engine v{}", env!("CARGO_PKG_VERSION"));

    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(&args.config)?;

    // Override with CLI arguments if provided
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if args.include_loop_devices {
        config.monitor.include_loop_devices = true;
    }

    info!("Configuration loaded successfully");
    info!(
        "Monitor interval: {}s, scheduler tick: {}s, {} seeded policies",
        config.monitor.base_interval_seconds,
        config.scheduler.tick_seconds,
        config.policies.len()
    );
    info!(
        "Metrics endpoint: http://{}:{}/metrics",
        config.server.addr, config.server.port
    );

    if let Err(e) = server::start(config).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

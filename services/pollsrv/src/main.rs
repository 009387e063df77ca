//! pollsrv binary
//!
//! Loads the configuration, sets up logging and polls every configured
//! device at a fixed interval until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use common::{cancel_on_shutdown, init_logging, LogFormat};
use errors::GridpollResult;
use pollsrv::{LogPublisher, PollOrchestrator, PollsrvConfig, Publisher};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pollsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Register polling service for inverters, loggers, meters and PCS units",
    long_about = None
)]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long, env = "GRIDPOLL_CONFIG", default_value = "config/pollsrv.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Validation mode - only validate configuration without polling
    #[arg(long)]
    validate: bool,

    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> GridpollResult<()> {
    let args = Args::parse();

    let mut config = PollsrvConfig::load(&args.config)?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    init_logging("pollsrv", &config.logging)?;
    info!(
        "pollsrv v{} starting with {}",
        env!("CARGO_PKG_VERSION"),
        args.config.display()
    );
    config.log_summary(&args.config);

    if args.validate {
        info!(
            "Validation completed successfully: {} devices on {} transports",
            config.devices.len(),
            config.transports.len()
        );
        return Ok(());
    }

    let publisher: Arc<dyn Publisher> = match config.publish.format {
        LogFormat::Json => Arc::new(LogPublisher::json()),
        LogFormat::Text => Arc::new(LogPublisher::new()),
    };
    let mut orchestrator = PollOrchestrator::from_config(&config, publisher)?;

    let shutdown = CancellationToken::new();
    let signals = cancel_on_shutdown(shutdown.clone());

    if args.once {
        let report = orchestrator.run_cycle(&shutdown).await;
        for device in &report.devices {
            info!("{}: {:?}", device.device, device.outcome);
        }
        orchestrator.close_all().await;
    } else {
        orchestrator.run(config.poll_interval(), shutdown).await;
    }

    signals.abort();
    info!("pollsrv stopped");
    Ok(())
}

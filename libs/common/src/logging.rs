//! Logging bootstrap for gridpoll services
//!
//! Console output always uses the bracketed-level format:
//! `2025-12-02T00:50:44.809Z [INFO] message`. When a log directory is
//! configured, a daily rolling file is written as well, in the same text
//! format or as JSON lines.

use errors::{GridpollError, GridpollResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] message`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking file writer flushing for the life of the process
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging section of the service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `pollsrv=debug,info`
    pub level: String,
    /// Format of the file output
    pub format: LogFormat,
    /// Directory for daily rolling files; console only when absent
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            directory: None,
        }
    }
}

/// Resolve the filter directive: RUST_LOG wins over the configured level
pub fn filter_directive(configured: &str) -> String {
    match std::env::var("RUST_LOG") {
        Ok(env) if !env.trim().is_empty() => env,
        _ => configured.to_string(),
    }
}

/// Initialize the global subscriber
///
/// Fails if a global subscriber is already installed or the log directory
/// cannot be created.
pub fn init_logging(service_name: &str, config: &LoggingConfig) -> GridpollResult<()> {
    let directive = filter_directive(&config.level);
    let env_filter = EnvFilter::try_new(&directive).map_err(|e| {
        GridpollError::InvalidConfig {
            field: "logging.level".to_string(),
            reason: format!("{}: {}", directive, e),
        }
    })?;

    let console_layer = fmt::layer()
        .with_ansi(true)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, format!("{service_name}.log"));
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
            match guards.lock() {
                Ok(mut guards) => guards.push(guard),
                Err(poisoned) => poisoned.into_inner().push(guard),
            }

            let layer = match config.format {
                LogFormat::Json => fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_level(true)
                    .with_target(true)
                    .boxed(),
                LogFormat::Text => fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .event_format(BracketedLevelFormat)
                    .boxed(),
            };
            Some(layer)
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| GridpollError::StartupFailed(format!("Logging init failed: {}", e)))?;

    tracing::info!(
        "Logging: {} @ {} ({})",
        service_name,
        config
            .directory
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "console".to_string()),
        directive
    );
    Ok(())
}

//! gridpoll basic library
//!
//! Provides plumbing shared by the gridpoll service:
//! - logging bootstrap
//! - configuration file loading with environment overrides
//! - graceful shutdown signals

pub mod config_loader;
pub mod logging;
pub mod shutdown;

pub use config_loader::{load_config_from_file, ConfigFormat, ENV_PREFIX};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use shutdown::{cancel_on_shutdown, wait_for_shutdown};

// Re-export common dependencies
pub use serde;
pub use tokio;

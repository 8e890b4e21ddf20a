//! Log sink setup.
//!
//! Events go to the configured log file when one is set, otherwise to stderr.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("cannot open log file: {0}")]
    File(#[from] std::io::Error),

    #[error("logging already initialized: {0}")]
    Init(String),
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the level is not a valid filter directive, the log
/// file cannot be opened, or a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(&config.level)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match &config.path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    result.map_err(|err| LoggingError::Init(err.to_string()))
}

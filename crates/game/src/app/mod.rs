use std::io;

use engine::{ConfigError, StartupError};
use thiserror::Error;

pub(crate) mod balloons;
pub(crate) mod bootstrap;
pub(crate) mod feed;
pub(crate) mod loop_runner;
pub(crate) mod presets;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to start asset loader: {0}")]
    AssetWorker(#[source] io::Error),
    #[error("failed to start command feed: {0}")]
    CommandFeed(#[source] io::Error),
}

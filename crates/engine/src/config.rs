use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::catalog::DEFAULT_FULL_CATALOG_EVERY;
use crate::commands::{CommandOptions, DEFAULT_RECENT_COMMAND_CAPACITY};
use crate::geometry::Viewport;
use crate::population::DEFAULT_REPLAY_QUEUE_CAPACITY;

pub const DEFAULT_SCENE: &str = "balloons";
pub const DEFAULT_ACTOR_RELOAD_PERIOD_MS: f64 = 10_000.0;
pub const DEFAULT_SPAWN_PERIOD_MS: f64 = 5_000.0;
pub const DEFAULT_SCRIPT_EXTENSION: &str = "json";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub scene: String,
    pub actor_reload_period_ms: f64,
    pub spawn_period_ms: f64,
    pub script_extension: String,
    /// Fixed seed for reproducible spawn choices; entropy when absent.
    pub rng_seed: Option<u64>,
    pub viewport: Viewport,
    pub full_catalog_every: u32,
    pub replay_queue_capacity: usize,
    pub recent_command_capacity: usize,
    pub prefix_messages_with_method: bool,
    pub follow_scanned_actor_scene: bool,
    pub dismiss_hint_after_scan: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            scene: DEFAULT_SCENE.to_string(),
            actor_reload_period_ms: DEFAULT_ACTOR_RELOAD_PERIOD_MS,
            spawn_period_ms: DEFAULT_SPAWN_PERIOD_MS,
            script_extension: DEFAULT_SCRIPT_EXTENSION.to_string(),
            rng_seed: None,
            viewport: Viewport::default(),
            full_catalog_every: DEFAULT_FULL_CATALOG_EVERY,
            replay_queue_capacity: DEFAULT_REPLAY_QUEUE_CAPACITY,
            recent_command_capacity: DEFAULT_RECENT_COMMAND_CAPACITY,
            prefix_messages_with_method: false,
            follow_scanned_actor_scene: true,
            dismiss_hint_after_scan: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path} at {location}: {source}")]
    Parse {
        path: PathBuf,
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(path, &raw)
    }

    /// `path` is only used for error reporting.
    pub fn from_json(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let config: Self =
            serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
                let location = error.path().to_string();
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    location: if location.is_empty() {
                        ".".to_string()
                    } else {
                        location
                    },
                    source: error.into_inner(),
                }
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scene.trim().is_empty() {
            return Err(invalid("scene", "must not be empty"));
        }
        if self.script_extension.trim().is_empty() {
            return Err(invalid("script_extension", "must not be empty"));
        }
        check_period("actor_reload_period_ms", self.actor_reload_period_ms)?;
        check_period("spawn_period_ms", self.spawn_period_ms)?;
        if !(self.viewport.width > 0.0 && self.viewport.height > 0.0) {
            return Err(invalid(
                "viewport",
                format!(
                    "expected positive size, got {}x{}",
                    self.viewport.width, self.viewport.height
                ),
            ));
        }
        if self.full_catalog_every == 0 {
            return Err(invalid("full_catalog_every", "must be at least 1"));
        }
        if self.replay_queue_capacity == 0 {
            return Err(invalid("replay_queue_capacity", "must be at least 1"));
        }
        if self.recent_command_capacity == 0 {
            return Err(invalid("recent_command_capacity", "must be at least 1"));
        }
        Ok(())
    }

    pub fn command_options(&self) -> CommandOptions {
        CommandOptions {
            recent_capacity: self.recent_command_capacity,
            prefix_messages_with_method: self.prefix_messages_with_method,
            follow_scanned_actor_scene: self.follow_scanned_actor_scene,
            dismiss_hint_after_scan: self.dismiss_hint_after_scan,
        }
    }
}

fn check_period(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("expected positive milliseconds, got {value}")))
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

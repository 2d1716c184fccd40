//! Client configuration: built-in defaults, then an optional JSON file, then
//! environment overrides.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::animation::AnimationTuning;
use crate::app::LoopConfig;
use crate::camera::CameraTuning;
use crate::input::InputTuning;
use crate::session::SessionSettings;

pub const CONFIG_ENV_VAR: &str = "GRIDCLASH_CONFIG";
pub const SERVER_URL_ENV_VAR: &str = "GRIDCLASH_SERVER_URL";
pub const VIEWER_ENV_VAR: &str = "GRIDCLASH_VIEWER";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub server_url: String,
    /// Player name to play as; spectates when absent.
    pub viewer: Option<String>,
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub metrics_log_interval_ms: u64,
    pub camera: CameraTuning,
    pub animation: AnimationTuning,
    pub input: InputTuning,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080/ws".to_string(),
            viewer: None,
            window_title: "Gridclash".to_string(),
            window_width: 1280,
            window_height: 720,
            metrics_log_interval_ms: 1_000,
            camera: CameraTuning::default(),
            animation: AnimationTuning::default(),
            input: InputTuning::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file {path} at `{field}`: {source}")]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ClientConfig {
    /// Defaults, then the file named by `GRIDCLASH_CONFIG` when set, then
    /// the server URL and viewer overrides from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(env::VarError::NotPresent) => Self::default(),
            Err(source) => {
                return Err(ConfigError::EnvVar {
                    var: CONFIG_ENV_VAR,
                    source,
                })
            }
        };
        config.apply_overrides(|var| env::var(var));
        config.validate()?;
        info!(
            server_url = %config.server_url,
            viewer = config.viewer.as_deref().unwrap_or("spectator"),
            "config_loaded"
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text, path)
    }

    fn from_json(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(text);
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            field: error.path().to_string(),
            source: error.into_inner(),
        })
    }

    /// Applies environment overrides read through `lookup`. Unusable values
    /// are logged and leave the previous layer in place.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&'static str) -> Result<String, env::VarError>,
    {
        if let Some(url) = read_override(&lookup, SERVER_URL_ENV_VAR) {
            if is_websocket_url(&url) {
                self.server_url = url;
            } else {
                warn!(
                    env_var = SERVER_URL_ENV_VAR,
                    value = url.as_str(),
                    "invalid server url override; falling back to config"
                );
            }
        }
        if let Some(viewer) = read_override(&lookup, VIEWER_ENV_VAR) {
            let trimmed = viewer.trim();
            if trimmed.is_empty() {
                warn!(
                    env_var = VIEWER_ENV_VAR,
                    "empty viewer override; falling back to config"
                );
            } else {
                self.viewer = Some(trimmed.to_string());
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_websocket_url(&self.server_url) {
            return Err(invalid("server_url", "must start with ws:// or wss://"));
        }
        if self.window_width == 0 || self.window_height == 0 {
            return Err(invalid("window_width", "window size must be non-zero"));
        }
        let camera = &self.camera;
        if !(camera.min_zoom > 0.0 && camera.min_zoom <= camera.max_zoom) {
            return Err(invalid(
                "camera.min_zoom",
                "must be positive and not above camera.max_zoom",
            ));
        }
        if camera.zoom_step <= 0.0 {
            return Err(invalid("camera.zoom_step", "must be positive"));
        }
        if camera.min_cell_px <= 0.0 {
            return Err(invalid("camera.min_cell_px", "must be positive"));
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            camera: self.camera,
            animation: self.animation,
            input: self.input,
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            window_title: self.window_title.clone(),
            window_width: self.window_width,
            window_height: self.window_height,
            viewer: self.viewer.clone(),
            session: self.session_settings(),
            metrics_log_interval: Duration::from_millis(self.metrics_log_interval_ms),
        }
    }
}

fn read_override<F>(lookup: &F, var: &'static str) -> Option<String>
where
    F: Fn(&'static str) -> Result<String, env::VarError>,
{
    match lookup(var) {
        Ok(value) => Some(value),
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(env_var = var, error = %err, "unable to read env override; falling back to config");
            None
        }
    }
}

fn is_websocket_url(url: &str) -> bool {
    url.starts_with("ws://") || url.starts_with("wss://")
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

use std::{env, fs};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const CONFIG_FILE_VAR: &str = "OWS_SERVER_CONFIG";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("{var} must be a positive integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
}

/// Server configuration.
///
/// Built from defaults, then an optional JSON file named by
/// `OWS_SERVER_CONFIG`, then `OWS_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_address: String,
    /// Forces every request onto this project, whatever `MAP` says.
    pub project_file: Option<String>,
    /// Project used when a request has no `MAP` parameter.
    pub default_project: Option<String>,
    pub max_width: u32,
    pub max_height: u32,
    pub log_level: String,
    pub log_format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bind_address: "127.0.0.1:8000".to_string(),
            project_file: None,
            default_project: None,
            max_width: 4000,
            max_height: 4000,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from the process environment.
    pub fn load() -> Result<Settings, SettingsError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Loads settings reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Settings, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match lookup(CONFIG_FILE_VAR).filter(|p| !p.is_empty()) {
            Some(path) => Self::from_file(&path)?,
            None => Settings::default(),
        };

        let text = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let number = |var: &'static str| -> Result<Option<u32>, SettingsError> {
            match text(var) {
                Some(value) => value
                    .trim()
                    .parse::<u32>()
                    .map(Some)
                    .map_err(|_| SettingsError::InvalidNumber { var, value }),
                None => Ok(None),
            }
        };

        if let Some(bind) = text("OWS_SERVER_BIND") {
            settings.bind_address = bind;
        }
        if let Some(project) = text("OWS_PROJECT_FILE") {
            settings.project_file = Some(project);
        }
        if let Some(project) = text("OWS_SERVER_DEFAULT_PROJECT") {
            settings.default_project = Some(project);
        }
        if let Some(width) = number("OWS_SERVER_MAX_WIDTH")? {
            settings.max_width = width;
        }
        if let Some(height) = number("OWS_SERVER_MAX_HEIGHT")? {
            settings.max_height = height;
        }
        if let Some(level) = text("OWS_SERVER_LOG_LEVEL") {
            settings.log_level = level;
        }
        if let Some(format) = text("OWS_SERVER_LOG_FORMAT") {
            settings.log_format = format;
        }

        Ok(settings)
    }

    pub fn from_file(path: &str) -> Result<Settings, SettingsError> {
        let raw = fs::read(path).map_err(|source| SettingsError::Read {
            path: path.to_string(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Logs the effective configuration.
    pub fn log_summary(&self) {
        info!("Bind address: {}", self.bind_address);
        info!(
            "Project file: {}",
            self.project_file.as_deref().unwrap_or("<from MAP parameter>")
        );
        if let Some(default) = &self.default_project {
            info!("Default project: {}", default);
        }
        info!("Maximum map size: {}x{}", self.max_width, self.max_height);
        info!("Log level: {} ({})", self.log_level, self.log_format);
    }
}

//! Configuration layer: typed settings with layered precedence (file → env).

use std::{path::PathBuf, str::FromStr};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "foglio";
const DEFAULT_CONTENT_ROOT: &str = "posts";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub content: ContentSettings,
    pub logging: LoggingSettings,
}

/// Where documents and attachments live and how attachment URLs are built.
#[derive(Debug, Clone)]
pub struct ContentSettings {
    /// Base directory holding one document per post plus the `files/`
    /// attachment subtree. Created at startup if missing.
    pub root: PathBuf,
    /// Root-relative URL prefix under which the content root is served,
    /// e.g. `/posts`. Defaults to the root directory's name.
    pub public_prefix: String,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (files → `FOGLIO_*` env).
pub fn load() -> Result<Settings, LoadError> {
    load_from(None)
}

/// Load settings, additionally layering an explicit configuration file on
/// top of the defaults when one is supplied.
pub fn load_from(config_file: Option<&PathBuf>) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("FOGLIO").separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    Settings::from_raw(raw)
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            content: build_content_settings(raw.content)?,
            logging: build_logging_settings(raw.logging)?,
        })
    }
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let root = content
        .root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_ROOT));

    let public_prefix = match content.public_prefix {
        Some(prefix) => {
            let trimmed = prefix.trim().trim_end_matches('/');
            if trimmed.is_empty() || !trimmed.starts_with('/') {
                return Err(LoadError::invalid(
                    "content.public_prefix",
                    "must be a non-empty root-relative path such as `/posts`",
                ));
            }
            trimmed.to_string()
        }
        None => {
            let name = root
                .file_name()
                .and_then(|value| value.to_str())
                .ok_or_else(|| {
                    LoadError::invalid(
                        "content.root",
                        "directory name is not valid UTF-8; set content.public_prefix explicitly",
                    )
                })?;
            format!("/{name}")
        }
    };

    Ok(ContentSettings {
        root,
        public_prefix,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    content: RawContentSettings,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    root: Option<PathBuf>,
    public_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

//! Settings file parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use shipit_core::command::DEFAULT_ALLOWED_COMMANDS;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:7001";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_BUILD_COMMAND: &str = "npm run build";

/// User settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub cloudbuild: CloudBuildSettings,
    pub build: BuildSettings,
}

/// Where and how long to talk to the remote build service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudBuildSettings {
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub build_timeout: Duration,
}

impl Default for CloudBuildSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            build_timeout: DEFAULT_BUILD_TIMEOUT,
        }
    }
}

/// The command the build service runs, and which executables may be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub command: String,
    pub allowed_commands: Vec<String>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            command: DEFAULT_BUILD_COMMAND.to_string(),
            allowed_commands: DEFAULT_ALLOWED_COMMANDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Load settings from `path`; a missing file yields the defaults.
pub fn load_settings(path: &Path) -> ConfigResult<Settings> {
    if !path.exists() {
        debug!(path = %path.display(), "No settings file, using defaults");
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(path)?;
    parse_settings(&content)
}

/// Parse settings from KDL text. Unknown nodes are ignored.
pub fn parse_settings(kdl: &str) -> ConfigResult<Settings> {
    let doc: KdlDocument = kdl.parse()?;
    let mut settings = Settings::default();

    for node in doc.nodes() {
        match node.name().value() {
            "cloudbuild" => parse_cloudbuild(node, &mut settings.cloudbuild)?,
            "build" => parse_build(node, &mut settings.build)?,
            _ => {}
        }
    }

    Ok(settings)
}

fn parse_cloudbuild(node: &KdlNode, out: &mut CloudBuildSettings) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "endpoint" => {
                let endpoint = get_first_string_arg(child).unwrap_or_default();
                validate_endpoint(&endpoint)?;
                out.endpoint = endpoint;
            }
            "connect-timeout-ms" => {
                out.connect_timeout = get_millis(child, "cloudbuild.connect-timeout-ms")?;
            }
            "build-timeout-ms" => {
                out.build_timeout = get_millis(child, "cloudbuild.build-timeout-ms")?;
            }
            _ => {}
        }
    }

    Ok(())
}

fn parse_build(node: &KdlNode, out: &mut BuildSettings) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "command" => {
                let command = get_first_string_arg(child).unwrap_or_default();
                if command.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "build.command".to_string(),
                        message: "must not be empty".to_string(),
                    });
                }
                out.command = command;
            }
            "allow" => {
                let allowed = get_all_string_args(child);
                if allowed.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "build.allow".to_string(),
                        message: "expected at least one executable".to_string(),
                    });
                }
                out.allowed_commands = allowed;
            }
            _ => {}
        }
    }

    Ok(())
}

fn validate_endpoint(endpoint: &str) -> ConfigResult<()> {
    let url = url::Url::parse(endpoint).map_err(|e| ConfigError::InvalidValue {
        field: "cloudbuild.endpoint".to_string(),
        message: e.to_string(),
    })?;

    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ConfigError::InvalidValue {
            field: "cloudbuild.endpoint".to_string(),
            message: format!("unsupported scheme '{}', expected ws or wss", other),
        }),
    }
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_millis(node: &KdlNode, field: &str) -> ConfigResult<Duration> {
    let value = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer());

    match value {
        Some(ms) if ms > 0 => u64::try_from(ms)
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidValue {
                field: field.to_string(),
                message: format!("{} is out of range", ms),
            }),
        Some(ms) => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("{} must be positive", ms),
        }),
        None => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected an integer number of milliseconds".to_string(),
        }),
    }
}

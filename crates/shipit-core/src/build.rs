//! Build session types shared by the orchestrator and its callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An action reported by the remote build service.
///
/// The vocabulary is closed: anything the service sends that is not listed
/// here parses to [`BuildAction::Unknown`] and is treated as progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildAction {
    Prepare,
    Download,
    Install,
    Build,
    PrepareFailed,
    DownloadFailed,
    InstallFailed,
    Unknown(String),
}

impl BuildAction {
    /// Exact-match parse of the wire action.
    pub fn parse(action: &str) -> Self {
        match action {
            "prepare" => BuildAction::Prepare,
            "download" => BuildAction::Download,
            "install" => BuildAction::Install,
            "build" => BuildAction::Build,
            "prepare failed" => BuildAction::PrepareFailed,
            "download failed" => BuildAction::DownloadFailed,
            "install failed" => BuildAction::InstallFailed,
            other => BuildAction::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BuildAction::Prepare => "prepare",
            BuildAction::Download => "download",
            BuildAction::Install => "install",
            BuildAction::Build => "build",
            BuildAction::PrepareFailed => "prepare failed",
            BuildAction::DownloadFailed => "download failed",
            BuildAction::InstallFailed => "install failed",
            BuildAction::Unknown(raw) => raw.as_str(),
        }
    }

    /// Whether this action ends the session unsuccessfully.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            BuildAction::PrepareFailed | BuildAction::DownloadFailed | BuildAction::InstallFailed
        )
    }
}

impl std::fmt::Display for BuildAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{action, message}` extracted from a raw service message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEvent {
    pub action: BuildAction,
    pub message: String,
}

impl BuildEvent {
    pub fn new(action: BuildAction, message: impl Into<String>) -> Self {
        Self {
            action,
            message: message.into(),
        }
    }

    /// Parse a message shaped `{data: {action, payload: {message}}}`.
    /// Missing fields become an unknown action and an empty message.
    pub fn from_message(msg: &Value) -> Self {
        let action = msg
            .pointer("/data/action")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let message = msg
            .pointer("/data/payload/message")
            .and_then(Value::as_str)
            .unwrap_or_default();

        Self::new(BuildAction::parse(action), message)
    }
}

/// Parameters presented to the build service when a session is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    /// Git remote URL of the repository to build.
    pub repo: String,
    pub name: String,
    pub branch: String,
    pub version: String,
    pub build_command: String,
}

impl BuildRequest {
    /// Query parameters in wire order.
    pub fn query_pairs(&self) -> [(&'static str, &str); 5] {
        [
            ("repo", self.repo.as_str()),
            ("name", self.name.as_str()),
            ("branch", self.branch.as_str()),
            ("version", self.version.as_str()),
            ("buildCmd", self.build_command.as_str()),
        ]
    }
}

/// State of a build session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Building,
    Succeeded,
    Failed { reason: String },
    TimedOut,
    Disconnected,
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildState::Succeeded
                | BuildState::Failed { .. }
                | BuildState::TimedOut
                | BuildState::Disconnected
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildState::Succeeded)
    }
}

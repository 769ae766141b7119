use std::fmt;
use std::process::ExitStatus;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl ProcessState {
    /// States from which a new launch may begin.
    pub fn is_idle(self) -> bool {
        matches!(self, ProcessState::Stopped | ProcessState::Failed)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How the supervised process ended.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ExitDetail {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub at: DateTime<Utc>,
}

impl ExitDetail {
    pub fn from_status(status: &ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(status);
        #[cfg(not(unix))]
        let signal = None;

        ExitDetail {
            code: status.code(),
            signal,
            at: Utc::now(),
        }
    }

    pub fn unknown() -> Self {
        ExitDetail {
            code: None,
            signal: None,
            at: Utc::now(),
        }
    }
}

impl fmt::Display for ExitDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ProcessStatus {
    pub state: ProcessState,
    /// Profile of the current (or last failed) launch.
    pub profile: Option<String>,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_exit: Option<ExitDetail>,
    pub message: String,
}

impl Default for ProcessStatus {
    fn default() -> Self {
        ProcessStatus {
            state: ProcessState::Stopped,
            profile: None,
            pid: None,
            started_at: None,
            last_exit: None,
            message: "idle".to_string(),
        }
    }
}

/// Outcome of a start/stop request, returned to the control API as-is.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ControlResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
    pub status: ProcessStatus,
}

use thiserror::Error;

use super::types::ProcessState;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("supervisor busy: process is {0}")]
    Busy(ProcessState),
    #[error("unknown profile: {0}")]
    UnknownProfile(String),
    #[error("failed to launch profile {profile}: {source}")]
    Spawn {
        profile: String,
        #[source]
        source: std::io::Error,
    },
}

impl SupervisorError {
    /// Short machine-readable tag for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            SupervisorError::Busy(_) => "busy",
            SupervisorError::UnknownProfile(_) => "unknown_profile",
            SupervisorError::Spawn { .. } => "spawn_failed",
        }
    }
}

use crate::CoreError;
use serde::Serialize;
use std::fmt;

/// Phases of one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchPhase {
    Init,
    ManifestParsed,
    DependenciesResolved,
    Configured,
    Running,
    Completed,
    Failed,
}

impl LaunchPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, LaunchPhase::Completed | LaunchPhase::Failed)
    }
}

impl fmt::Display for LaunchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LaunchPhase::Init => "init",
            LaunchPhase::ManifestParsed => "manifest",
            LaunchPhase::DependenciesResolved => "resolve",
            LaunchPhase::Configured => "configure",
            LaunchPhase::Running => "run",
            LaunchPhase::Completed => "completed",
            LaunchPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub fn validate_transition(from: LaunchPhase, to: LaunchPhase) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (LaunchPhase::Init, LaunchPhase::ManifestParsed)
            | (LaunchPhase::ManifestParsed, LaunchPhase::DependenciesResolved)
            | (LaunchPhase::DependenciesResolved, LaunchPhase::Configured)
            | (LaunchPhase::Configured, LaunchPhase::Running)
            | (
                LaunchPhase::Running,
                LaunchPhase::Completed | LaunchPhase::Failed
            )
            | (
                LaunchPhase::Init
                    | LaunchPhase::ManifestParsed
                    | LaunchPhase::DependenciesResolved
                    | LaunchPhase::Configured,
                LaunchPhase::Failed
            )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

//! Errors surfaced by deployment procedures.

use crate::LogicalId;

/// Failure of a deployment run.
///
/// Every variant aborts the run. Nothing is persisted once one of these is returned,
/// but steps that were already confirmed keep their on-chain effects.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Required settings are missing or inconsistent. Raised before any step is submitted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A step names an artifact, function or argument that does not fit.
    #[error("step {step}: configuration error: {message}")]
    InvalidStep { step: LogicalId, message: String },

    /// A confirmed step did not emit the event the procedure depends on.
    #[error("step {step}: expected event {event} was not emitted")]
    ProtocolViolation { step: LogicalId, event: String },

    /// The step executor failed to submit or confirm a step.
    #[error("step {step} failed")]
    Transport {
        step: LogicalId,
        #[source]
        source: anyhow::Error,
    },

    /// No snapshot is recorded under the requested name.
    #[error("no deployment snapshot named {name}")]
    NotFound { name: String },

    /// The deployment recorder failed to read or write a snapshot.
    #[error("deployment recorder failed for snapshot {name}")]
    Recorder {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// A decoded event does not have the shape the procedure expects.
    #[error("unknown shape for event {event}: {reason}")]
    UnknownEventShape { event: String, reason: String },
}

impl DeployError {
    /// Shorthand for [`DeployError::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// The logical id of the step that failed, if the failure is tied to one.
    pub fn step(&self) -> Option<&LogicalId> {
        match self {
            Self::InvalidStep { step, .. }
            | Self::ProtocolViolation { step, .. }
            | Self::Transport { step, .. } => Some(step),
            _ => None,
        }
    }
}

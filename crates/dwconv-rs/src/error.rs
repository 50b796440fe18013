use thiserror::Error;

/// Errors raised while declaring or scheduling a depthwise convolution.
///
/// None of these are retried internally. Exploring a different configuration
/// is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("unsupported workload: {reason}")]
    UnsupportedWorkload { reason: String },

    #[error(
        "cannot split axis `{axis}` of stage `{stage}`: factor {factor} does not divide extent {extent}"
    )]
    UnschedulableSplit {
        stage: String,
        axis: String,
        extent: usize,
        factor: usize,
    },

    #[error("layout mismatch for `{tensor}`: expected {expected}, got {actual}")]
    LayoutMismatch {
        tensor: String,
        expected: String,
        actual: String,
    },

    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("axis `{axis}` is not a leaf axis of stage `{stage}`")]
    AxisNotFound { stage: String, axis: String },

    #[error("invalid schedule primitive on stage `{stage}`: {reason}")]
    InvalidPrimitive { stage: String, reason: String },

    #[error("no schedule strategy registered for `{op}` on target `{target}`")]
    NoStrategy { op: String, target: String },

    #[error("invalid target `{spec}`: {reason}")]
    InvalidTarget { spec: String, reason: String },
}

impl ScheduleError {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        ScheduleError::UnsupportedWorkload {
            reason: reason.into(),
        }
    }

    pub fn layout_mismatch(
        tensor: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        ScheduleError::LayoutMismatch {
            tensor: tensor.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        ScheduleError::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub fn invalid_primitive(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        ScheduleError::InvalidPrimitive {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias for results returned by scheduling routines.
pub type ScheduleResult<T> = Result<T, ScheduleError>;

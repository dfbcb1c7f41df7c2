use crate::error::JobContextError;
use std::fmt;

/// Why an invocation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The stage handler returned `false`.
    Rejected,
    /// Mapping, the handler, status notification, auditing or publishing failed.
    Fault,
    /// The wire message could not be decoded.
    Decode,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Rejected => write!(f, "StageRejected"),
            FailureKind::Fault => write!(f, "StageFault"),
            FailureKind::Decode => write!(f, "DecodeError"),
        }
    }
}

/// The result handed back to the transport for one delivered message.
#[derive(Debug)]
pub struct CallbackResult {
    pub success: bool,
    pub error: Option<JobContextError>,
}

impl CallbackResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected() -> Self {
        Self {
            success: false,
            error: None,
        }
    }

    pub fn failed(error: JobContextError) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match (&self.error, self.success) {
            (_, true) => None,
            (None, false) => Some(FailureKind::Rejected),
            (Some(JobContextError::Decode(_)), false) => Some(FailureKind::Decode),
            (Some(_), false) => Some(FailureKind::Fault),
        }
    }
}

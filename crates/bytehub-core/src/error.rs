use std::fmt;

use crate::subsystem::SubsystemError;

/// Why an enable, disable or unregister could not proceed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyReason {
    /// Another enable of the same subsystem is running its attach.
    EnableInProgress,
    /// Sessions still hold the subsystem enabled.
    Referenced { refcount: usize },
    /// The subsystem was disabled but its detach has not run yet.
    DetachPending,
}

impl fmt::Display for BusyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusyReason::EnableInProgress => f.write_str("enable in progress"),
            BusyReason::Referenced { refcount } => {
                write!(f, "enabled on {refcount} session(s)")
            }
            BusyReason::DetachPending => f.write_str("detach pending"),
        }
    }
}

/// Errors surfaced by the registry, sessions and the control plane.
///
/// None of these abort a session. Unclaimed input on the data path is
/// discarded internally and never reported here.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Every registry slot is occupied.
    #[error("subsystem registry full ({capacity} slots)")]
    CapacityExceeded { capacity: usize },

    /// The index is out of range or the slot is empty.
    #[error("no subsystem registered at index {0}")]
    NotFound(usize),

    /// The operation conflicts with one in flight; retrying may succeed.
    #[error("subsystem {index} busy: {reason}")]
    Busy { index: usize, reason: BusyReason },

    /// The subsystem is already enabled on this session.
    #[error("subsystem {0} already enabled on this session")]
    AlreadyEnabled(usize),

    /// The subsystem's attach failed; `source` is its own error.
    #[error("subsystem '{name}' (#{index}) failed to attach: {source}")]
    AttachFailed {
        index: usize,
        name: String,
        #[source]
        source: SubsystemError,
    },

    /// Session resources could not be allocated.
    #[error("session allocation failed: {0}")]
    AllocationFailure(#[from] bytehub_probe::ProbeError),

    /// The session has been closed.
    #[error("session {0} is closed")]
    SessionClosed(u64),

    /// The control command identifier is not recognized.
    #[error("unknown control command 0x{0:04x}")]
    UnknownCommand(u32),

    /// The control command payload could not be decoded.
    #[error("invalid control payload: {0}")]
    InvalidPayload(String),

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl HubError {
    /// True for conditions a caller is expected to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HubError::Busy { .. })
    }

    /// Negated errno value reported in control-plane replies.
    pub fn code(&self) -> i32 {
        match self {
            HubError::CapacityExceeded { .. } => -28,
            HubError::NotFound(_) => -22,
            HubError::Busy { .. } => -16,
            HubError::AlreadyEnabled(_) => -17,
            HubError::AttachFailed { .. } => -5,
            HubError::AllocationFailure(_) => -105,
            HubError::SessionClosed(_) => -32,
            HubError::UnknownCommand(_) => -25,
            HubError::InvalidPayload(_) => -14,
            HubError::Config(_) => -22,
        }
    }
}

pub type Result<T> = std::result::Result<T, HubError>;

//! Error types for relay operations

use thiserror::Error;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors surfaced by the relay core.
///
/// Unknown-connection operations are not errors: they are silent no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Room label failed validation
    #[error("invalid room label: {reason}")]
    InvalidRoom {
        /// Why the label was rejected
        reason: String,
    },

    /// The registry is at its configured connection limit
    #[error("connection limit of {limit} reached")]
    CapacityExhausted { limit: usize },

    /// No more connection identifiers can be allocated
    #[error("connection identifier space exhausted")]
    IdSpaceExhausted,

    /// The scheduler is at its configured pending-broadcast limit
    #[error("pending broadcast limit of {limit} reached")]
    TooManyPendingBroadcasts { limit: usize },

    /// No async runtime is available to arm a timer
    #[error("cannot arm broadcast timer: {reason}")]
    TimerUnavailable { reason: String },

    /// The scheduler was cancelled and accepts no new work
    #[error("broadcast scheduler is closed")]
    SchedulerClosed,

    /// The relay is shutting down and refuses new connections
    #[error("relay is shutting down")]
    ShuttingDown,
}

impl RelayError {
    /// Short machine-readable code sent to clients in `error` events
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::InvalidRoom { .. } => "invalid_room",
            RelayError::CapacityExhausted { .. } => "capacity_exhausted",
            RelayError::IdSpaceExhausted => "id_space_exhausted",
            RelayError::TooManyPendingBroadcasts { .. } => "too_many_pending_broadcasts",
            RelayError::TimerUnavailable { .. } => "timer_unavailable",
            RelayError::SchedulerClosed => "scheduler_closed",
            RelayError::ShuttingDown => "shutting_down",
        }
    }

    pub(crate) fn invalid_room(reason: impl Into<String>) -> Self {
        RelayError::InvalidRoom {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::CapacityExhausted { limit: 3 };
        assert_eq!(err.to_string(), "connection limit of 3 reached");

        let err = RelayError::invalid_room("label is empty");
        assert_eq!(err.to_string(), "invalid room label: label is empty");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(RelayError::invalid_room("x").code(), "invalid_room");
        assert_eq!(RelayError::SchedulerClosed.code(), "scheduler_closed");
        assert_eq!(RelayError::ShuttingDown.code(), "shutting_down");
    }
}

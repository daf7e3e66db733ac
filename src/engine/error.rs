use ulid::Ulid;

use crate::model::Span;

#[derive(Debug)]
pub enum EngineError {
    /// The candidate range overlaps a committed booking.
    Conflict { booking_id: Ulid, span: Span },
    InvalidPolicy(&'static str),
    InvalidBooking(&'static str),
    NotFound(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict { .. })
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Conflict { booking_id, span } => write!(
                f,
                "conflict with booking {booking_id} [{}, {})",
                span.start, span.end
            ),
            EngineError::InvalidPolicy(msg) => write!(f, "invalid working-hours policy: {msg}"),
            EngineError::InvalidBooking(msg) => write!(f, "invalid booking: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

use std::time::Duration;

use crate::calendar::CalendarError;
use crate::model::AppointmentId;

/// Persistence failures. The operation that hit one did not happen.
#[derive(Debug)]
pub enum StorageFault {
    Wal(String),
    LockTimeout(Duration),
}

impl std::fmt::Display for StorageFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageFault::Wal(e) => write!(f, "WAL error: {e}"),
            StorageFault::LockTimeout(after) => {
                write!(f, "store busy: no lock after {}ms, retry", after.as_millis())
            }
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    Validation(String),
    /// The slot is held by another active appointment.
    Conflict { client_name: String },
    /// Unknown id, or the appointment is not in a state the operation accepts.
    NotFound(AppointmentId),
    Forbidden(AppointmentId),
    LimitExceeded(&'static str),
    StorageFault(StorageFault),
}

impl EngineError {
    /// Worth retrying unchanged; every other error needs different input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StorageFault(StorageFault::LockTimeout(_)))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid input: {msg}"),
            EngineError::Conflict { client_name } => {
                write!(f, "slot already taken by {client_name}")
            }
            EngineError::NotFound(id) => write!(f, "no active appointment {id}"),
            EngineError::Forbidden(id) => write!(f, "appointment {id} belongs to another client"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::StorageFault(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StorageFault> for EngineError {
    fn from(e: StorageFault) -> Self {
        EngineError::StorageFault(e)
    }
}

impl From<CalendarError> for EngineError {
    fn from(e: CalendarError) -> Self {
        EngineError::Validation(e.to_string())
    }
}

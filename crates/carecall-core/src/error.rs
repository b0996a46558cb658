use crate::types::{CallState, Lifecycle, RowNumber};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CarecallError {
    #[error("not initialized: run 'carecall init'")]
    NotInitialized,

    #[error("record already queued: row {0}")]
    DuplicateRecord(RowNumber),

    #[error("record not found: row {0}")]
    UnknownRecord(RowNumber),

    #[error("invalid record at row {row_number}: {reason}")]
    InvalidRecord { row_number: RowNumber, reason: String },

    #[error("row {row_number} cannot move from {from} to {to}: {reason}")]
    InvalidTransition {
        row_number: RowNumber,
        from: CallState,
        to: CallState,
        reason: String,
    },

    #[error("cannot {command} while queue is {from}")]
    InvalidStateTransition {
        from: Lifecycle,
        command: &'static str,
    },

    #[error("a call session is already active for row {0}")]
    SessionAlreadyActive(RowNumber),

    #[error("no active call session for row {0}")]
    UnknownSession(RowNumber),

    #[error("no active call to skip")]
    NoActiveCall,

    #[error("call for row {0} is still in flight")]
    CallInFlight(RowNumber),

    #[error("queue store is corrupt: {0}")]
    CorruptStore(String),

    #[error("invalid outcome: {0}")]
    InvalidOutcome(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CarecallError>;

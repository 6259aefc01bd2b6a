use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    NotFound,
    ReminderService,
    MalformedBackup,
    Persistence,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaundryError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("reminder service failed: {0}")]
    ReminderService(String),
    #[error("malformed backup: {0}")]
    MalformedBackup(String),
    /// The in-memory change stands; only the durable copy is behind.
    #[error("failed to persist changes: {0}")]
    Persistence(String),
}

impl LaundryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn malformed_backup(message: impl Into<String>) -> Self {
        Self::MalformedBackup(message.into())
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            LaundryError::Validation(_) => ErrorCode::Validation,
            LaundryError::ReminderService(_) => ErrorCode::ReminderService,
            LaundryError::MalformedBackup(_) => ErrorCode::MalformedBackup,
            LaundryError::Persistence(_) => ErrorCode::Persistence,
        }
    }
}

pub type LaundryResult<T> = Result<T, LaundryError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&LaundryError> for ErrorReport {
    fn from(value: &LaundryError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}

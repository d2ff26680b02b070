use std::time::Duration;

use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::password::PasswordHasherError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    /// 无法解析的入站聊天帧，会话继续
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("authentication failed")]
    Authentication,
}

impl ApplicationError {
    pub fn malformed_frame(reason: impl Into<String>) -> Self {
        Self::MalformedFrame(reason.into())
    }
}

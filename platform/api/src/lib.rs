use std::sync::Arc;

use async_graphql::{Error, ErrorExtensions};
use thiserror::Error;

/// Shared GraphQL result type.
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error, Clone)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Duplicate(String),
    /// The write may have been partly applied; clients must refetch.
    #[error("{0}")]
    ReloadRequired(String),
    #[error("internal server error")]
    Internal(Arc<anyhow::Error>),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Validation(_) => "VALIDATION",
            ApiError::Duplicate(_) => "DUPLICATE",
            ApiError::ReloadRequired(_) => "RELOAD_REQUIRED",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self::Internal(Arc::new(err))
    }

    pub fn requires_reload(&self) -> bool {
        matches!(self, ApiError::ReloadRequired(_) | ApiError::Internal(_))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::internal(value)
    }
}

impl ErrorExtensions for ApiError {
    fn extend(&self) -> Error {
        if let ApiError::Internal(source) = self {
            tracing::error!(error = %source, "internal error");
        }
        let reload = self.requires_reload();
        Error::new(self.to_string()).extend_with(|_err, e| {
            e.set("code", self.code());
            if reload {
                e.set("reload", true);
            }
        })
    }
}

/// Convert any error into a GraphQL error payload while hiding internals.
pub fn internal_error(err: impl Into<anyhow::Error>) -> Error {
    ApiError::internal(err.into()).extend()
}

/// A `VALIDATION` error with the given message.
pub fn validation_error(message: impl Into<String>) -> Error {
    ApiError::Validation(message.into()).extend()
}

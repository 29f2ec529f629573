// src/error.rs

use std::fmt;

use thiserror::Error;

/// What the candidate should do after a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    Retry,
    Retake,
    Login,
    ContactSupport,
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NextAction::Retry => "Please try again.",
            NextAction::Retake => "Please retake the photo.",
            NextAction::Login => "Please login again.",
            NextAction::ContactSupport => "Please contact support.",
        };
        f.write_str(text)
    }
}

/// Global Application Error Enum.
/// Centralizes the failure taxonomy of the exam client.
#[derive(Debug, Error)]
pub enum AppError {
    /// Camera, microphone or screen capture was refused.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The requested capture device does not exist or is busy.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Missing or malformed candidate/exam identifiers or request fields.
    #[error("validation failed: {0}")]
    ValidationFailure(String),

    /// Any failed HTTP call (transport error or non-success status).
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// No active server session.
    #[error("authentication required: {0}")]
    AuthError(String),

    /// Operation is not allowed in the current state-machine state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// The stated next action shown alongside this failure.
    pub fn next_action(&self) -> NextAction {
        match self {
            AppError::PermissionDenied(_)
            | AppError::DeviceUnavailable(_)
            | AppError::NetworkFailure(_) => NextAction::Retry,
            AppError::AuthError(_) => NextAction::Login,
            AppError::ValidationFailure(_)
            | AppError::InvalidState(_)
            | AppError::Storage(_)
            | AppError::Config(_) => NextAction::ContactSupport,
        }
    }

    /// Message for the candidate: the failure plus what to do next.
    pub fn user_message(&self) -> String {
        format!("{} {}", self, self.next_action())
    }
}

/// Converts transport and decoding failures from `reqwest` into `NetworkFailure`.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::NetworkFailure(format!("request timed out: {err}"))
        } else if err.is_connect() {
            AppError::NetworkFailure(format!("connection failed: {err}"))
        } else {
            AppError::NetworkFailure(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationFailure(err.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::Config(err.to_string())
    }
}

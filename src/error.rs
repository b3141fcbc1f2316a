//! Error types for backend calls and the session lifecycle
//!
//! Plumbing (configuration, storage, transport setup) reports `anyhow::Error`.
//! The two enums here exist where callers branch on the failure kind.

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single backend API call
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: token rejected by backend")]
    Unauthorized,
    #[error("forbidden: {detail}")]
    Forbidden { detail: String },
    #[error("request failed with status {status}: {detail}")]
    Status { status: StatusCode, detail: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

/// Fatal outcomes of one authentication attempt
///
/// Every variant leaves the session unauthenticated; `user_message` is what the
/// sign-in view shows.
#[derive(Clone, Debug, Error)]
pub enum SessionError {
    #[error("token acquisition timed out")]
    ProviderTimeout,
    #[error("identity provider rejected token issuance: {0}")]
    Provider(String),
    #[error("token rejected after refresh")]
    Unauthorized,
    #[error("insufficient permissions: {0}")]
    Forbidden(String),
    #[error("role resolution failed: {0}")]
    RoleResolution(String),
    #[error("unrecognized role '{0}'")]
    UnrecognizedRole(String),
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            SessionError::ProviderTimeout => {
                "Sign-in timed out. Please sign in again.".to_string()
            }
            SessionError::Provider(_) => {
                "Invalid credentials or user not found. Please sign in again.".to_string()
            }
            SessionError::Unauthorized => {
                "Your session has expired. Please sign in again.".to_string()
            }
            SessionError::Forbidden(_) => {
                "You do not have permission to access this dashboard.".to_string()
            }
            SessionError::RoleResolution(e) => format!("Could not verify your role: {e}"),
            SessionError::UnrecognizedRole(role) => {
                format!("Your account has an unrecognized role '{role}'.")
            }
        }
    }
}

impl From<ApiError> for SessionError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Unauthorized => SessionError::Unauthorized,
            ApiError::Forbidden { detail } => SessionError::Forbidden(detail),
            other => SessionError::RoleResolution(other.to_string()),
        }
    }
}

/// Failures surfaced by the role-gated views
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

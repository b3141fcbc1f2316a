use crate::error::ApiError;
use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Create the HTTP client used for all backend calls
///
/// # Arguments
/// * `request_timeout` - Upper bound for a whole request including the body
pub fn backend_client(request_timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(request_timeout)
        .build()
        .context("failed to create backend HTTP client")
}

/// Extract a human readable message from an error body
///
/// The backend answers errors with `{"detail": ...}`; anything else is
/// returned as is.
pub fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.trim().to_string(),
    }
}

/// Handle HTTP response by checking status and extracting body
///
/// # Arguments
/// * `res` - The HTTP response to handle
///
/// # Returns
/// * `Ok(String)` - The response body if the status is successful
/// * `Err(ApiError)` - 401 and 403 get their own variants so callers can react
///   to them; every other failure status keeps the status and detail
pub async fn handle_api_response(res: Response) -> Result<String, ApiError> {
    let status = res.status();
    let body = res.text().await?;

    match status {
        s if s.is_success() => Ok(body),
        StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
        StatusCode::FORBIDDEN => Err(ApiError::Forbidden {
            detail: error_detail(&body),
        }),
        status => Err(ApiError::Status {
            status,
            detail: error_detail(&body),
        }),
    }
}

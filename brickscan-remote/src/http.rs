//! Shared HTTP plumbing for the service clients

use crate::error::RemoteError;
use brickscan_core::ServiceConfig;
use reqwest::{Client, Response, StatusCode};

const MAX_ERROR_BODY: usize = 500;

pub(crate) fn build_client(config: &ServiceConfig) -> Result<Client, RemoteError> {
    Ok(Client::builder().timeout(config.timeout()).build()?)
}

/// Map non-success statuses onto [`RemoteError`]
pub(crate) async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(RemoteError::RateLimit);
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RemoteError::AuthenticationFailed);
    }

    if status.is_server_error() {
        return Err(RemoteError::Server(status.as_u16()));
    }

    let text = response.text().await.unwrap_or_default();
    let message = if text.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    } else {
        text
    };
    Err(RemoteError::Rejected {
        status: status.as_u16(),
        message,
    })
}

/// Decode a JSON body, reporting garbage as an invalid response
pub(crate) async fn json_body(response: Response) -> Result<serde_json::Value, RemoteError> {
    let text = response.text().await?;
    serde_json::from_str(&text)
        .map_err(|e| RemoteError::InvalidResponse(format!("body is not JSON: {}", e)))
}

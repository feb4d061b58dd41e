//! Shared HTTP plumbing for capability providers.
//!
//! Maps transport failures and response statuses onto [`ServiceError`]:
//! network errors, HTTP 429 and 5xx are transient; other non-success
//! statuses are permanent.

use std::time::Duration;

use anyhow::Result;
use filing_rag_core::ServiceError;

pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Classify a non-success response.
pub fn status_error(service: &str, status: reqwest::StatusCode, body: &str) -> ServiceError {
    let msg = format!("{} API error {}: {}", service, status, truncate(body, 300));
    if status.as_u16() == 429 || status.is_server_error() {
        ServiceError::Transient(msg)
    } else {
        ServiceError::Permanent(msg)
    }
}

/// Classify a request that never produced a response.
pub fn send_error(service: &str, url: &str, err: reqwest::Error) -> ServiceError {
    ServiceError::Transient(format!("{} connection error ({}): {}", service, url, err))
}

/// Send a JSON POST and return the parsed body, classifying every failure.
pub async fn post_json(
    service: &str,
    request: reqwest::RequestBuilder,
    url: &str,
) -> Result<serde_json::Value, ServiceError> {
    let response = request
        .send()
        .await
        .map_err(|e| send_error(service, url, e))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(service, status, &body));
    }
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| ServiceError::Transient(format!("{} response unreadable: {}", service, e)))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification() {
        assert!(status_error("x", StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(status_error("x", StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(!status_error("x", StatusCode::UNAUTHORIZED, "bad key").is_transient());
        assert!(!status_error("x", StatusCode::BAD_REQUEST, "").is_transient());
    }

    #[test]
    fn test_error_body_is_truncated() {
        let body = "e".repeat(1000);
        let err = status_error("OpenAI", StatusCode::BAD_REQUEST, &body);
        assert!(err.message().chars().count() < 400);
    }
}

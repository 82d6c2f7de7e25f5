use super::{TransportError, TransportErrorKind};
use crate::{Error, ErrorContext, Result};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Minimal GET-JSON client whose failures classify cleanly for retry.
///
/// - no response (refused, reset, timeout, DNS) becomes [`Error::Transport`]
/// - a non-2xx response becomes [`Error::Remote`] with status, body `code`/`message`
///   and the `Retry-After` header in milliseconds; `code` is only set when the
///   server sent one, so retry decisions for bare responses follow the status
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| Error::Transport(TransportError::new(TransportErrorKind::Other, e.to_string())))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` relative to the base URL and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let request_id = Uuid::new_v4().to_string();
        let mut req = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .header("x-request-id", &request_id);
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(classify_send_error)?;
        let status = resp.status();
        debug!(url = %url, request_id = %request_id, status = status.as_u16(), "http response");

        if status.is_success() {
            return resp.json::<T>().await.map_err(|e| {
                Error::validation_with_context(
                    format!("response body did not decode: {}", e),
                    ErrorContext::new()
                        .with_details(url.clone())
                        .with_source("http"),
                )
            });
        }

        let retry_after_ms = retry_after_ms(resp.headers());
        let body = resp.text().await.unwrap_or_default();
        Err(remote_error(status.as_u16(), &body, retry_after_ms))
    }
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.bearer_token.is_some())
            .finish()
    }
}

fn classify_send_error(e: reqwest::Error) -> Error {
    let message = e.to_string();
    let kind = if e.is_timeout() {
        TransportErrorKind::Timeout
    } else if e.is_connect() {
        let detail = format!("{:?}", e).to_ascii_lowercase();
        if detail.contains("dns") || detail.contains("resolve") || detail.contains("lookup") {
            TransportErrorKind::Dns
        } else if detail.contains("reset") {
            TransportErrorKind::ConnectionReset
        } else {
            TransportErrorKind::ConnectionRefused
        }
    } else if e.is_request() || e.is_body() {
        TransportErrorKind::ConnectionReset
    } else {
        TransportErrorKind::Other
    };
    Error::Transport(TransportError::new(kind, message))
}

/// Only the `Retry-After: <seconds>` form is supported.
fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    let secs: f64 = raw.parse().ok()?;
    (secs >= 0.0).then(|| (secs * 1000.0).round() as u64)
}

/// Build a remote error from a status and a (possibly JSON) error body.
///
/// Recognised body shapes: `{"code": .., "message": ..}` and
/// `{"error": {"code": .., "message": ..}}`. Without a body code, the
/// canonical code for the status is used when there is one.
fn remote_error(status: u16, body: &str, retry_after_ms: Option<u64>) -> Error {
    let json: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let obj = json
        .as_ref()
        .map(|v| v.get("error").filter(|e| e.is_object()).unwrap_or(v));
    let field = |name: &str| {
        obj.and_then(|o| o.get(name))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    let code = field("code");
    let message = field("message").unwrap_or_else(|| {
        if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            body.chars().take(512).collect()
        }
    });

    Error::Remote {
        status: Some(status),
        code,
        message,
        retry_after_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after_ms(&headers), None);
        headers.insert("retry-after", HeaderValue::from_static("2"));
        assert_eq!(retry_after_ms(&headers), Some(2000));
        headers.insert("retry-after", HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after_ms(&headers), None);
    }

    #[test]
    fn test_remote_error_reads_nested_body() {
        let err = remote_error(
            409,
            r#"{"error": {"code": "conflict_error", "message": "try again"}}"#,
            None,
        );
        assert_eq!(err.status_code(), Some(409));
        assert_eq!(err.error_code(), Some("conflict_error"));
        assert!(err.to_string().contains("try again"));
    }

    #[test]
    fn test_remote_error_without_body_carries_status_only() {
        let err = remote_error(503, "", Some(1500));
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(err.error_code(), None);
        assert_eq!(err.retry_after_ms(), Some(1500));
        assert!(err.to_string().contains("HTTP 503"));
    }
}

//! Shared plumbing for outbound calls to the language model and image APIs.
//!
//! Every call runs under the client-level timeout and a fixed retry policy;
//! once attempts are exhausted the last failure is surfaced as a typed error.

use std::{future::Future, time::Duration};

use tracing::warn;

use crate::config::UpstreamConfig;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Transport failure: connect, TLS, timeout, body read.
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered but not in the agreed shape.
    #[error("upstream response malformed: {0}")]
    Format(String),

    #[error("upstream still failing after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<UpstreamError>,
    },
}

impl UpstreamError {
    fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Request(_) => true,
            UpstreamError::Status { status, .. } => *status >= 500 || *status == 429,
            UpstreamError::Format(_) | UpstreamError::Exhausted { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Multiplied by the attempt number before the next try.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &UpstreamConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff: Duration::from_millis(500),
        }
    }

    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    if attempt == 1 {
                        return Err(e);
                    }
                    return Err(UpstreamError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(call = what, attempt, error = %e, "upstream call failed; retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
            }
        }
    }
}

pub fn http_client(cfg: &UpstreamConfig) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .build()?;
    Ok(client)
}

/// Turns a non-2xx response into [`UpstreamError::Status`] carrying the body text.
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Reads a JSON body. Transport failures stay retryable; a body that does not
/// parse is a [`UpstreamError::Format`].
pub async fn json_body(response: reqwest::Response) -> Result<serde_json::Value, UpstreamError> {
    let bytes = response.bytes().await?;
    decode_json(&bytes)
}

fn decode_json(body: &[u8]) -> Result<serde_json::Value, UpstreamError> {
    serde_json::from_slice(body).map_err(|e| UpstreamError::Format(format!("invalid JSON body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    fn unavailable() -> UpstreamError {
        UpstreamError::Status {
            status: 503,
            body: "busy".into(),
        }
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let calls = AtomicU32::new(0);
        let out = policy(3)
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = policy(5)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(UpstreamError::Status {
                    status: 401,
                    body: "bad key".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 401, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn format_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = policy(3)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(UpstreamError::Format("not json".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Format(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn undecodable_body_fails_once_as_format() {
        let calls = AtomicU32::new(0);
        let err = policy(3)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                decode_json(b"<html>gateway</html>")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Format(m) if m.starts_with("invalid JSON body")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(decode_json(br#"{"ok":1}"#).unwrap()["ok"], 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = policy(3)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(unavailable())
            })
            .await
            .unwrap_err();
        match err {
            UpstreamError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, UpstreamError::Status { status: 503, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn single_attempt_returns_error_unwrapped() {
        let err = policy(1)
            .run("test", || async { Err::<(), _>(unavailable()) })
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 503, .. }));
    }
}

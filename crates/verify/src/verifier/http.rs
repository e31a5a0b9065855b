//! HTTP verifier: consults a remote authority's `/result` endpoint.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` to avoid
//! blocking the async runtime. The response body must be
//! `{"result": <bool>}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::Verifier;
use crate::error::VerifyError;
use crate::query::ValidQuery;

#[derive(Deserialize)]
struct ResultPayload {
    result: bool,
}

/// Verifier that asks `GET {base_url}/result?cadastral_number=..&latitude=..&longitude=..`.
///
/// - `timeout` bounds the whole exchange; exceeding it is `VerifyError::Timeout`
/// - `api_key`, when set, is sent as `X-API-Key`
pub struct HttpVerifier {
    base_url: String,
    timeout: Duration,
    api_key: Option<String>,
}

impl HttpVerifier {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        HttpVerifier {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn result_url(&self) -> String {
        format!("{}/result", self.base_url)
    }
}

#[async_trait]
impl Verifier for HttpVerifier {
    async fn verify(&self, query: &ValidQuery) -> Result<bool, VerifyError> {
        let url = self.result_url();
        let api_key = self.api_key.clone();
        let timeout = self.timeout;
        let cadastral_number = query.cadastral_number().to_string();
        let latitude = query.latitude().to_string();
        let longitude = query.longitude().to_string();

        tokio::task::spawn_blocking(move || {
            let config = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build();
            let agent: ureq::Agent = config.into();

            let mut request = agent
                .get(&url)
                .query("cadastral_number", &cadastral_number)
                .query("latitude", &latitude)
                .query("longitude", &longitude);
            if let Some(ref key) = api_key {
                request = request.header("X-API-Key", key.as_str());
            }

            let response = request.call().map_err(|e| match e {
                ureq::Error::Timeout(_) => VerifyError::Timeout { limit: timeout },
                other => VerifyError::Unavailable(other.to_string()),
            })?;

            let payload: ResultPayload = response.into_body().read_json().map_err(|e| {
                VerifyError::Unavailable(format!("failed to parse response as JSON: {e}"))
            })?;
            Ok(payload.result)
        })
        .await
        .map_err(|e| VerifyError::Unavailable(format!("task join error: {e}")))?
    }

    fn verifier_id(&self) -> &str {
        "http"
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryRequest;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    /// Serve one canned HTTP response on a random port. The request head is
    /// sent back through the returned channel.
    fn one_shot_server(status: &str, body: &str) -> (String, mpsc::Receiver<String>) {
        one_shot_server_after(Duration::ZERO, status, body)
    }

    /// Like [`one_shot_server`], holding the response back for `delay`.
    fn one_shot_server_after(
        delay: Duration,
        status: &str,
        body: &str,
    ) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            std::thread::sleep(delay);
            // The client may have hung up by now.
            let _ = stream.write_all(response.as_bytes());
            let _ = tx.send(String::from_utf8_lossy(&head).into_owned());
        });
        (format!("http://{addr}"), rx)
    }

    fn query() -> ValidQuery {
        QueryRequest::new("77:01:0001:123", 55.75, 37.61)
            .validate()
            .unwrap()
    }

    #[test]
    fn result_url_strips_trailing_slash() {
        let v = HttpVerifier::new("http://127.0.0.1:8000/", Duration::from_secs(1));
        assert_eq!(v.result_url(), "http://127.0.0.1:8000/result");
    }

    #[tokio::test]
    async fn reads_verdict_and_sends_query_parameters() {
        let (base, head) = one_shot_server("200 OK", r#"{"result": true}"#);
        let verifier = HttpVerifier::new(&base, Duration::from_secs(5))
            .with_api_key(Some("secret".to_string()));

        assert_eq!(verifier.verify(&query()).await, Ok(true));

        let head = head.recv().unwrap();
        assert!(head.starts_with("GET /result?"), "{head}");
        assert!(head.contains("cadastral_number=77%3A01%3A0001%3A123"), "{head}");
        assert!(head.contains("latitude=55.75"), "{head}");
        assert!(head.to_lowercase().contains("x-api-key: secret"), "{head}");
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let (base, _head) = one_shot_server("500 Internal Server Error", r#"{"error": "x"}"#);
        let verifier = HttpVerifier::new(&base, Duration::from_secs(5));
        assert!(matches!(
            verifier.verify(&query()).await,
            Err(VerifyError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_unavailable() {
        let (base, _head) = one_shot_server("200 OK", r#"{"verdict": true}"#);
        let verifier = HttpVerifier::new(&base, Duration::from_secs(5));
        assert!(matches!(
            verifier.verify(&query()).await,
            Err(VerifyError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn slow_authority_is_a_timeout() {
        let (base, _head) =
            one_shot_server_after(Duration::from_secs(2), "200 OK", r#"{"result": true}"#);
        let verifier = HttpVerifier::new(&base, Duration::from_millis(200));

        let started = std::time::Instant::now();
        let outcome = verifier.verify(&query()).await;
        assert_eq!(
            outcome,
            Err(VerifyError::Timeout {
                limit: Duration::from_millis(200)
            })
        );
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}

use anyhow::Result;
use std::error::Error as StdError;
use std::time::Instant;
use tokio::time::timeout;
use tracing::trace;

use super::types::{ProbeMethod, ProbeOutcome, ProbeTarget};
use crate::config::ProbeConfig;

/// A single reachability attempt against a target.
///
/// Implementations never retry: one call is one attempt, which keeps them
/// deterministic for a given endpoint behaviour.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(settings: &ProbeConfig) -> Result<Self> {
        let redirect = if settings.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .redirect(redirect)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome {
        let request = match target.method {
            ProbeMethod::Get => self.client.get(&target.url),
            ProbeMethod::Head => self.client.head(&target.url),
        };

        let start = Instant::now();

        let response = match timeout(target.timeout, request.send()).await {
            Err(_) => return ProbeOutcome::timeout(),
            Ok(Err(e)) if e.is_timeout() => return ProbeOutcome::timeout(),
            Ok(Err(e)) => return ProbeOutcome::connection_error(describe_error(&e)),
            Ok(Ok(response)) => response,
        };

        let latency = start.elapsed().as_millis() as u64;
        let status_code = response.status().as_u16();
        trace!(url = %target.url, status = status_code, latency_ms = latency, "Probe answered");

        if status_code == target.expected_status {
            ProbeOutcome::up(status_code, latency)
        } else {
            ProbeOutcome::unexpected_status(status_code, latency)
        }
    }
}

/// reqwest errors hide the interesting part (DNS, refused, TLS) in their source chain
fn describe_error(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::ErrorKind;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn target(url: String, expected_status: u16) -> ProbeTarget {
        ProbeTarget {
            url,
            method: ProbeMethod::Get,
            timeout: Duration::from_secs(5),
            expected_status,
        }
    }

    #[tokio::test]
    async fn test_expected_status_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let checker = HttpChecker::new(&ProbeConfig::default()).unwrap();
        let outcome = checker.probe(&target(format!("{}/health", server.uri()), 200)).await;

        assert!(outcome.success);
        assert_eq!(outcome.http_status, Some(200));
        assert!(outcome.response_time_ms.is_some());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_other_status_is_unexpected() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

        let checker = HttpChecker::new(&ProbeConfig::default()).unwrap();
        let outcome = checker.probe(&target(server.uri(), 200)).await;

        assert!(!outcome.success);
        assert_eq!(outcome.http_status, Some(500));
        assert_eq!(outcome.error, Some(ErrorKind::UnexpectedStatus { status: 500 }));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let checker = HttpChecker::new(&ProbeConfig::default()).unwrap();
        let mut probe_target = target(server.uri(), 200);
        probe_target.timeout = Duration::from_millis(200);

        let outcome = checker.probe(&probe_target).await;

        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(ErrorKind::Timeout));
        assert!(outcome.response_time_ms.is_none());
        assert!(outcome.http_status.is_none());
    }

    #[tokio::test]
    async fn test_refused_connection_is_connection_error() {
        // Grab a free port and release it so nothing is listening there
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let checker = HttpChecker::new(&ProbeConfig::default()).unwrap();
        let outcome = checker.probe(&target(format!("http://127.0.0.1:{port}/"), 200)).await;

        assert!(!outcome.success);
        assert!(matches!(outcome.error, Some(ErrorKind::ConnectionError { .. })));
        assert!(outcome.response_time_ms.is_none());
    }

    #[tokio::test]
    async fn test_head_method_and_redirect_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "/moved"))
            .expect(1)
            .mount(&server)
            .await;

        let checker = HttpChecker::new(&ProbeConfig::default()).unwrap();
        let mut probe_target = target(server.uri(), 301);
        probe_target.method = ProbeMethod::Head;

        let outcome = checker.probe(&probe_target).await;

        assert!(outcome.success);
        assert_eq!(outcome.http_status, Some(301));
    }
}

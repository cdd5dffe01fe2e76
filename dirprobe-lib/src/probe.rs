//! Single-request HTTP probe.
//!
//! An `HttpProbe` wraps the shared `reqwest::Client` and turns one GET into
//! one [`Outcome`]. Every failure is folded into the outcome; nothing is
//! returned as an error once the client exists.

use crate::error::ProbeError;
use crate::task::TaskContext;
use crate::types::{FailureKind, Outcome, ProbeConfig};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING};
use std::error::Error as StdError;
use std::time::{Duration, Instant};

/// Extra time the client-level timeout allows beyond the task deadline.
///
/// The reaper evicts at the deadline; the client timeout only bounds how
/// long an abandoned connection can linger.
const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_secs(2);

/// Probe that issues GET requests through a shared client.
///
/// Cloning is cheap: the client's connection pool is reference counted and
/// shared between clones. The probe future holds no lock or shared mutable
/// state, so dropping it mid-request leaves the client usable.
#[derive(Clone, Debug)]
pub struct HttpProbe {
    http_client: reqwest::Client,
}

impl HttpProbe {
    /// Build the shared client from configuration.
    pub fn with_config(config: &ProbeConfig) -> Result<Self, ProbeError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, header_value("accept", &config.accept)?);
        headers.insert(
            ACCEPT_ENCODING,
            header_value("accept_encoding", &config.accept_encoding)?,
        );

        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.timeout.saturating_add(CLIENT_TIMEOUT_GRACE))
            .pool_max_idle_per_host(config.pool_size);

        if config.http1_only {
            builder = builder.http1_only();
        }

        let http_client = builder
            .build()
            .map_err(|e| ProbeError::client_build(error_chain(&e)))?;

        Ok(Self { http_client })
    }

    /// Issue one GET for the task's target and report what happened.
    pub async fn execute(&self, ctx: &TaskContext) -> Outcome {
        self.get(ctx.target()).await
    }

    /// Issue one GET against `target`.
    pub async fn get(&self, target: &str) -> Outcome {
        let started = Instant::now();

        match self.http_client.get(target).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                tracing::trace!(uri = target, status, "probe finished");
                // Body is not read; dropping the response releases the connection.
                Outcome::with_status(target, status, started.elapsed())
            }
            Err(e) => {
                let kind = classify(&e);
                let message = error_chain(&e);
                tracing::trace!(uri = target, %kind, error = %message, "probe failed");
                Outcome::failed(target, kind, message, Some(started.elapsed()))
            }
        }
    }
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue, ProbeError> {
    HeaderValue::from_str(value)
        .map_err(|_| ProbeError::config(format!("invalid header value for '{}'", field)))
}

fn classify(err: &reqwest::Error) -> FailureKind {
    if err.is_builder() {
        FailureKind::InvalidTarget
    } else if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_connect() {
        FailureKind::Connect
    } else if err.is_redirect() {
        FailureKind::Redirect
    } else {
        FailureKind::Request
    }
}

/// Render an error with its whole source chain.
///
/// reqwest's own message is usually just "error sending request for url";
/// the useful part (refused, DNS, certificate) sits further down.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProbeStatus;
    use std::fmt;

    #[derive(Debug)]
    struct Layer(&'static str, Option<Box<Layer>>);

    impl fmt::Display for Layer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl StdError for Layer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.1.as_deref().map(|l| l as &(dyn StdError + 'static))
        }
    }

    #[test]
    fn test_error_chain_joins_sources() {
        let err = Layer(
            "error sending request",
            Some(Box::new(Layer(
                "tcp connect error",
                Some(Box::new(Layer("Connection refused", None))),
            ))),
        );
        assert_eq!(
            error_chain(&err),
            "error sending request: tcp connect error: Connection refused"
        );
    }

    #[test]
    fn test_invalid_header_is_config_error() {
        let config = ProbeConfig::default().with_user_agent("ok");
        let mut bad = config.clone();
        bad.accept = "text/html\n".to_string();
        assert!(matches!(
            HttpProbe::with_config(&bad),
            Err(ProbeError::ConfigError { .. })
        ));
        assert!(HttpProbe::with_config(&config).is_ok());
    }

    #[test]
    fn test_huge_timeout_does_not_overflow_client_timeout() {
        let mut config = ProbeConfig::default();
        config.timeout = Duration::MAX;
        assert!(HttpProbe::with_config(&config).is_ok());
    }

    #[tokio::test]
    async fn test_unparsable_target_is_unknown() {
        let probe = HttpProbe::with_config(&ProbeConfig::default()).unwrap();
        let outcome = probe.get("http://exa mple.com/x").await;
        assert_eq!(outcome.status, ProbeStatus::Unknown);
        assert_eq!(outcome.failure, Some(FailureKind::InvalidTarget));
        assert!(!outcome.error_message.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_refused_connection_is_unknown() {
        // Bind then drop to get a local port with nothing listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let probe = HttpProbe::with_config(&ProbeConfig::default()).unwrap();
        let outcome = probe.get(&format!("http://127.0.0.1:{}/a", port)).await;
        assert!(outcome.is_unknown());
        assert_eq!(outcome.failure, Some(FailureKind::Connect));
        assert!(outcome.elapsed.is_some());
    }
}

//! Core data types for probe runs.
//!
//! This module defines the caller-visible outcome record, the probe
//! configuration, and the summary derived from a finished run.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default per-task timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(6000);

/// Upper bound accepted for the per-task timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Upper bound accepted for the pool size.
pub const MAX_POOL_SIZE: usize = 1024;

/// `Accept` header sent with every probe.
pub const DEFAULT_ACCEPT: &str = "application/json, text/html, application/xhtml+xml";

/// `Accept-Encoding` header sent with every probe.
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br";

/// Status of a single probe.
///
/// Serializes as the bare numeric code, or the string `"unknown"` when no
/// HTTP response was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeStatus {
    /// An HTTP response was received with this status code
    Code(u16),
    /// No HTTP response (transport failure, timeout, cancellation)
    Unknown,
}

impl ProbeStatus {
    /// The numeric code, if any.
    pub fn code(&self) -> Option<u16> {
        match self {
            ProbeStatus::Code(code) => Some(*code),
            ProbeStatus::Unknown => None,
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Code(code) => write!(f, "{}", code),
            ProbeStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl Serialize for ProbeStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ProbeStatus::Code(code) => serializer.serialize_u16(*code),
            ProbeStatus::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

impl<'de> Deserialize<'de> for ProbeStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(u16),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Code(code) => Ok(ProbeStatus::Code(code)),
            Raw::Text(text) if text.eq_ignore_ascii_case("unknown") => Ok(ProbeStatus::Unknown),
            Raw::Text(text) => text
                .parse::<u16>()
                .map(ProbeStatus::Code)
                .map_err(|_| de::Error::custom(format!("invalid status '{}'", text))),
        }
    }
}

/// Why a probe ended without an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// TCP/TLS connection could not be established (refused, DNS, handshake)
    Connect,
    /// The task deadline elapsed before the probe finished
    Timeout,
    /// Redirect loop or redirect limit exceeded
    Redirect,
    /// The target URI could not be turned into a request
    InvalidTarget,
    /// Any other protocol or transport failure
    Request,
    /// The probe task exited without reporting (panicked or was aborted)
    Aborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Connect => "connect",
            FailureKind::Timeout => "timeout",
            FailureKind::Redirect => "redirect",
            FailureKind::InvalidTarget => "invalid target",
            FailureKind::Request => "request",
            FailureKind::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Terminal, caller-visible result for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Absolute URI that was probed
    pub uri: String,

    /// HTTP status code, or `"unknown"`
    pub status: ProbeStatus,

    /// Error description when `status` is unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Failure category when `status` is unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,

    /// Time from probe start (or submission, for timeouts) to the outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<Duration>,
}

impl Outcome {
    /// Outcome for a probe that received an HTTP response.
    pub fn with_status<U: Into<String>>(uri: U, code: u16, elapsed: Duration) -> Self {
        Self {
            uri: uri.into(),
            status: ProbeStatus::Code(code),
            error_message: None,
            failure: None,
            elapsed: Some(elapsed),
        }
    }

    /// Outcome for a probe that failed before receiving a response.
    pub fn failed<U: Into<String>, M: Into<String>>(
        uri: U,
        kind: FailureKind,
        message: M,
        elapsed: Option<Duration>,
    ) -> Self {
        Self {
            uri: uri.into(),
            status: ProbeStatus::Unknown,
            error_message: Some(message.into()),
            failure: Some(kind),
            elapsed,
        }
    }

    /// Synthetic outcome for a probe evicted at its deadline.
    pub fn timed_out<U: Into<String>>(uri: U, timeout: Duration, elapsed: Duration) -> Self {
        Self::failed(
            uri,
            FailureKind::Timeout,
            format!("probe timed out after {}ms", timeout.as_millis()),
            Some(elapsed),
        )
    }

    pub fn is_unknown(&self) -> bool {
        self.status == ProbeStatus::Unknown
    }

    pub fn is_timeout(&self) -> bool {
        self.failure == Some(FailureKind::Timeout)
    }
}

/// Configuration options for probe runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Maximum number of probes executing at once
    /// Default: number of logical CPUs, Range: 1-1024
    pub pool_size: usize,

    /// Deadline for each task, measured from submission
    /// Default: 6000 ms
    #[serde(skip)]
    pub timeout: Duration,

    /// `User-Agent` header value
    pub user_agent: String,

    /// `Accept` header value
    pub accept: String,

    /// `Accept-Encoding` header value
    pub accept_encoding: String,

    /// Restrict the client to HTTP/1.1
    /// Default: false (HTTP/2 when the server negotiates it)
    pub http1_only: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            pool_size: num_cpus::get().clamp(1, MAX_POOL_SIZE),
            timeout: DEFAULT_TIMEOUT,
            user_agent: default_user_agent(),
            accept: DEFAULT_ACCEPT.to_string(),
            accept_encoding: DEFAULT_ACCEPT_ENCODING.to_string(),
            http1_only: false,
        }
    }
}

impl ProbeConfig {
    /// Set the pool size, capped to `1..=MAX_POOL_SIZE`.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.clamp(1, MAX_POOL_SIZE);
        self
    }

    /// Set the per-task timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the per-task timeout in milliseconds.
    pub fn with_timeout_ms(self, millis: u64) -> Self {
        self.with_timeout(Duration::from_millis(millis))
    }

    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_http1_only(mut self, enabled: bool) -> Self {
        self.http1_only = enabled;
        self
    }

    /// Reject settings the pool cannot run with.
    ///
    /// Fields are public, so a config built by hand can bypass the
    /// clamping done by the builder methods.
    pub fn validate(&self) -> crate::Result<()> {
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(crate::ProbeError::config(format!(
                "pool_size must be between 1 and {}",
                MAX_POOL_SIZE
            )));
        }
        if self.timeout.is_zero() {
            return Err(crate::ProbeError::config("timeout must be greater than zero"));
        }
        if self.timeout > MAX_TIMEOUT {
            return Err(crate::ProbeError::config(format!(
                "timeout must be at most {}s",
                MAX_TIMEOUT.as_secs()
            )));
        }
        Ok(())
    }
}

fn default_user_agent() -> String {
    format!("dirprobe/{}", env!("CARGO_PKG_VERSION"))
}

/// Counts derived from a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub informational: usize,
    pub success: usize,
    pub redirect: usize,
    pub client_error: usize,
    pub server_error: usize,
    pub unknown: usize,
    pub timeouts: usize,
}

impl RunSummary {
    pub fn from_outcomes<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = &'a Outcome>,
    {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.record(outcome);
        }
        summary
    }

    pub fn record(&mut self, outcome: &Outcome) {
        self.total += 1;
        match outcome.status {
            ProbeStatus::Code(100..=199) => self.informational += 1,
            ProbeStatus::Code(200..=299) => self.success += 1,
            ProbeStatus::Code(300..=399) => self.redirect += 1,
            ProbeStatus::Code(400..=499) => self.client_error += 1,
            ProbeStatus::Code(500..=599) => self.server_error += 1,
            // Non-standard codes are counted with server errors
            ProbeStatus::Code(_) => self.server_error += 1,
            ProbeStatus::Unknown => {
                self.unknown += 1;
                if outcome.is_timeout() {
                    self.timeouts += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_as_code_or_unknown() {
        let ok = Outcome::with_status("http://h/a", 200, Duration::from_millis(5));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], 200);
        assert!(json.get("error_message").is_none());

        let failed = Outcome::failed("http://h/b", FailureKind::Connect, "refused", None);
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "unknown");
        assert_eq!(json["failure"], "connect");
        assert_eq!(json["error_message"], "refused");
    }

    #[test]
    fn test_status_deserializes_from_json() {
        let status: ProbeStatus = serde_json::from_str("404").unwrap();
        assert_eq!(status, ProbeStatus::Code(404));
        let status: ProbeStatus = serde_json::from_str("\"UNKNOWN\"").unwrap();
        assert_eq!(status, ProbeStatus::Unknown);
        assert!(serde_json::from_str::<ProbeStatus>("\"teapot\"").is_err());
    }

    #[test]
    fn test_timed_out_outcome() {
        let outcome = Outcome::timed_out(
            "http://h/slow",
            Duration::from_millis(2000),
            Duration::from_millis(2001),
        );
        assert!(outcome.is_unknown());
        assert!(outcome.is_timeout());
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("probe timed out after 2000ms")
        );
    }

    #[test]
    fn test_config_defaults_and_builders() {
        let config = ProbeConfig::default();
        assert!(config.pool_size >= 1);
        assert_eq!(config.timeout, Duration::from_millis(6000));
        assert!(config.user_agent.starts_with("dirprobe/"));
        assert_eq!(config.accept_encoding, "gzip, deflate, br");

        let config = ProbeConfig::default().with_pool_size(0).with_timeout_ms(250);
        assert_eq!(config.pool_size, 1);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert!(config.validate().is_ok());

        let config = ProbeConfig::default().with_pool_size(50_000);
        assert_eq!(config.pool_size, MAX_POOL_SIZE);
    }

    #[test]
    fn test_validate_rejects_hand_built_config() {
        let mut config = ProbeConfig::default();
        config.pool_size = 0;
        assert!(config.validate().is_err());

        let config = ProbeConfig::default().with_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_timeout() {
        assert!(ProbeConfig::default().with_timeout(MAX_TIMEOUT).validate().is_ok());

        let config = ProbeConfig::default().with_timeout(MAX_TIMEOUT + Duration::from_millis(1));
        assert!(config.validate().is_err());

        let config = ProbeConfig::default().with_timeout(Duration::from_secs(u64::MAX));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout must be at most 3600s"));
    }

    #[test]
    fn test_summary_counts_classes() {
        let outcomes = vec![
            Outcome::with_status("u1", 200, Duration::ZERO),
            Outcome::with_status("u2", 204, Duration::ZERO),
            Outcome::with_status("u3", 301, Duration::ZERO),
            Outcome::with_status("u4", 404, Duration::ZERO),
            Outcome::with_status("u5", 503, Duration::ZERO),
            Outcome::failed("u6", FailureKind::Connect, "refused", None),
            Outcome::timed_out("u7", Duration::from_secs(1), Duration::from_secs(1)),
        ];
        let summary = RunSummary::from_outcomes(&outcomes);
        assert_eq!(summary.total, 7);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.redirect, 1);
        assert_eq!(summary.client_error, 1);
        assert_eq!(summary.server_error, 1);
        assert_eq!(summary.unknown, 2);
        assert_eq!(summary.timeouts, 1);
    }
}

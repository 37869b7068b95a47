use thiserror::Error;

/// Substrings that identify a connectivity failure in free-text error messages.
const NETWORK_MARKERS: &[&str] = &["connection", "network", "socket", "ssl", "tls", "dns"];
const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out"];
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "rate_limit", "too many requests", "429"];
const MALFORMED_MARKERS: &[&str] = &["bad request", "invalid request", "invalid_request", "malformed", "400"];

/// Errors reported by a rating oracle.
///
/// `Network` and `Timeout` are fatal: they abort the whole run, since carrying
/// on would skip large amounts of work while hiding an outage. Everything else
/// only excludes the affected item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("oracle returned an empty response")]
    EmptyResponse,

    #[error("{0}")]
    Unknown(String),
}

impl OracleError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// Short label for logs and rejection breakdowns.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::RateLimited(_) => "rate_limited",
            Self::MalformedInput(_) => "malformed_input",
            Self::Server { .. } => "server",
            Self::EmptyResponse => "empty_response",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Classify an untyped error message by substring.
    ///
    /// Only for clients that report errors as text. Timeout markers win over
    /// network markers so "connection timed out" maps to `Timeout`.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

        if has(TIMEOUT_MARKERS) {
            Self::Timeout(message)
        } else if has(NETWORK_MARKERS) {
            Self::Network(message)
        } else if has(RATE_LIMIT_MARKERS) {
            Self::RateLimited(message)
        } else if has(MALFORMED_MARKERS) {
            Self::MalformedInput(message)
        } else {
            Self::Unknown(message)
        }
    }
}

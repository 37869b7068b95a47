//! Classification of raw oracle verdicts before they reach the ledger.
//!
//! Each verdict is either kept (a rating, or the not-applicable sentinel) or
//! rejected with a [`RejectionKind`]. A fatal oracle error anywhere in a chunk
//! marks the whole chunk fatal; rejections only drop their own item.

use std::collections::BTreeMap;

use reviewrate_core::{Identity, Verdict, WorkItem};

use crate::OracleError;
use crate::verdict::{is_not_applicable, parse_verdict};

/// Why a verdict was kept out of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RejectionKind {
    /// Connection-error text embedded in the answer.
    ConnectionError,
    /// Malformed-HTTP / bad-request text embedded in the answer.
    MalformedHttp,
    UnrecognizedFormat,
    EmptyInput,
    /// An in-band `Error: ...` answer.
    OracleFailure,
    RateLimited,
    MalformedInput,
    ServerError,
    EmptyResponse,
    Other,
}

impl RejectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionError => "connection_error",
            Self::MalformedHttp => "malformed_http",
            Self::UnrecognizedFormat => "unrecognized_format",
            Self::EmptyInput => "empty_input",
            Self::OracleFailure => "oracle_failure",
            Self::RateLimited => "rate_limited",
            Self::MalformedInput => "malformed_input",
            Self::ServerError => "server_error",
            Self::EmptyResponse => "empty_response",
            Self::Other => "other",
        }
    }

    /// Rejection kind for a recoverable oracle error.
    fn from_error(err: &OracleError) -> Self {
        match err {
            OracleError::RateLimited(_) => Self::RateLimited,
            OracleError::MalformedInput(_) => Self::MalformedInput,
            OracleError::Server { .. } => Self::ServerError,
            OracleError::EmptyResponse => Self::EmptyResponse,
            OracleError::Network(_) => Self::ConnectionError,
            OracleError::Timeout(_) | OracleError::Unknown(_) => Self::Other,
        }
    }
}

impl std::fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive substrings that reject a verdict, checked in order.
const REJECTION_MARKERS: &[(&str, RejectionKind)] = &[
    ("connection error", RejectionKind::ConnectionError),
    ("connection refused", RejectionKind::ConnectionError),
    ("connection reset", RejectionKind::ConnectionError),
    ("apiconnectionerror", RejectionKind::ConnectionError),
    ("bad request", RejectionKind::MalformedHttp),
    ("error code: 4", RejectionKind::MalformedHttp),
    ("error code: 5", RejectionKind::MalformedHttp),
    ("invalid_request_error", RejectionKind::MalformedHttp),
    ("http error", RejectionKind::MalformedHttp),
    ("unexpected format", RejectionKind::UnrecognizedFormat),
    ("unrecognized format", RejectionKind::UnrecognizedFormat),
    ("empty input", RejectionKind::EmptyInput),
    ("input is empty", RejectionKind::EmptyInput),
];

/// Outcome of inspecting a single verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictClass {
    Rated,
    /// The exact not-applicable sentinel: a legitimate "no opinion".
    NotApplicable,
    Rejected(RejectionKind),
}

pub fn classify_verdict(text: &str) -> VerdictClass {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return VerdictClass::Rejected(RejectionKind::EmptyInput);
    }
    if is_not_applicable(trimmed) {
        return VerdictClass::NotApplicable;
    }
    let lower = trimmed.to_lowercase();
    if let Some((_, kind)) = REJECTION_MARKERS.iter().find(|(m, _)| lower.contains(m)) {
        return VerdictClass::Rejected(*kind);
    }
    if lower.starts_with("error:") {
        return VerdictClass::Rejected(RejectionKind::OracleFailure);
    }
    VerdictClass::Rated
}

/// A verdict that passed classification.
#[derive(Debug, Clone)]
pub struct AcceptedVerdict {
    pub item: WorkItem,
    pub verdict: Verdict,
    pub class: VerdictClass,
    /// Parsed 1..5 score, if the verdict followed the `[Score, Reason]` format.
    pub score: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct RejectedVerdict {
    pub identity: Identity,
    pub kind: RejectionKind,
    pub detail: String,
}

/// Result of classifying every outcome of one chunk.
#[derive(Debug, Clone, Default)]
pub struct ChunkClassification {
    /// Kept verdicts, in chunk order.
    pub valid: Vec<AcceptedVerdict>,
    pub rejected: Vec<RejectedVerdict>,
    /// First fatal oracle error seen in the chunk, with the item it came from.
    pub fatal: Option<(Identity, OracleError)>,
}

impl ChunkClassification {
    /// Rejected-verdict counts by kind.
    pub fn breakdown(&self) -> BTreeMap<RejectionKind, usize> {
        let mut out = BTreeMap::new();
        for r in &self.rejected {
            *out.entry(r.kind).or_insert(0) += 1;
        }
        out
    }
}

/// Split a chunk's outcomes into kept and rejected verdicts.
///
/// Outcomes must be in chunk order; the kept subset preserves it.
pub fn classify_chunk(
    outcomes: Vec<(WorkItem, Result<Verdict, OracleError>)>,
) -> ChunkClassification {
    let mut out = ChunkClassification::default();

    for (item, outcome) in outcomes {
        match outcome {
            Ok(verdict) => match classify_verdict(&verdict.text) {
                VerdictClass::Rejected(kind) => out.rejected.push(RejectedVerdict {
                    identity: item.identity,
                    kind,
                    detail: verdict.text,
                }),
                class => {
                    let score = parse_verdict(&verdict.text).score();
                    out.valid.push(AcceptedVerdict {
                        item,
                        verdict,
                        class,
                        score,
                    });
                }
            },
            Err(err) if err.is_fatal() => {
                if out.fatal.is_none() {
                    out.fatal = Some((item.identity, err));
                }
            }
            Err(err) => out.rejected.push(RejectedVerdict {
                identity: item.identity,
                kind: RejectionKind::from_error(&err),
                detail: err.to_string(),
            }),
        }
    }

    out
}

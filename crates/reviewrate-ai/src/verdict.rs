//! Parsing of `[Score, Reason]` verdicts.

use crate::prompt::NOT_APPLICABLE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedVerdict {
    /// The model answered the not-applicable sentinel.
    NotApplicable,
    Scored { score: u8, reason: String },
    /// Free-form text that does not follow the requested format.
    Unparsed,
}

impl ParsedVerdict {
    pub fn score(&self) -> Option<i32> {
        match self {
            Self::Scored { score, .. } => Some(i32::from(*score)),
            _ => None,
        }
    }
}

/// Whether `text` is exactly the not-applicable sentinel, ignoring whitespace.
///
/// Never a substring match: malformed text that merely contains the sentinel
/// is not "not applicable".
pub fn is_not_applicable(text: &str) -> bool {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    compact == NOT_APPLICABLE
}

pub fn parse_verdict(text: &str) -> ParsedVerdict {
    if is_not_applicable(text) {
        return ParsedVerdict::NotApplicable;
    }
    let Some(inner) = text
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
    else {
        return ParsedVerdict::Unparsed;
    };
    // Models answering in CJK locales use the full-width comma.
    let Some((score, reason)) = inner.split_once([',', '，']) else {
        return ParsedVerdict::Unparsed;
    };
    match score.trim().parse::<u8>() {
        Ok(score @ 1..=5) => ParsedVerdict::Scored {
            score,
            reason: reason.trim().to_string(),
        },
        _ => ParsedVerdict::Unparsed,
    }
}

//! Work items, identities, and the annotation records written to the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deduplication key of a work item: `(item_id, reviewer_id, property_name)`.
///
/// Stable across repeated sampling. At most one ledger row may exist per identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub item_id: String,
    pub reviewer_id: String,
    pub property_name: String,
}

impl Identity {
    pub fn new(
        item_id: impl Into<String>,
        reviewer_id: impl Into<String>,
        property_name: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            reviewer_id: reviewer_id.into(),
            property_name: property_name.into(),
        }
    }

    /// Project onto the identity columns that are actually in use.
    pub fn key(&self, columns: &IdentityColumns) -> IdentityKey {
        IdentityKey {
            item_id: columns.item_id.then(|| self.item_id.clone()),
            reviewer_id: columns.reviewer_id.then(|| self.reviewer_id.clone()),
            property_name: columns.property_name.then(|| self.property_name.clone()),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.item_id, self.reviewer_id, self.property_name)
    }
}

/// Which identity columns participate in deduplication.
///
/// Normally all three. Narrowed when the sampled table lacks one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityColumns {
    pub item_id: bool,
    pub reviewer_id: bool,
    pub property_name: bool,
}

impl Default for IdentityColumns {
    fn default() -> Self {
        Self::all()
    }
}

impl IdentityColumns {
    pub fn all() -> Self {
        Self {
            item_id: true,
            reviewer_id: true,
            property_name: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.item_id || self.reviewer_id || self.property_name)
    }

    /// Ledger column names of the identity fields not in use.
    pub fn dropped(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.item_id {
            out.push(crate::ledger::ITEM_ID);
        }
        if !self.reviewer_id {
            out.push(crate::ledger::REVIEWER_ID);
        }
        if !self.property_name {
            out.push(crate::ledger::PROPERTY_NAME);
        }
        out
    }
}

/// An identity projected onto a (possibly narrowed) set of columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub item_id: Option<String>,
    pub reviewer_id: Option<String>,
    pub property_name: Option<String>,
}

/// One (review, property) pair awaiting a rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Partition key, e.g. the product line.
    pub partition: String,
    pub identity: Identity,
    pub title: String,
    pub body: String,
    /// Display name of the property used in the prompt, when the sample carries one.
    pub property_name_localized: Option<String>,
    /// Property category, e.g. "attribute" or "brand personality".
    pub property_type: String,
}

impl WorkItem {
    /// Property name as it should appear in the prompt.
    pub fn prompt_property_name(&self) -> &str {
        self.property_name_localized
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.identity.property_name)
    }
}

/// Raw answer from the rating oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub text: String,
    /// Model identifier that produced the answer.
    pub model: String,
}

impl Verdict {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
        }
    }
}

/// A persisted rating of one [`WorkItem`].
///
/// The ledger assigns a monotonically increasing `row_id` on insert; that
/// column, not `rated_at`, orders records within a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub partition: String,
    pub identity: Identity,
    pub property_type: String,
    pub ai_rating_result: String,
    pub ai_model: String,
    /// Score parsed from the verdict; `None` for "not applicable" or free-form answers.
    pub ai_score: Option<i32>,
    /// Commit time of the chunk this record belongs to.
    pub rated_at: DateTime<Utc>,
}

impl AnnotationRecord {
    pub fn from_verdict(
        item: &WorkItem,
        verdict: &Verdict,
        ai_score: Option<i32>,
        rated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            partition: item.partition.clone(),
            identity: item.identity.clone(),
            property_type: item.property_type.clone(),
            ai_rating_result: verdict.text.clone(),
            ai_model: verdict.model.clone(),
            ai_score,
            rated_at,
        }
    }
}

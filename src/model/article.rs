//! Staged article: the work item this stage advances.
//!
//! An article is created upstream in `received` status, claimed and handed
//! downstream here, and owned by the next stage afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// A staged article as stored in the shared collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Opaque identifier assigned upstream.
    pub id: ItemId,

    /// Current lifecycle status.
    pub status: ItemStatus,

    /// Raw payload. Read-only for this stage.
    pub content: Content,

    /// Annotations written by an analyzer, if one ran.
    pub ai_generated: Option<AiGenerated>,

    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// A fresh article in `received` status, as an upstream stage would create it.
    pub fn received(id: impl Into<ItemId>, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ItemStatus::Received,
            content: Content {
                raw_text: raw_text.into(),
            },
            ai_generated: None,
            updated_at: Utc::now(),
        }
    }
}

/// Newtype for article IDs. Opaque strings, never generated by this stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Article body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub raw_text: String,
}

/// Categories and tags produced by analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiGenerated {
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an article, as far as this stage is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Created upstream, waiting for this stage.
    Received,
    /// Claimed by an invocation that has not yet notified downstream.
    Claimed,
    /// Handed to the next stage.
    ProcessedForIntegration,
}

impl ItemStatus {
    /// Status only moves forward, one step at a time.
    pub fn can_advance_to(self, to: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, to),
            (Received, Claimed) | (Claimed, ProcessedForIntegration)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Received => "received",
            ItemStatus::Claimed => "claimed",
            ItemStatus::ProcessedForIntegration => "processed_for_integration",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(ItemStatus::Received),
            "claimed" => Ok(ItemStatus::Claimed),
            "processed_for_integration" => Ok(ItemStatus::ProcessedForIntegration),
            other => Err(Error::Other(format!("unknown article status: {other}"))),
        }
    }
}

//! Pluggable analysis step run on freshly claimed articles.
//!
//! The engine does not care what analysis means. An analyzer either returns
//! annotations to store next to the article or returns `None`.

use async_trait::async_trait;

use crate::config::AnalyzerKind;
use crate::error::Result;
use crate::model::{AiGenerated, Content};
use std::sync::Arc;

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn classify(&self, content: &Content) -> Result<Option<AiGenerated>>;
}

/// Does nothing. The default.
pub struct NoopAnalyzer;

#[async_trait]
impl Analyzer for NoopAnalyzer {
    async fn classify(&self, _content: &Content) -> Result<Option<AiGenerated>> {
        Ok(None)
    }
}

/// Stand-in classification until a real model is wired up.
pub struct PlaceholderAnalyzer;

#[async_trait]
impl Analyzer for PlaceholderAnalyzer {
    async fn classify(&self, content: &Content) -> Result<Option<AiGenerated>> {
        Ok(Some(AiGenerated {
            categories: vec!["unclassified".to_string()],
            tags: vec![
                "ai-processed".to_string(),
                format!("chars-{}", content.raw_text.chars().count()),
            ],
        }))
    }
}

pub fn from_kind(kind: AnalyzerKind) -> Arc<dyn Analyzer> {
    match kind {
        AnalyzerKind::None => Arc::new(NoopAnalyzer),
        AnalyzerKind::Placeholder => Arc::new(PlaceholderAnalyzer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placeholder_counts_characters_not_bytes() {
        let content = Content {
            raw_text: "héllo".to_string(),
        };
        let tags = PlaceholderAnalyzer
            .classify(&content)
            .await
            .unwrap()
            .unwrap()
            .tags;
        assert_eq!(tags, ["ai-processed", "chars-5"]);
    }

    #[tokio::test]
    async fn noop_produces_nothing() {
        assert!(
            NoopAnalyzer
                .classify(&Content::default())
                .await
                .unwrap()
                .is_none()
        );
    }
}

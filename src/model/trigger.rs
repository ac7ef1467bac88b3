//! Decoded trigger: what an adapter hands the engine.

use super::ItemId;

/// One wake-up signal. Delivery is at-least-once and unordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trigger {
    /// Item the sender asked for. `None` means "advance whatever is pending".
    pub target: Option<ItemId>,
    /// Transport message id, for log correlation only.
    pub message_id: Option<String>,
}

impl Trigger {
    pub fn wake() -> Self {
        Self::default()
    }

    pub fn for_item(id: impl Into<ItemId>) -> Self {
        Self {
            target: Some(id.into()),
            message_id: None,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

//! Core data model.
//!
//! A staged article is the unit of work. It has an opaque identity, a raw
//! payload, optional analyzer annotations, and a forward-only status.

pub mod article;
pub mod trigger;

pub use article::{AiGenerated, Article, Content, ItemId, ItemStatus};
pub use trigger::Trigger;

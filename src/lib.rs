//! # stage-advance
//!
//! One stage of a document-processing pipeline: on each trigger, claim one
//! staged article from a shared store, advance its status, and notify the
//! next stage.
//!
//! The store's conditional status write is the only synchronization between
//! concurrent invocations. See [`engine`] for the protocol and its failure
//! window.

pub mod analysis;
pub mod bus;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod store;
pub mod telemetry;
pub mod trigger;

//! Secret handling utilities.
//!
//! Re-exports secrecy types so callers never reach for the raw crate.

pub use secrecy::{ExposeSecret, SecretString};

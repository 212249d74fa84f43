//! Core types and traits for the tokenkeep workspace.
//!
//! This crate defines the shared abstractions used by the storage backends and
//! the command-line front end: the error type, the captured token record, and
//! the async [`TokenStore`] trait each backend implements.

pub mod error;
pub mod record;
pub mod traits;

pub use error::KeepError;
pub use record::{CaptureDatePolicy, HistoryEntry, TokenRecord};
pub use traits::TokenStore;

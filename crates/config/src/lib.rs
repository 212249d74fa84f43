//! Configuration loading for tokenkeep.
//!
//! Uses figment to layer defaults, an optional YAML file, and
//! `TOKENKEEP_`-prefixed environment variables.

pub mod schema;

pub use schema::{Config, ENV_PREFIX, LogConfig};

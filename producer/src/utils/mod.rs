//! # Utilities
//!
//! Environment variable helpers used when loading
//! [`ProducerConfig`](crate::config::ProducerConfig) overrides.
//!
//! ```no_run
//! use producer::utils::env::EnvUtils;
//!
//! let namespace = EnvUtils::get_optional_var("EVENTHUB_USER_AGENT")
//!     .unwrap_or_else(|| "hubline".to_string());
//! ```

pub mod env;

pub use env::{EnvUtils, EnvVarError};

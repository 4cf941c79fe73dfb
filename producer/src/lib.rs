//! # Hubline Producer
//!
//! Reliable send pipeline for event hub producers. Caller input is normalized
//! into one size-bounded batch, routed to a partition (or left to the service),
//! and sent over a single link per producer with deadline-aware retries.
//!
//! The wire protocol and credential acquisition are capabilities supplied by
//! the host through [`transport::TransportConnector`] and [`auth::AuthProvider`].
//!
//! ## Modules
//!
//! - [`producer`] - Single-link producer: `send` and `close`
//! - [`client`] - Routing of sends to per-partition producers
//! - [`model`] - Event records and batches
//! - [`wrapper`] - Normalization of input shapes into one batch
//! - [`retry`] - Retry policy, error classification and the retry executor
//! - [`session`] - One send attempt over the link
//! - [`connection`] - Link lifecycle and link options
//! - [`outcome`] - Delivery outcome hand-off from the transport
//! - [`transport`] - Transport capability traits
//! - [`auth`] - Credential providers and token caching
//! - [`tracing_hook`] - Per-record instrumentation
//! - [`config`] - Producer configuration
//! - [`common`] - Error types
//! - [`utils`] - Environment helpers

pub mod auth;
pub mod client;
pub mod common;
pub mod config;
pub mod connection;
pub mod model;
pub mod outcome;
pub mod producer;
pub mod retry;
pub mod session;
pub mod tracing_hook;
pub mod transport;
pub mod utils;
pub mod wrapper;

//! # scim-protocol
//!
//! Storage-agnostic SCIM 2.0 protocol semantics.
//!
//! Implements the resource query, mutation, and bulk-operation model of
//! [RFC 7644](https://tools.ietf.org/html/rfc7644) — System for Cross-domain
//! Identity Management — independent of any storage backend, so a gateway
//! can expose a uniform provisioning interface over arbitrary identity
//! stores. The engine operates on in-memory resource snapshots
//! (`serde_json::Value` attribute maps) and returns structured results and
//! typed errors for a thin boundary layer to serialize.
//!
//! ## Components
//! - [`path`] — case-insensitive attribute path resolution, including
//!   filter-qualified multi-valued paths and extension-schema URNs
//! - [`filter`] — SCIM filter parsing (RFC 7644 §3.4.2.2) and evaluation
//! - [`sort`] — stable type-aware sorting and 1-based pagination
//! - [`projection`] — `attributes` / `excludedAttributes` views
//! - [`patch`] — PATCH semantics (RFC 7644 §3.5.2)
//! - [`bulk`] — bulk dependency resolution and sequential execution
//! - [`etag`] — weak entity tags and conditional-request preconditions
//! - [`query`] — the composed list-query pipeline
//!
//! The engine is stateless and synchronous: every call receives a snapshot
//! and returns without touching shared state. Only the patch engine mutates
//! its input, in place, and callers must arrange at most one concurrent
//! mutation per logical resource.

pub mod bulk;
pub mod config;
pub mod error;
pub mod etag;
pub mod filter;
pub mod path;
pub mod patch;
pub mod projection;
pub mod query;
pub mod sort;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;

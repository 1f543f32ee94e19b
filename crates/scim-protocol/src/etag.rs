//! Entity tags and optimistic-concurrency preconditions (RFC 7644 §3.14).
//!
//! Tags are weak (`W/"<hex>"`): a content hash of the resource's canonical
//! serialization with its own `meta.version` removed, so two resources
//! differing only in version fingerprint identically.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{ScimError, ScimErrorKind};

/// Generate the weak entity tag for a resource snapshot.
pub fn generate_etag(resource: &Value) -> String {
    let mut stripped = resource.clone();
    if let Some(meta) = stripped.get_mut("meta").and_then(Value::as_object_mut) {
        meta.remove("version");
    }
    let digest = Sha256::digest(stripped.to_string().as_bytes());
    format!("W/\"{}\"", hex::encode(digest))
}

/// The tag content `meta.version` stores: no weak prefix, no quotes.
pub fn version_of(tag: &str) -> &str {
    tag.trim_start_matches("W/").trim_matches('"')
}

/// Render a stored `meta.version` back into wire form.
pub fn etag_for_version(version: &str) -> String {
    format!("W/\"{version}\"")
}

/// Generate the tag for a resource and record it in `meta.version`.
pub fn stamp_version(resource: &mut Value) -> String {
    let tag = generate_etag(resource);
    if let Some(meta) = resource.get_mut("meta").and_then(Value::as_object_mut) {
        meta.insert(
            "version".to_string(),
            Value::String(version_of(&tag).to_string()),
        );
    }
    tag
}

/// Outcome of conditional-header evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Proceed,
    NotModified,
    PreconditionFailed,
}

impl Precondition {
    /// The typed error a failed precondition maps to.
    pub fn as_error(&self) -> Option<ScimError> {
        match self {
            Self::PreconditionFailed => Some(ScimError::new(ScimErrorKind::InvalidVers)),
            _ => None,
        }
    }
}

/// The conditional request headers the engine evaluates.
#[derive(Debug, Clone, Default)]
pub struct ConditionalHeaders {
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
}

/// Evaluate If-Match / If-None-Match against the resource's current tag.
/// `safe_method` distinguishes reads (304) from writes (412) when
/// If-None-Match matches. No conditional header means proceed.
pub fn check_preconditions(
    headers: &ConditionalHeaders,
    current_tag: &str,
    safe_method: bool,
) -> Precondition {
    if let Some(if_match) = &headers.if_match {
        // `*` means "the resource exists", which it does if we have a tag.
        if !tag_list_matches(if_match, current_tag) {
            return Precondition::PreconditionFailed;
        }
    }
    if let Some(if_none_match) = &headers.if_none_match {
        if tag_list_matches(if_none_match, current_tag) {
            return if safe_method {
                Precondition::NotModified
            } else {
                Precondition::PreconditionFailed
            };
        }
    }
    Precondition::Proceed
}

fn tag_list_matches(header: &str, current: &str) -> bool {
    header
        .split(',')
        .map(str::trim)
        .any(|tag| tag == "*" || version_of(tag) == version_of(current))
}

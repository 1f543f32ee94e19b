//! SCIM error taxonomy (RFC 7644 §3.12).

use serde::{Deserialize, Serialize};

use crate::types::SCHEMA_ERROR;

/// SCIM error codes, one variant per `scimType` the engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScimErrorKind {
    /// Malformed filter grammar.
    InvalidFilter,
    /// Bad operation or value, duplicate bulkId, circular bulkId reference.
    InvalidValue,
    /// Malformed structural input.
    InvalidSyntax,
    /// Malformed attribute path.
    InvalidPath,
    /// PATCH path required but missing, or unresolved add/replace path.
    NoTarget,
    /// Write to an immutable attribute.
    Mutability,
    /// ETag precondition failed.
    InvalidVers,
    /// Batch or result-set size limit exceeded.
    TooMany,
    /// Resource does not exist (surfaced for the gateway's convenience).
    ResourceNotFound,
}

impl ScimErrorKind {
    /// RFC 7644 `scimType` string for this error.
    pub fn scim_type(&self) -> &'static str {
        match self {
            Self::InvalidFilter => "invalidFilter",
            Self::InvalidValue => "invalidValue",
            Self::InvalidSyntax => "invalidSyntax",
            Self::InvalidPath => "invalidPath",
            Self::NoTarget => "noTarget",
            Self::Mutability => "mutability",
            Self::InvalidVers => "invalidVers",
            Self::TooMany => "tooMany",
            Self::ResourceNotFound => "resourceNotFound",
        }
    }

    /// HTTP status the gateway should respond with.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidFilter | Self::InvalidValue | Self::InvalidSyntax |
            Self::InvalidPath | Self::NoTarget | Self::Mutability => 400,
            Self::InvalidVers => 412,
            Self::TooMany => 400,
            Self::ResourceNotFound => 404,
        }
    }

    pub fn default_detail(&self) -> &'static str {
        match self {
            Self::InvalidFilter => "Invalid SCIM filter",
            Self::InvalidValue => "Invalid value",
            Self::InvalidSyntax => "Invalid SCIM syntax",
            Self::InvalidPath => "Invalid attribute path",
            Self::NoTarget => "No target for patch operation",
            Self::Mutability => "Attribute is read-only",
            Self::InvalidVers => "Resource version mismatch",
            Self::TooMany => "Too many operations or results",
            Self::ResourceNotFound => "Resource not found",
        }
    }
}

impl std::fmt::Display for ScimErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scim_type())
    }
}

/// A typed SCIM protocol error: a kind plus a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct ScimError {
    pub kind: ScimErrorKind,
    pub detail: String,
}

impl ScimError {
    pub fn new(kind: ScimErrorKind) -> Self {
        Self {
            detail: kind.default_detail().to_string(),
            kind,
        }
    }

    pub fn with_detail(kind: ScimErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid_filter(detail: impl Into<String>) -> Self {
        Self::with_detail(ScimErrorKind::InvalidFilter, detail)
    }

    pub fn invalid_value(detail: impl Into<String>) -> Self {
        Self::with_detail(ScimErrorKind::InvalidValue, detail)
    }

    pub fn invalid_path(detail: impl Into<String>) -> Self {
        Self::with_detail(ScimErrorKind::InvalidPath, detail)
    }

    pub fn no_target(detail: impl Into<String>) -> Self {
        Self::with_detail(ScimErrorKind::NoTarget, detail)
    }

    pub fn mutability(detail: impl Into<String>) -> Self {
        Self::with_detail(ScimErrorKind::Mutability, detail)
    }
}

pub type ScimResult<T> = Result<T, ScimError>;

/// SCIM error response body (RFC 7644 §3.12).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScimErrorResponse {
    pub schemas: Vec<String>,
    pub status: String,
    #[serde(rename = "scimType", skip_serializing_if = "Option::is_none")]
    pub scim_type: Option<String>,
    pub detail: String,
}

impl ScimErrorResponse {
    pub fn new(status: u16, scim_type: Option<&str>, detail: &str) -> Self {
        Self {
            schemas: vec![SCHEMA_ERROR.to_string()],
            status: status.to_string(),
            scim_type: scim_type.map(String::from),
            detail: detail.to_string(),
        }
    }
}

impl From<&ScimError> for ScimErrorResponse {
    fn from(err: &ScimError) -> Self {
        Self::new(err.kind.status(), Some(err.kind.scim_type()), &err.detail)
    }
}

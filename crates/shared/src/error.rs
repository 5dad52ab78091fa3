//! Shared error types including RFC7807 Problem Details.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// RFC7807 Problem Details (application/problem+json)
///
/// Canonical error envelope for the REST endpoints so clients can surface
/// meaningful auth and validation errors instead of failing to decode a
/// success response type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type")]
    pub type_url: String,
    /// A short, human-readable summary of the problem type.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Field-level validation errors, present on 422 responses.
    /// BTreeMap keeps the flattened message order stable.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ProblemDetails {
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self {
            type_url: "https://lancelink.dev/problems/unauthorized".to_string(),
            title: "Unauthorized".to_string(),
            status: 401,
            detail: Some(detail.into()),
            errors: BTreeMap::new(),
        }
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self {
            type_url: "https://lancelink.dev/problems/forbidden".to_string(),
            title: "Forbidden".to_string(),
            status: 403,
            detail: Some(detail.into()),
            errors: BTreeMap::new(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self {
            type_url: "https://lancelink.dev/problems/not-found".to_string(),
            title: "Not Found".to_string(),
            status: 404,
            detail: Some(detail.into()),
            errors: BTreeMap::new(),
        }
    }

    pub fn unprocessable(errors: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            type_url: "https://lancelink.dev/problems/validation".to_string(),
            title: "Unprocessable Entity".to_string(),
            status: 422,
            detail: None,
            errors,
        }
    }

    /// Flatten field-level validation errors into one user-facing message,
    /// e.g. `email: must be a valid address; password: too short`.
    pub fn flatten_field_errors(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect();
        Some(parts.join("; "))
    }
}

/// Attempt to parse an RFC7807 (or RFC7807-ish) JSON body into a user-facing
/// message. Prefers flattened field errors, then `detail`, then `title`.
pub fn try_problem_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ProblemDetails>(body).ok()?;
    if let Some(flat) = parsed.flatten_field_errors() {
        return Some(flat);
    }
    if let Some(detail) = parsed.detail {
        if !detail.trim().is_empty() {
            return Some(detail);
        }
    }
    if !parsed.title.trim().is_empty() {
        return Some(parsed.title);
    }
    None
}

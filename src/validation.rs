//! Input validation and sanitization for product submissions.
//!
//! # Sanitization
//!
//! [`sanitize`] is a denylist filter: it strips the literal substrings in
//! [`DENYLISTED_SUBSTRINGS`] and trims surrounding whitespace. It is NOT a
//! substitute for context-aware output encoding. Event-handler attributes,
//! other tags, mixed-case `<SCRIPT>` and encoded payloads pass through
//! untouched. Consumers rendering stored values into HTML must escape them.
//!
//! # Validation
//!
//! [`validate_product`] evaluates every rule and collects all violations in a
//! fixed order (name, price, description) so error lists are deterministic.

use serde::Serialize;

use crate::models::ProductRequest;

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length for product names, in characters after trimming.
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum length for product descriptions, in characters after trimming.
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// Substrings removed by [`sanitize`]. Matching is case-sensitive.
pub const DENYLISTED_SUBSTRINGS: [&str; 3] = ["<script>", "</script>", "javascript:"];

/// A single field-level rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Name of the offending input field
    pub field: String,
    /// Human-readable violation description
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a product creation request.
///
/// Rules:
/// - `name` must be non-empty and at most 100 characters after trimming
/// - `price`, when present, must be non-negative
/// - `description`, when present, must be at most 500 characters after trimming
///
/// Returns an empty list when the request is valid.
pub fn validate_product(req: &ProductRequest) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let name = req.name.trim();
    if name.is_empty() {
        errors.push(ValidationError::new("name", "Name is required"));
    } else if name.chars().count() > MAX_NAME_LENGTH {
        errors.push(ValidationError::new(
            "name",
            "Name must be less than 100 characters",
        ));
    }

    if let Some(price) = req.price
        && price < 0.0
    {
        errors.push(ValidationError::new("price", "Price must be non-negative"));
    }

    if let Some(description) = &req.description
        && description.trim().chars().count() > MAX_DESCRIPTION_LENGTH
    {
        errors.push(ValidationError::new(
            "description",
            "Description must be less than 500 characters",
        ));
    }

    errors
}

/// Strip denylisted substrings and trim whitespace.
///
/// Removal repeats until no denylisted substring remains, so input such as
/// `<scr<script>ipt>` cannot reassemble a marker and the function is
/// idempotent.
pub fn sanitize(input: &str) -> String {
    let mut current = input.to_string();

    while DENYLISTED_SUBSTRINGS
        .iter()
        .any(|pattern| current.contains(pattern))
    {
        for pattern in DENYLISTED_SUBSTRINGS {
            current = current.replace(pattern, "");
        }
    }

    current.trim().to_string()
}

/// Sanitize the free-text fields of a request in place.
///
/// Runs before validation so a name that is empty after sanitization still
/// fails the "required" rule.
pub fn sanitize_product(req: &mut ProductRequest) {
    req.name = sanitize(&req.name);
    if let Some(description) = req.description.as_mut() {
        *description = sanitize(description);
    }
}

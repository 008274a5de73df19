//! Input validation for configured pointers and extracted names.

use crate::errors::{ConfigError, EvaluationError};

/// Validate a JSON pointer expression before it is accepted from the
/// environment. RFC 6901: empty selects the whole document (useless
/// here), otherwise the pointer must start with '/' and '~' may only
/// introduce the escapes ~0 and ~1.
pub fn validate_pointer_expression(pointer: &str) -> Result<(), ConfigError> {
    if pointer.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "SA_JSON_POINTER".to_string(),
            reason: "pointer is empty".to_string(),
        });
    }

    if !pointer.starts_with('/') {
        return Err(ConfigError::InvalidValue {
            key: "SA_JSON_POINTER".to_string(),
            reason: "pointer must start with '/'".to_string(),
        });
    }

    let mut chars = pointer.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '~' && !matches!(chars.peek(), Some('0') | Some('1')) {
            return Err(ConfigError::InvalidValue {
                key: "SA_JSON_POINTER".to_string(),
                reason: "'~' must be followed by '0' or '1'".to_string(),
            });
        }
    }

    Ok(())
}

/// Validate a service account name pulled out of an admitted object.
pub fn validate_service_account_name(name: &str) -> Result<(), EvaluationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EvaluationError::identity_resolution(
            "extracted service account name is empty",
        ));
    }

    if name.chars().any(char::is_control) {
        return Err(EvaluationError::identity_resolution(
            "extracted service account name contains control characters",
        ));
    }

    // DNS subdomain limit for Kubernetes object names.
    if name.len() > 253 {
        return Err(EvaluationError::identity_resolution(
            "extracted service account name is too long",
        ));
    }

    Ok(())
}

//! Input validation for caller-supplied identifiers. Runs before any I/O so
//! malformed requests are rejected with a client-facing error distinct from
//! server failures.

use redlens_core::CoreError;
use regex::Regex;
use std::sync::OnceLock;

const MAX_INPUT_LENGTH: usize = 100;

fn dangerous_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r#"[<>"'`]"#,                                       // HTML/JS injection
            r"(?i)(script|javascript|vbscript)",                // script injection
            r"(?i)(drop|delete|insert|update|select|union|exec)", // SQL keywords
            r"(?i)(file|ftp|http|https|ldap|gopher)://",        // protocol injection
            r"(?i)(\$\{|\{\{|%\{)",                             // template injection
            r"\.\.+[/\\]",                                      // path traversal
            r"(?i)(etc/passwd|/etc/shadow|proc/self)",          // system file access
            r"[;&|$()]",                                        // command injection
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("validation pattern must compile"))
        .collect()
    })
}

/// Validate a caller-supplied string (subreddit or topic) and return it
/// trimmed. Rejection is a validation failure, never a server error.
pub fn validate_input_string(input: &str, param_name: &str) -> Result<String, CoreError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput {
            message: format!("{} must be a non-empty string", param_name),
        });
    }

    if trimmed.len() > MAX_INPUT_LENGTH {
        return Err(CoreError::InvalidInput {
            message: format!(
                "{} is too long (max {} characters)",
                param_name, MAX_INPUT_LENGTH
            ),
        });
    }

    for pattern in dangerous_patterns() {
        if pattern.is_match(trimmed) {
            return Err(CoreError::InvalidInput {
                message: format!("{} contains potentially malicious content", param_name),
            });
        }
    }

    Ok(trimmed.to_string())
}

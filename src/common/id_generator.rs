// src/common/id_generator.rs
//! Crockford Base32 ID Generator
//!
//! Generates human-readable, prefixed IDs using Crockford Base32 encoding.
//! Format: PREFIX_XXXXXX (e.g., U_K7NP3X for accounts)
//!
//! Benefits:
//! - No ambiguous characters (excludes I, L, O, U)
//! - Case-insensitive
//! - Easy to read, type, and communicate verbally
//!
//! The same alphabet also backs `generate_raw_id`, which the password-reset
//! flow uses at length 40 (5 bits per character, 200 bits of entropy) for
//! unguessable single-use tokens.

use rand::Rng;

/// Crockford Base32 alphabet (excludes I, L, O, U to avoid confusion)
const CROCKFORD_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Entity type prefixes for ID generation
#[derive(Debug, Clone, Copy)]
pub enum EntityPrefix {
    /// Account (U_)
    Account,
    /// External identity (N_) - N for federated Network identity
    Identity,
    /// Audit log entry (H_) - H for History
    Audit,
}

impl EntityPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPrefix::Account => "U",
            EntityPrefix::Identity => "N",
            EntityPrefix::Audit => "H",
        }
    }
}

/// Generate a random Crockford Base32 string of specified length
fn generate_crockford_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..32);
            CROCKFORD_ALPHABET[idx] as char
        })
        .collect()
}

/// Generate a prefixed ID using Crockford Base32 encoding
pub fn generate_id(prefix: EntityPrefix) -> String {
    format!("{}_{}", prefix.as_str(), generate_crockford_string(8))
}

/// Generate a raw Crockford Base32 string without prefix
pub fn generate_raw_id(length: usize) -> String {
    generate_crockford_string(length)
}

/// Generate an Account ID (U_XXXXXXXX)
pub fn generate_account_id() -> String {
    generate_id(EntityPrefix::Account)
}

/// Generate an External Identity ID (N_XXXXXXXX)
pub fn generate_identity_id() -> String {
    generate_id(EntityPrefix::Identity)
}

/// Generate an Audit entry ID (H_XXXXXXXX)
pub fn generate_audit_id() -> String {
    generate_id(EntityPrefix::Audit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_id_format() {
        let account_id = generate_account_id();
        assert!(account_id.starts_with("U_"));
        assert_eq!(account_id.len(), 10); // "U_" + 8 chars

        let identity_id = generate_identity_id();
        assert!(identity_id.starts_with("N_"));
        assert_eq!(identity_id.len(), 10);
    }

    #[test]
    fn test_crockford_alphabet_only() {
        let id = generate_account_id();
        let random_part = &id[2..];

        for c in random_part.chars() {
            assert!(
                CROCKFORD_ALPHABET.contains(&(c as u8)),
                "Character '{}' not in Crockford alphabet",
                c
            );
        }

        assert!(!random_part.contains('I'));
        assert!(!random_part.contains('L'));
        assert!(!random_part.contains('O'));
        assert!(!random_part.contains('U'));
    }

    #[test]
    fn test_uniqueness() {
        let mut ids = HashSet::new();
        for _ in 0..1000 {
            let id = generate_account_id();
            assert!(ids.insert(id), "Duplicate ID generated");
        }
    }

    #[test]
    fn test_raw_id() {
        let raw = generate_raw_id(40);
        assert_eq!(raw.len(), 40);
        assert!(!raw.contains('_'));
    }
}

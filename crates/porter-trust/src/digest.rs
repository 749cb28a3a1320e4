//! Credential digesting and constant-time comparison.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// One-way digest of a bearer secret, as lowercase hex.
///
/// This is the only representation of a credential the store ever persists;
/// the raw secret never outlives the call that carried it.
pub fn credential_digest(secret: &str) -> String {
    hex::encode(digest_bytes(secret))
}

/// Raw digest bytes of a bearer secret, for in-memory comparison.
pub(crate) fn digest_bytes(secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

/// Constant-time equality between a presented secret's digest and a stored
/// digest (hex). A stored digest that fails to decode never matches.
pub(crate) fn digest_matches(presented_digest: &[u8], stored_hex: &str) -> bool {
    match hex::decode(stored_hex) {
        Ok(stored) if stored.len() == presented_digest.len() => {
            presented_digest.ct_eq(&stored).into()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_hex() {
        let d = credential_digest("secret123");
        assert_eq!(d.len(), 64);
        assert_eq!(d, credential_digest("secret123"));
        assert_ne!(d, credential_digest("secret124"));
    }

    #[test]
    fn matching_respects_digest_bytes() {
        let d = credential_digest("hunter2");
        let raw = hex::decode(&d).unwrap();
        assert!(digest_matches(&raw, &d));
        assert!(!digest_matches(&raw, &credential_digest("other")));
    }

    #[test]
    fn malformed_stored_digest_never_matches() {
        let raw = hex::decode(credential_digest("x")).unwrap();
        assert!(!digest_matches(&raw, "not-hex"));
        assert!(!digest_matches(&raw, "abcd")); // wrong length
    }
}

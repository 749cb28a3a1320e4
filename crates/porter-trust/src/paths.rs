//! KV key layout for the trust store.
//!
//! Peer metadata and each key are independently addressable so partial reads
//! never load the whole peer graph:
//!
//! ```text
//! peers/{peer_id}/meta
//! peers/{peer_id}/keys/{key_id}
//! ```

/// Prefix under which all peer records live.
pub(crate) const PEERS_PREFIX: &str = "peers/";

pub(crate) fn peer_meta(peer_id: &str) -> String {
    format!("peers/{peer_id}/meta")
}

pub(crate) fn peer_key(peer_id: &str, key_id: &str) -> String {
    format!("peers/{peer_id}/keys/{key_id}")
}

pub(crate) fn peer_keys_prefix(peer_id: &str) -> String {
    format!("peers/{peer_id}/keys/")
}

/// Validates a peer id as a usable domain-identity string.
///
/// Domain labels only: lowercase alphanumerics, `-` and `.`. This also keeps
/// peer ids safe to embed in KV keys (no `/`, no whitespace).
pub(crate) fn valid_peer_id(peer_id: &str) -> bool {
    !peer_id.is_empty()
        && peer_id.len() <= 253
        && !peer_id.starts_with('.')
        && !peer_id.ends_with('.')
        && peer_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_and_key_paths() {
        assert_eq!(peer_meta("a.example"), "peers/a.example/meta");
        assert_eq!(
            peer_key("a.example", "k-000001-abcd"),
            "peers/a.example/keys/k-000001-abcd"
        );
        assert_eq!(peer_keys_prefix("a.example"), "peers/a.example/keys/");
    }

    #[test]
    fn peer_id_validation() {
        assert!(valid_peer_id("a.example"));
        assert!(valid_peer_id("agent-7.sub.example.com"));
        assert!(!valid_peer_id(""));
        assert!(!valid_peer_id("A.example"));
        assert!(!valid_peer_id("a.example/evil"));
        assert!(!valid_peer_id(".example"));
        assert!(!valid_peer_id("example."));
        assert!(!valid_peer_id("has space.example"));
    }
}

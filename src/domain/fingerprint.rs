use sha2::{Digest, Sha256};

use crate::domain::value_objects::Fingerprint;

/// Compute a SHA-256 fingerprint of a changeset file's raw bytes.
///
/// Two reports with the same fingerprint were produced from the same
/// recorded changeset. An empty changeset has a well-defined fingerprint
/// (hash of zero bytes).
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    let hash = Sha256::digest(bytes);
    Fingerprint(format!("{:x}", hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_fingerprint() {
        let bytes = b"T\x02\x01\x00points\x00";
        assert_eq!(fingerprint(bytes), fingerprint(bytes));
    }

    #[test]
    fn different_bytes_different_fingerprint() {
        assert_ne!(fingerprint(b"a"), fingerprint(b"b"));
    }

    #[test]
    fn empty_input_is_the_sha256_of_nothing() {
        assert_eq!(
            fingerprint(&[]).as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}

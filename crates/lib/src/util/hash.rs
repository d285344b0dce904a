//! Digests of built artifacts.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
  hex::encode(Sha256::digest(data))
}

/// Returns true when `digest` is the SHA-256 of `data`.
///
/// Comparison ignores case so digests copied from other tools still match.
pub fn verify(data: &[u8], digest: &str) -> bool {
  sha256_hex(data).eq_ignore_ascii_case(digest)
}

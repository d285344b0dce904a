//! Shared utilities.
//!
//! Artifact digests, the base64 serde bridge used by the wire types, and test
//! helpers.

pub mod hash;
pub mod serde_b64;

#[cfg(test)]
pub mod testutil;

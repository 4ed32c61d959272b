//! Dual-hash image identity (C2).
//!
//! Any single hash family may, over the service's lifetime, develop
//! weaknesses enabling a chosen-prefix collision. Binding two independent
//! families forces an adversary to produce a simultaneous collision in both.

use sha2::{Digest, Sha512};
use std::fmt;

pub const SHA512_LEN: usize = 64;
pub const BLAKE3_LEN: usize = 64;
pub const IDENTITY_LEN: usize = SHA512_LEN + BLAKE3_LEN;

/// A 128-byte fingerprint: a 64-byte SHA-512 digest followed by a 64-byte
/// BLAKE3-512 digest of the exact same bytes. Order is significant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity([u8; IDENTITY_LEN]);

impl Identity {
    /// Computes the identity of `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        let sha512 = Sha512::digest(bytes);

        let mut blake3_hasher = blake3::Hasher::new();
        blake3_hasher.update(bytes);
        let mut blake3_sum = [0u8; BLAKE3_LEN];
        blake3_hasher
            .finalize_xof()
            .fill(&mut blake3_sum);

        let mut out = [0u8; IDENTITY_LEN];
        out[..SHA512_LEN].copy_from_slice(&sha512);
        out[SHA512_LEN..].copy_from_slice(&blake3_sum);
        Identity(out)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    /// A stable, filesystem- and cache-safe hex encoding, used as the object
    /// store key and as the C1 lock-map key for parsing.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(IDENTITY_LEN * 2);
        for byte in self.0 {
            s.push_str(&format!("{byte:02x}"));
        }
        s
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != IDENTITY_LEN * 2 {
            return None;
        }
        let mut out = [0u8; IDENTITY_LEN];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_pair = std::str::from_utf8(chunk).ok()?;
            out[i] = u8::from_str_radix(hex_pair, 16).ok()?;
        }
        Some(Identity(out))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identity").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_share_identity() {
        let a = Identity::of(b"firmware image bytes");
        let b = Identity::of(b"firmware image bytes");
        assert_eq!(a, b);
    }

    #[test]
    fn different_bytes_differ() {
        let a = Identity::of(b"firmware image bytes");
        let b = Identity::of(b"firmware image bytes!");
        assert_ne!(a, b);
    }

    #[test]
    fn hex_roundtrip() {
        let id = Identity::of(b"some firmware");
        let hex = id.to_hex();
        assert_eq!(hex.len(), IDENTITY_LEN * 2);
        let back = Identity::from_hex(&hex).expect("parse back");
        assert_eq!(id, back);
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(Identity::from_hex("deadbeef").is_none());
    }

    #[test]
    fn empty_input_is_deterministic() {
        assert_eq!(Identity::of(b""), Identity::of(b""));
    }
}

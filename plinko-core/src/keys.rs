//! Master secret handling and domain-separated key derivation.
//!
//! A deployment holds a single 128-bit master secret. Every subkey the
//! core needs is derived from it by hashing with a fixed derivation label
//! plus a per-use context string, so identical `(master, n, m)` inputs
//! always reproduce the same hints across processes and restarts.

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{PirError, Result};

pub type PrfKey128 = [u8; 16];

/// Required master secret length in bytes.
pub const MASTER_SECRET_LEN: usize = 16;

/// Derivation label separating this KDF from any other use of SHA-256.
const KDF_LABEL: &[u8] = b"iprf-key-derivation-v1";

/// Context reserved for the iPRF's permutation subkey.
pub const CTX_PRP: &str = "iprf-P-v1";

/// Context reserved for the iPRF's multinomial-sampler subkey.
pub const CTX_PMNS: &str = "iprf-S-v1";

/// A 128-bit master secret, wiped when dropped.
pub struct MasterSecret([u8; MASTER_SECRET_LEN]);

impl MasterSecret {
    pub fn new(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; MASTER_SECRET_LEN] =
            bytes.try_into().map_err(|_| PirError::KeyDerivation {
                expected: MASTER_SECRET_LEN,
                got: bytes.len(),
            })?;
        Ok(MasterSecret(raw))
    }

    /// Derives a 128-bit subkey for the given context string:
    /// `SHA-256(master ‖ label ‖ context)[..16]`.
    pub fn derive(&self, context: &str) -> PrfKey128 {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hasher.update(KDF_LABEL);
        hasher.update(context.as_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; 16];
        key.copy_from_slice(&digest[..16]);
        key
    }
}

impl Drop for MasterSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            MasterSecret::new(&[0u8; 15]),
            Err(PirError::KeyDerivation {
                expected: 16,
                got: 15
            })
        ));
        assert!(MasterSecret::new(&[0u8; 16]).is_ok());
    }

    #[test]
    fn derivation_is_deterministic_and_separated() {
        let master = MasterSecret::new(&[7u8; 16]).unwrap();
        let again = MasterSecret::new(&[7u8; 16]).unwrap();
        assert_eq!(master.derive(CTX_PRP), again.derive(CTX_PRP));
        assert_ne!(master.derive(CTX_PRP), master.derive(CTX_PMNS));

        let other = MasterSecret::new(&[8u8; 16]).unwrap();
        assert_ne!(master.derive(CTX_PRP), other.derive(CTX_PRP));
    }

    #[test]
    fn debug_never_prints_key_bytes() {
        let master = MasterSecret::new(&[0xAB; 16]).unwrap();
        assert_eq!(format!("{:?}", master), "MasterSecret(..)");
    }
}

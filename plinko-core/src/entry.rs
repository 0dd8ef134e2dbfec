//! 256-bit database words.
//!
//! Every record in a Plinko database is an opaque 256-bit value stored as
//! four little-endian `u64` limbs. Hints and server responses only ever
//! combine entries by XOR, so the type is little more than a fixed-width
//! bit string with an XOR algebra and a 32-byte codec.

use std::fmt;
use std::ops::{BitXor, BitXorAssign};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single database entry: 256 bits as four little-endian `u64` limbs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Entry(pub [u64; 4]);

impl Entry {
    /// Size of one encoded entry on disk and on the wire.
    pub const BYTES: usize = 32;

    /// The all-zero entry, the identity of the XOR group.
    pub const ZERO: Entry = Entry([0; 4]);

    /// Decodes an entry from its 32-byte record form.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for (i, limb) in limbs.iter_mut().enumerate() {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            *limb = u64::from_le_bytes(raw);
        }
        Entry(limbs)
    }

    /// Encodes the entry into its 32-byte record form.
    pub fn to_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, limb) in self.0.iter().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&limb.to_le_bytes());
        }
        out
    }

    /// Widens a `u64` into the low limb of an entry.
    pub fn from_u64(value: u64) -> Self {
        Entry([value, 0, 0, 0])
    }

    pub fn is_zero(self) -> bool {
        self.0 == [0; 4]
    }

    /// Lowercase hex of the 32-byte record form.
    pub fn to_hex(self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parses the 64-hex-char record form.
    pub fn from_hex(text: &str) -> Option<Self> {
        let raw = hex::decode(text).ok()?;
        let bytes: [u8; 32] = raw.try_into().ok()?;
        Some(Entry::from_bytes(&bytes))
    }
}

impl BitXor for Entry {
    type Output = Entry;

    fn bitxor(self, rhs: Entry) -> Entry {
        let mut out = self;
        out ^= rhs;
        out
    }
}

impl BitXorAssign for Entry {
    fn bitxor_assign(&mut self, rhs: Entry) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a ^= b;
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entry({})", self.to_hex())
    }
}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Entry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Entry::from_hex(&text).ok_or_else(|| D::Error::custom("expected 64 hex characters"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_roundtrip() {
        let entry = Entry([1, u64::MAX, 0xDEADBEEF, 42]);
        assert_eq!(Entry::from_bytes(&entry.to_bytes()), entry);
    }

    #[test]
    fn limbs_are_little_endian() {
        let entry = Entry::from_u64(0x0102030405060708);
        let bytes = entry.to_bytes();
        assert_eq!(bytes[0], 0x08);
        assert_eq!(bytes[7], 0x01);
        assert!(bytes[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn xor_is_involutive() {
        let a = Entry([7, 8, 9, 10]);
        let b = Entry([11, 12, 13, 14]);
        assert_eq!(a ^ b ^ b, a);
        assert_eq!(a ^ a, Entry::ZERO);
    }

    #[test]
    fn hex_roundtrip() {
        let entry = Entry([0x1122334455667788, 0, 1, u64::MAX]);
        assert_eq!(Entry::from_hex(&entry.to_hex()), Some(entry));
        assert_eq!(Entry::from_hex("zz"), None);
    }
}

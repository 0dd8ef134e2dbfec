//! Small-domain pseudorandom permutations.
//!
//! Two interchangeable constructions of a keyed bijection on `[0, n)`:
//!
//! - [`FeistelPrp`]: an unbalanced Feistel network over `[0, 2^b)` with
//!   modular-addition rounds, adapted to `[0, n)` by cycle walking.
//!   O(1) memory, a handful of AES calls per evaluation.
//! - [`TablePrp`]: explicit forward and inverse lookup tables built by a
//!   deterministic Fisher-Yates shuffle over an AES-CTR keystream.
//!   O(n) memory and init, O(1) lookups.
//!
//! Which one backs the iPRF is a construction-time choice; the contract
//! is identical.

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;

use crate::error::{PirError, Result};
use crate::keys::PrfKey128;
use crate::prf::BlockPrf;

/// Modular-addition Feistel round pairs per direction. Four is the
/// Luby-Rackoff minimum for PRP security up to the birthday bound.
const ROUND_PAIRS: u64 = 4;

/// Construction-time choice of PRP backing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrpKind {
    Feistel,
    Table,
}

/// A keyed permutation on `[0, n)`, either construction behind one handle.
pub enum Prp {
    Feistel(FeistelPrp),
    Table(TablePrp),
}

impl Prp {
    pub fn new(kind: PrpKind, key: PrfKey128, domain: u64) -> Self {
        match kind {
            PrpKind::Feistel => Prp::Feistel(FeistelPrp::new(key, domain)),
            PrpKind::Table => Prp::Table(TablePrp::new(key, domain)),
        }
    }

    pub fn domain(&self) -> u64 {
        match self {
            Prp::Feistel(prp) => prp.domain(),
            Prp::Table(prp) => prp.domain(),
        }
    }

    pub fn permute(&self, x: u64) -> Result<u64> {
        match self {
            Prp::Feistel(prp) => prp.permute(x),
            Prp::Table(prp) => prp.permute(x),
        }
    }

    pub fn inverse(&self, y: u64) -> Result<u64> {
        match self {
            Prp::Feistel(prp) => prp.inverse(y),
            Prp::Table(prp) => prp.inverse(y),
        }
    }
}

fn check_domain(value: u64, domain: u64) -> Result<()> {
    if value >= domain {
        return Err(PirError::Domain {
            what: "PRP input",
            bound: domain,
        });
    }
    Ok(())
}

fn low_mask(bits: u32) -> u64 {
    if bits == 0 {
        0
    } else {
        u64::MAX >> (64 - bits)
    }
}

/// Unbalanced Feistel network with cycle walking.
///
/// A value in `[0, 2^b)` with `b = ceil(log2 n)` splits into halves of
/// `b_L = b - b/2` and `b_R = b/2` bits. Modular addition keeps the
/// rounds invertible despite the unequal widths; outputs landing in
/// `[n, 2^b)` are re-encrypted until they fall inside the domain.
pub struct FeistelPrp {
    prf: BlockPrf,
    domain: u64,
    bits_left: u32,
    bits_right: u32,
}

impl FeistelPrp {
    pub fn new(key: PrfKey128, domain: u64) -> Self {
        let width = (64 - domain.saturating_sub(1).leading_zeros()).max(1);
        let bits_right = width / 2;
        Self {
            prf: BlockPrf::new(key),
            domain,
            bits_left: width - bits_right,
            bits_right,
        }
    }

    pub fn domain(&self) -> u64 {
        self.domain
    }

    /// `F(v, r, w) = AES(v ‖ r) mod 2^w`, big-endian 8+8 byte encoding.
    fn round_word(&self, value: u64, subround: u64, bits: u32) -> u64 {
        self.prf.eval_u64(value, subround) & low_mask(bits)
    }

    fn encrypt_once(&self, value: u64) -> u64 {
        let mask_l = low_mask(self.bits_left);
        let mask_r = low_mask(self.bits_right);
        let mut left = value >> self.bits_right;
        let mut right = value & mask_r;
        for pair in 0..ROUND_PAIRS {
            left = left.wrapping_add(self.round_word(right, 2 * pair, self.bits_left)) & mask_l;
            right =
                right.wrapping_add(self.round_word(left, 2 * pair + 1, self.bits_right)) & mask_r;
        }
        (left << self.bits_right) | right
    }

    fn decrypt_once(&self, value: u64) -> u64 {
        let mask_l = low_mask(self.bits_left);
        let mask_r = low_mask(self.bits_right);
        let mut left = value >> self.bits_right;
        let mut right = value & mask_r;
        for pair in (0..ROUND_PAIRS).rev() {
            right =
                right.wrapping_sub(self.round_word(left, 2 * pair + 1, self.bits_right)) & mask_r;
            left = left.wrapping_sub(self.round_word(right, 2 * pair, self.bits_left)) & mask_l;
        }
        (left << self.bits_right) | right
    }

    pub fn permute(&self, x: u64) -> Result<u64> {
        check_domain(x, self.domain)?;
        if self.domain == 1 {
            return Ok(0);
        }
        let mut y = self.encrypt_once(x);
        while y >= self.domain {
            y = self.encrypt_once(y);
        }
        Ok(y)
    }

    pub fn inverse(&self, y: u64) -> Result<u64> {
        check_domain(y, self.domain)?;
        if self.domain == 1 {
            return Ok(0);
        }
        let mut x = self.decrypt_once(y);
        while x >= self.domain {
            x = self.decrypt_once(x);
        }
        Ok(x)
    }
}

/// Lookup-table permutation built by a keyed Fisher-Yates shuffle.
pub struct TablePrp {
    forward: Vec<u64>,
    inverse: Vec<u64>,
}

impl TablePrp {
    pub fn new(key: PrfKey128, domain: u64) -> Self {
        let mut forward: Vec<u64> = (0..domain).collect();
        let mut stream = ShuffleStream::new(key);
        for i in (1..forward.len()).rev() {
            let j = stream.uniform(i as u64 + 1) as usize;
            forward.swap(i, j);
        }
        let mut inverse = vec![0u64; forward.len()];
        for (i, &y) in forward.iter().enumerate() {
            inverse[y as usize] = i as u64;
        }
        Self { forward, inverse }
    }

    pub fn domain(&self) -> u64 {
        self.forward.len() as u64
    }

    pub fn permute(&self, x: u64) -> Result<u64> {
        check_domain(x, self.domain())?;
        Ok(self.forward[x as usize])
    }

    pub fn inverse(&self, y: u64) -> Result<u64> {
        check_domain(y, self.domain())?;
        Ok(self.inverse[y as usize])
    }
}

/// Deterministic 64-bit word stream from AES-CTR with a zero nonce.
struct ShuffleStream {
    cipher: ctr::Ctr128BE<Aes128>,
}

impl ShuffleStream {
    fn new(key: PrfKey128) -> Self {
        let iv = [0u8; 16];
        Self {
            cipher: ctr::Ctr128BE::<Aes128>::new(&key.into(), &iv.into()),
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.cipher.apply_keystream(&mut buf);
        u64::from_be_bytes(buf)
    }

    /// Uniform draw from `[0, bound)` by rejection, so non-power-of-two
    /// bounds carry no modulo bias.
    fn uniform(&mut self, bound: u64) -> u64 {
        let excess = (u64::MAX % bound).wrapping_add(1) % bound;
        let limit = u64::MAX - excess;
        loop {
            let v = self.next_u64();
            if v <= limit {
                return v % bound;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn feistel_roundtrip_small_domain() {
        let prp = FeistelPrp::new([0u8; 16], 1000);
        for x in [47u64, 74, 75, 83, 95, 97] {
            let y = prp.permute(x).unwrap();
            assert!(y < 1000);
            assert_eq!(prp.inverse(y).unwrap(), x, "roundtrip failed for x={}", x);
        }
    }

    #[test]
    fn feistel_is_permutation() {
        let prp = FeistelPrp::new([1u8; 16], 300);
        let mut outputs: Vec<u64> = (0..300).map(|x| prp.permute(x).unwrap()).collect();
        outputs.sort_unstable();
        outputs.dedup();
        assert_eq!(outputs.len(), 300);
    }

    #[test]
    fn feistel_forward_of_inverse_is_identity() {
        let prp = FeistelPrp::new([9u8; 16], 257);
        for y in 0..257 {
            assert_eq!(prp.permute(prp.inverse(y).unwrap()).unwrap(), y);
        }
    }

    #[test]
    fn feistel_handles_degenerate_domains() {
        let one = FeistelPrp::new([5u8; 16], 1);
        assert_eq!(one.permute(0).unwrap(), 0);
        assert_eq!(one.inverse(0).unwrap(), 0);

        let two = FeistelPrp::new([5u8; 16], 2);
        let outputs = [two.permute(0).unwrap(), two.permute(1).unwrap()];
        assert_ne!(outputs[0], outputs[1]);
    }

    #[test]
    fn table_is_permutation_with_ascii_key() {
        let prp = TablePrp::new(*b"0123456789abcdef", 10_000);
        let mut seen = vec![false; 10_000];
        for x in 0..10_000u64 {
            let y = prp.permute(x).unwrap();
            assert!(!seen[y as usize], "output {} repeated", y);
            seen[y as usize] = true;
            assert_eq!(prp.inverse(y).unwrap(), x);
        }
        assert!(seen.iter().all(|&hit| hit));
    }

    #[test]
    fn domain_violations_are_rejected() {
        let prp = Prp::new(PrpKind::Feistel, [2u8; 16], 100);
        assert!(matches!(
            prp.permute(100),
            Err(PirError::Domain { bound: 100, .. })
        ));
        let table = Prp::new(PrpKind::Table, [2u8; 16], 100);
        assert!(table.inverse(100).is_err());
    }

    #[test]
    fn shuffle_stream_respects_bounds() {
        let mut stream = ShuffleStream::new([7u8; 16]);
        for bound in [1u64, 2, 3, 7, 100, 1 << 33] {
            for _ in 0..50 {
                assert!(stream.uniform(bound) < bound);
            }
        }
    }

    proptest! {
        #[test]
        fn feistel_roundtrip(domain in 1u64..5000, seed in 0u8..16) {
            let prp = FeistelPrp::new([seed; 16], domain);
            let x = domain / 2;
            let y = prp.permute(x).unwrap();
            prop_assert!(y < domain);
            prop_assert_eq!(prp.inverse(y).unwrap(), x);
        }

        #[test]
        fn table_roundtrip(domain in 1u64..2000, seed in 0u8..16) {
            let prp = TablePrp::new([seed; 16], domain);
            let x = domain - 1;
            let y = prp.permute(x).unwrap();
            prop_assert!(y < domain);
            prop_assert_eq!(prp.inverse(y).unwrap(), x);
        }
    }
}

//! Pseudorandom Multinomial Sampler.
//!
//! `n` balls are thrown into `m` bins by a binary descent over the bin
//! interval: every internal node splits its ball count between the left
//! and right halves with a derandomized binomial draw, so for uniform
//! inputs the bin loads are statistically close to multinomial.
//!
//! The same split decisions can be replayed descending by bin value,
//! which yields the preimage of a bin as one contiguous ball range:
//! `{ x : S(x) = y } = [start, start + count)`.

use sha2::{Digest, Sha256};

use crate::binomial;
use crate::keys::PrfKey128;
use crate::prf::BlockPrf;

/// Contiguous preimage of one bin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreimageRange {
    pub start: u64,
    pub count: u64,
}

impl PreimageRange {
    pub fn contains(&self, ball: u64) -> bool {
        ball >= self.start && ball - self.start < self.count
    }

    pub fn iter(&self) -> std::ops::Range<u64> {
        self.start..self.start + self.count
    }
}

pub struct Pmns {
    prf: BlockPrf,
    balls: u64,
    bins: u64,
}

impl Pmns {
    pub fn new(key: PrfKey128, balls: u64, bins: u64) -> Self {
        Self {
            prf: BlockPrf::new(key),
            balls,
            bins,
        }
    }

    pub fn balls(&self) -> u64 {
        self.balls
    }

    pub fn bins(&self) -> u64 {
        self.bins
    }

    /// Forward direction: the bin that ball `x` lands in. `x` must be
    /// below the ball count; the iPRF layer checks that.
    pub fn assign(&self, x: u64) -> u64 {
        if self.bins <= 1 {
            return 0;
        }
        let mut low = 0u64;
        let mut high = self.bins - 1;
        let mut start = 0u64;
        let mut count = self.balls;
        while low < high {
            let mid = low + (high - low) / 2;
            let left = self.node_split(low, mid, high, start, count);
            if x < start + left {
                high = mid;
                count = left;
            } else {
                low = mid + 1;
                start += left;
                count -= left;
            }
        }
        low
    }

    /// Inverse direction: the contiguous ball range assigned to bin `y`.
    pub fn preimage(&self, y: u64) -> PreimageRange {
        if self.bins <= 1 {
            return PreimageRange {
                start: 0,
                count: self.balls,
            };
        }
        let mut low = 0u64;
        let mut high = self.bins - 1;
        let mut start = 0u64;
        let mut count = self.balls;
        while low < high {
            let mid = low + (high - low) / 2;
            let left = self.node_split(low, mid, high, start, count);
            if y <= mid {
                high = mid;
                count = left;
            } else {
                low = mid + 1;
                start += left;
                count -= left;
            }
        }
        PreimageRange { start, count }
    }

    /// Number of balls the node `(low..=high, start, count)` sends left.
    fn node_split(&self, low: u64, mid: u64, high: u64, start: u64, count: u64) -> u64 {
        let left_bins = mid - low + 1;
        let total_bins = high - low + 1;
        let block = self.node_block(low, high, start, count);
        let word = u64::from_be_bytes(self.prf.eval_block(block)[0..8].try_into().unwrap());
        binomial::sample(count, left_bins, total_bins, word)
    }

    /// PRF input for one tree node. The first half is the node identifier
    /// `SHA-256(low ‖ high ‖ n_root)[..8]`; the second half binds the
    /// subtree's ball interval so no two nodes of any descent share an
    /// RNG stream. Node identity hashes the root domain size, while the
    /// binomial trial count is the subtree's own ball count.
    fn node_block(&self, low: u64, high: u64, start: u64, count: u64) -> [u8; 16] {
        let mut hasher = Sha256::new();
        hasher.update(low.to_be_bytes());
        hasher.update(high.to_be_bytes());
        hasher.update(self.balls.to_be_bytes());
        let position = hasher.finalize();

        let mut hasher = Sha256::new();
        hasher.update(start.to_be_bytes());
        hasher.update(count.to_be_bytes());
        let interval = hasher.finalize();

        let mut block = [0u8; 16];
        block[0..8].copy_from_slice(&position[0..8]);
        block[8..16].copy_from_slice(&interval[0..8]);
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pmns(key_byte: u8, balls: u64, bins: u64) -> Pmns {
        Pmns::new([key_byte; 16], balls, bins)
    }

    #[test]
    fn preimages_partition_the_domain() {
        for (balls, bins) in [(8u64, 4u64), (100, 7), (1000, 50), (64, 64), (17, 3)] {
            let sampler = pmns(2, balls, bins);
            let mut covered = 0u64;
            let mut expected_start = 0u64;
            for bin in 0..bins {
                let range = sampler.preimage(bin);
                assert_eq!(
                    range.start, expected_start,
                    "gap before bin {} for n={}, m={}",
                    bin, balls, bins
                );
                expected_start += range.count;
                covered += range.count;
            }
            assert_eq!(covered, balls, "n={}, m={}", balls, bins);
        }
    }

    #[test]
    fn forward_lands_inside_preimage() {
        let sampler = pmns(3, 1000, 50);
        for x in 0..1000 {
            let bin = sampler.assign(x);
            assert!(bin < 50);
            let range = sampler.preimage(bin);
            assert!(
                range.contains(x),
                "x={} assigned to bin {} but preimage is [{}, {})",
                x,
                bin,
                range.start,
                range.start + range.count
            );
        }
    }

    #[test]
    fn single_bin_collapses() {
        let sampler = pmns(4, 100, 1);
        assert_eq!(sampler.assign(99), 0);
        assert_eq!(
            sampler.preimage(0),
            PreimageRange {
                start: 0,
                count: 100
            }
        );
    }

    #[test]
    fn keys_give_different_assignments() {
        let a = pmns(1, 4096, 64);
        let b = pmns(2, 4096, 64);
        let differs = (0..4096u64).any(|x| a.assign(x) != b.assign(x));
        assert!(differs);
    }

    #[test]
    fn loads_are_roughly_balanced() {
        let sampler = pmns(5, 4096, 16);
        for bin in 0..16 {
            let count = sampler.preimage(bin).count;
            // Expected 256 per bin; allow a generous multinomial spread.
            assert!(
                (32..=2048).contains(&count),
                "bin {} holds {} balls",
                bin,
                count
            );
        }
    }

    proptest! {
        #[test]
        fn forward_inverse_consistency(
            balls in 1u64..3000,
            bins in 1u64..200,
            seed in 0u8..8,
        ) {
            let sampler = pmns(seed, balls, bins);
            let x = balls / 2;
            let bin = sampler.assign(x);
            prop_assert!(bin < bins);
            prop_assert!(sampler.preimage(bin).contains(x));
        }
    }
}

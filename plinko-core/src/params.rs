//! Partition parameters shared by client and server.
//!
//! The database is viewed as `set_size` chunks of `chunk_size`
//! consecutive entries, with `chunk_size · set_size >= entries` and
//! `set_size ≈ sqrt(entries)`. Both sides derive the same geometry from
//! the entry count alone.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlinkoParams {
    /// Database entry count `n`.
    pub entries: u64,
    /// Entries per chunk `w`.
    pub chunk_size: u64,
    /// Number of chunks `s`, also the structured-set size.
    pub set_size: u64,
}

impl PlinkoParams {
    pub fn derive(entries: u64) -> Self {
        if entries == 0 {
            return Self {
                entries: 0,
                chunk_size: 0,
                set_size: 0,
            };
        }
        let mut chunk_size = (entries as f64).sqrt().ceil() as u64;
        while chunk_size.checked_mul(chunk_size).is_some() && chunk_size * chunk_size < entries {
            chunk_size += 1;
        }
        let set_size = entries.div_ceil(chunk_size);
        Self {
            entries,
            chunk_size,
            set_size,
        }
    }

    pub fn chunk_of(&self, index: u64) -> u64 {
        index / self.chunk_size
    }

    pub fn offset_of(&self, index: u64) -> u64 {
        index % self.chunk_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_covers_the_database() {
        for entries in [1u64, 2, 3, 4, 8, 100, 1000, 1 << 20, (1 << 20) + 1] {
            let params = PlinkoParams::derive(entries);
            assert!(
                params.chunk_size * params.set_size >= entries,
                "n={}",
                entries
            );
            // A full chunk fewer would not cover the database.
            assert!(
                params.chunk_size * (params.set_size - 1) < entries,
                "n={}",
                entries
            );
        }
    }

    #[test]
    fn set_size_tracks_sqrt() {
        let params = PlinkoParams::derive(1_000_000);
        assert_eq!(params.chunk_size, 1000);
        assert_eq!(params.set_size, 1000);

        let odd = PlinkoParams::derive(1000);
        assert_eq!(odd.chunk_size, 32);
        assert_eq!(odd.set_size, 32);
    }

    #[test]
    fn indexing_helpers() {
        let params = PlinkoParams::derive(1000);
        assert_eq!(params.chunk_of(0), 0);
        assert_eq!(params.chunk_of(33), 1);
        assert_eq!(params.offset_of(33), 1);
    }

    #[test]
    fn degenerate_sizes() {
        let one = PlinkoParams::derive(1);
        assert_eq!((one.chunk_size, one.set_size), (1, 1));
        let zero = PlinkoParams::derive(0);
        assert_eq!((zero.chunk_size, zero.set_size), (0, 0));
    }
}

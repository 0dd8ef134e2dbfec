//! Database snapshots and delta streams.
//!
//! The offline hint build consumes a *restartable* stream of `(index,
//! value)` pairs: the engine may make up to two full passes (primary
//! hints, then backups), so a snapshot is a factory of fresh iterators
//! rather than a single iterator. Snapshots live either in memory or as
//! a memory-mapped file of fixed 32-byte records.

use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::Path;

use memmap2::Mmap;

use crate::entry::Entry;
use crate::error::Result;

/// Restartable source of database entries.
pub trait SnapshotStream {
    /// Total entry count `n`.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A fresh pass over every entry, each index exactly once, any order.
    fn stream(&self) -> Box<dyn Iterator<Item = (u64, Entry)> + '_>;

    /// A fresh pass restricted to indices in `[lo, hi)`. Used by the
    /// sharded offline build; implementations with random access should
    /// override the filtering default.
    fn stream_range(&self, lo: u64, hi: u64) -> Box<dyn Iterator<Item = (u64, Entry)> + '_> {
        Box::new(
            self.stream()
                .filter(move |(index, _)| *index >= lo && *index < hi),
        )
    }
}

/// Random access view used by the server query handler.
pub trait EntryLookup {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entry at `index`, or `None` past the end of the database.
    fn entry(&self, index: u64) -> Option<Entry>;
}

/// In-memory snapshot.
pub struct MemSnapshot {
    entries: Vec<Entry>,
}

impl MemSnapshot {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    /// Synthesizes a snapshot from an index-to-entry function.
    pub fn from_fn(len: u64, make: impl FnMut(u64) -> Entry) -> Self {
        Self {
            entries: (0..len).map(make).collect(),
        }
    }

    pub fn as_slice(&self) -> &[Entry] {
        &self.entries
    }

    /// XORs a delta into one entry in place.
    pub fn apply_delta(&mut self, index: u64, delta: Entry) {
        if let Some(entry) = self.entries.get_mut(index as usize) {
            *entry ^= delta;
        }
    }
}

impl SnapshotStream for MemSnapshot {
    fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    fn stream(&self) -> Box<dyn Iterator<Item = (u64, Entry)> + '_> {
        Box::new(
            self.entries
                .iter()
                .enumerate()
                .map(|(i, &entry)| (i as u64, entry)),
        )
    }

    fn stream_range(&self, lo: u64, hi: u64) -> Box<dyn Iterator<Item = (u64, Entry)> + '_> {
        let hi = hi.min(SnapshotStream::len(self));
        let lo = lo.min(hi);
        Box::new(
            self.entries[lo as usize..hi as usize]
                .iter()
                .enumerate()
                .map(move |(i, &entry)| (lo + i as u64, entry)),
        )
    }
}

impl EntryLookup for MemSnapshot {
    fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    fn entry(&self, index: u64) -> Option<Entry> {
        self.entries.get(index as usize).copied()
    }
}

/// Memory-mapped snapshot over a file of fixed 32-byte records.
pub struct MmapSnapshot {
    map: Mmap,
    entries: u64,
}

impl MmapSnapshot {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let bytes = file.metadata()?.len();
        if bytes % Entry::BYTES as u64 != 0 {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                "snapshot length is not a multiple of the 32-byte record size",
            )
            .into());
        }
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self {
            map,
            entries: bytes / Entry::BYTES as u64,
        })
    }

    fn record(&self, index: u64) -> Entry {
        let at = index as usize * Entry::BYTES;
        let raw: &[u8; 32] = self.map[at..at + Entry::BYTES].try_into().unwrap();
        Entry::from_bytes(raw)
    }
}

impl SnapshotStream for MmapSnapshot {
    fn len(&self) -> u64 {
        self.entries
    }

    fn stream(&self) -> Box<dyn Iterator<Item = (u64, Entry)> + '_> {
        Box::new((0..self.entries).map(move |i| (i, self.record(i))))
    }

    fn stream_range(&self, lo: u64, hi: u64) -> Box<dyn Iterator<Item = (u64, Entry)> + '_> {
        let hi = hi.min(self.entries);
        let lo = lo.min(hi);
        Box::new((lo..hi).map(move |i| (i, self.record(i))))
    }
}

impl EntryLookup for MmapSnapshot {
    fn len(&self) -> u64 {
        self.entries
    }

    fn entry(&self, index: u64) -> Option<Entry> {
        (index < self.entries).then(|| self.record(index))
    }
}

/// BLAKE3 digest of a snapshot's entry stream, in index order. Two
/// builds over snapshots with the same digest must produce bit-identical
/// hints for the same master secret and parameters.
pub fn snapshot_digest(snapshot: &dyn SnapshotStream) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for (_, entry) in snapshot.stream() {
        hasher.update(&entry.to_bytes());
    }
    hasher.finalize()
}

/// Reader over the binary delta format: records of an 8-byte
/// little-endian index followed by a 32-byte XOR delta.
pub struct DeltaReader<R: Read> {
    source: R,
}

impl DeltaReader<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            source: File::open(path)?,
        })
    }
}

impl<R: Read> DeltaReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.source.read_exact(buf).map_err(|err| {
            if err.kind() == ErrorKind::UnexpectedEof {
                io::Error::new(ErrorKind::UnexpectedEof, "truncated delta record")
            } else {
                err
            }
        })
    }
}

impl<R: Read> Iterator for DeltaReader<R> {
    type Item = io::Result<(u64, Entry)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut index = [0u8; 8];
        match self.source.read(&mut index) {
            Ok(0) => return None,
            Ok(read) => {
                if let Err(err) = self.fill(&mut index[read..]) {
                    return Some(Err(err));
                }
            }
            Err(err) => return Some(Err(err)),
        }
        let mut value = [0u8; 32];
        if let Err(err) = self.fill(&mut value) {
            return Some(Err(err));
        }
        Some(Ok((u64::from_le_bytes(index), Entry::from_bytes(&value))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamped(len: u64) -> MemSnapshot {
        MemSnapshot::from_fn(len, Entry::from_u64)
    }

    #[test]
    fn mem_snapshot_streams_every_entry_once() {
        let snapshot = stamped(100);
        let mut seen = vec![false; 100];
        for (i, entry) in snapshot.stream() {
            assert!(!seen[i as usize]);
            seen[i as usize] = true;
            assert_eq!(entry, Entry::from_u64(i));
        }
        assert!(seen.iter().all(|&hit| hit));
    }

    #[test]
    fn range_stream_matches_filtered_default() {
        let snapshot = stamped(50);
        let fast: Vec<_> = snapshot.stream_range(10, 20).collect();
        let slow: Vec<_> = snapshot
            .stream()
            .filter(|(i, _)| (10..20).contains(i))
            .collect();
        assert_eq!(fast, slow);
        assert!(snapshot.stream_range(45, 90).count() == 5);
    }

    #[test]
    fn digest_tracks_content() {
        let a = stamped(64);
        let b = stamped(64);
        assert_eq!(snapshot_digest(&a), snapshot_digest(&b));

        let mut c = stamped(64);
        c.apply_delta(3, Entry::from_u64(1));
        assert_ne!(snapshot_digest(&a), snapshot_digest(&c));
    }

    #[test]
    fn delta_reader_roundtrip() {
        let mut raw = Vec::new();
        for (index, delta) in [(3u64, Entry::from_u64(7)), (9, Entry([1, 2, 3, 4]))] {
            raw.extend_from_slice(&index.to_le_bytes());
            raw.extend_from_slice(&delta.to_bytes());
        }
        let decoded: Vec<_> = DeltaReader::new(&raw[..]).map(|r| r.unwrap()).collect();
        assert_eq!(
            decoded,
            vec![(3u64, Entry::from_u64(7)), (9, Entry([1, 2, 3, 4]))]
        );
    }

    #[test]
    fn delta_reader_flags_truncation() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&5u64.to_le_bytes());
        raw.extend_from_slice(&[0u8; 16]);
        let results: Vec<_> = DeltaReader::new(&raw[..]).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }
}

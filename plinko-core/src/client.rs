//! Client hint engine.
//!
//! Offline, the client streams the database snapshot once and folds each
//! entry into the parity of the hint slot its index maps to under the
//! iPRF. A second pass fills a pool of backup hints over uniformly drawn
//! index sets. Online, a query consumes one unused hint containing the
//! target, turns its punctured set into structured queries, and decodes
//! the response parities against the stored hint parity. Updates are
//! O(1): the iPRF's forward direction names the single primary slot an
//! index touches.

use std::collections::HashMap;
use std::io;

use rand::RngCore;
use tracing::{debug, info};

use crate::db::SnapshotStream;
use crate::entry::Entry;
use crate::error::{PirError, Result};
use crate::iprf::Iprf;
use crate::keys::MasterSecret;
use crate::params::PlinkoParams;
use crate::prp::PrpKind;
use crate::server::{StructuredQuery, StructuredResponse};

/// One primary hint slot `j`: the parity of every entry whose index maps
/// to `j` under the iPRF.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrimaryHint {
    pub parity: Entry,
    pub used: bool,
}

/// One backup hint over an explicit uniformly drawn index set.
#[derive(Clone, Debug)]
pub struct BackupHint {
    /// Member indices, sorted ascending.
    pub indices: Vec<u64>,
    pub parity: Entry,
    pub used: bool,
}

/// Which hint a query consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HintSource {
    Primary(u64),
    Backup(usize),
}

/// Everything the client needs to finish one private retrieval: the
/// consumed hint's parity and its index set with the target removed.
/// The plan never leaves the client; only the structured queries do.
#[derive(Clone, Debug)]
pub struct QueryPlan {
    pub target: u64,
    pub source: HintSource,
    pub hint_parity: Entry,
    /// The hint's other members, grouped later by chunk for the wire.
    pub punctured: Vec<u64>,
}

pub struct Client {
    iprf: Iprf,
    params: PlinkoParams,
    primary: Vec<PrimaryHint>,
    backups: Vec<BackupHint>,
    /// Reverse index over backup membership, so updates touch only the
    /// backups that actually contain the changed index.
    backup_members: HashMap<u64, Vec<usize>>,
}

impl Client {
    /// A client for a database of `entries` rows with `hint_slots`
    /// primary hints. Subkeys are derived from the master secret, so the
    /// same inputs rebuild bit-identical hint state.
    pub fn new(master: &MasterSecret, entries: u64, hint_slots: u64, prp: PrpKind) -> Self {
        Self {
            iprf: Iprf::new(master, entries, hint_slots, prp),
            params: PlinkoParams::derive(entries),
            primary: vec![PrimaryHint::default(); hint_slots as usize],
            backups: Vec::new(),
            backup_members: HashMap::new(),
        }
    }

    pub fn params(&self) -> &PlinkoParams {
        &self.params
    }

    pub fn iprf(&self) -> &Iprf {
        &self.iprf
    }

    pub fn primary_hints(&self) -> &[PrimaryHint] {
        &self.primary
    }

    pub fn backup_hints(&self) -> &[BackupHint] {
        &self.backups
    }

    /// Offline pass: fold every snapshot entry into its slot parity.
    /// Partial state is discarded if the stream ends early.
    pub fn build_hints(&mut self, snapshot: &dyn SnapshotStream) -> Result<()> {
        let expected = self.iprf.domain();
        for hint in &mut self.primary {
            *hint = PrimaryHint::default();
        }
        let mut seen = 0u64;
        for (index, value) in snapshot.stream() {
            let slot = match self.iprf.eval(index) {
                Ok(slot) => slot,
                Err(err) => {
                    for hint in &mut self.primary {
                        *hint = PrimaryHint::default();
                    }
                    return Err(err);
                }
            };
            self.primary[slot as usize].parity ^= value;
            seen += 1;
        }
        if seen < expected {
            for hint in &mut self.primary {
                *hint = PrimaryHint::default();
            }
            return Err(PirError::StreamTruncated { seen, expected });
        }
        info!(entries = expected, slots = self.primary.len(), "primary hints built");
        Ok(())
    }

    /// Sharded offline pass: each shard owns a disjoint index range and
    /// produces a full parity vector; XOR is associative and commutative,
    /// so the fold order does not matter.
    #[cfg(feature = "parallel")]
    pub fn build_hints_parallel<S>(&mut self, snapshot: &S, shards: usize) -> Result<()>
    where
        S: SnapshotStream + Sync,
    {
        use rayon::prelude::*;

        let expected = self.iprf.domain();
        let slots = self.primary.len();
        let span = expected.div_ceil(shards.max(1) as u64).max(1);
        let ranges: Vec<(u64, u64)> = (0..expected)
            .step_by(span as usize)
            .map(|lo| (lo, (lo + span).min(expected)))
            .collect();

        let iprf = &self.iprf;
        let (parities, seen) = ranges
            .par_iter()
            .map(|&(lo, hi)| {
                let mut parities = vec![Entry::ZERO; slots];
                let mut seen = 0u64;
                for (index, value) in snapshot.stream_range(lo, hi) {
                    let slot = iprf.eval(index)?;
                    parities[slot as usize] ^= value;
                    seen += 1;
                }
                Ok((parities, seen))
            })
            .try_reduce(
                || (vec![Entry::ZERO; slots], 0u64),
                |(mut acc, total), (shard, seen)| {
                    for (a, b) in acc.iter_mut().zip(shard) {
                        *a ^= b;
                    }
                    Ok((acc, total + seen))
                },
            )?;

        if seen < expected {
            return Err(PirError::StreamTruncated { seen, expected });
        }
        for (hint, parity) in self.primary.iter_mut().zip(parities) {
            *hint = PrimaryHint {
                parity,
                used: false,
            };
        }
        info!(entries = expected, slots, shards = ranges.len(), "primary hints built");
        Ok(())
    }

    /// Second offline pass: draw `count` backup sets of `set_size`
    /// distinct uniform indices, then stream the snapshot once and fold
    /// each entry into every backup containing it.
    pub fn build_backups(
        &mut self,
        snapshot: &dyn SnapshotStream,
        count: usize,
        set_size: u64,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let entries = self.iprf.domain();
        if set_size > entries {
            return Err(PirError::Domain {
                what: "backup set size",
                bound: entries + 1,
            });
        }

        self.backups.clear();
        self.backup_members.clear();
        for id in 0..count {
            let mut members = Vec::with_capacity(set_size as usize);
            while members.len() < set_size as usize {
                let candidate = uniform_below(rng, entries);
                if !members.contains(&candidate) {
                    members.push(candidate);
                }
            }
            members.sort_unstable();
            for &index in &members {
                self.backup_members.entry(index).or_default().push(id);
            }
            self.backups.push(BackupHint {
                indices: members,
                parity: Entry::ZERO,
                used: false,
            });
        }

        let mut seen = 0u64;
        for (index, value) in snapshot.stream() {
            if let Some(ids) = self.backup_members.get(&index) {
                for &id in ids {
                    self.backups[id].parity ^= value;
                }
            }
            seen += 1;
        }
        if seen < entries {
            self.backups.clear();
            self.backup_members.clear();
            return Err(PirError::StreamTruncated {
                seen,
                expected: entries,
            });
        }
        info!(backups = count, set_size, "backup hints built");
        Ok(())
    }

    /// Consumes one unused hint containing `target`: the primary slot
    /// `F(target)` if still fresh, else the first covering backup.
    /// The returned set always contains the target; a query that omitted
    /// it would leak which index was wanted.
    pub fn query(&mut self, target: u64) -> Result<QueryPlan> {
        let slot = self.iprf.eval(target)?;
        if !self.primary[slot as usize].used {
            self.primary[slot as usize].used = true;
            let punctured = self
                .iprf
                .preimage(slot)?
                .into_iter()
                .filter(|&index| index != target)
                .collect();
            return Ok(QueryPlan {
                target,
                source: HintSource::Primary(slot),
                hint_parity: self.primary[slot as usize].parity,
                punctured,
            });
        }

        for (id, backup) in self.backups.iter_mut().enumerate() {
            if !backup.used && backup.indices.binary_search(&target).is_ok() {
                backup.used = true;
                return Ok(QueryPlan {
                    target,
                    source: HintSource::Backup(id),
                    hint_parity: backup.parity,
                    punctured: backup
                        .indices
                        .iter()
                        .copied()
                        .filter(|&index| index != target)
                        .collect(),
                });
            }
        }
        Err(PirError::OutOfHints)
    }

    /// Decodes the target's value from the response parities: the XOR of
    /// the selected halves cancels every punctured member out of the
    /// stored hint parity, leaving `DB[target]`.
    pub fn reconstruct(&self, plan: &QueryPlan, responses: &[StructuredResponse]) -> Entry {
        responses
            .iter()
            .fold(plan.hint_parity, |acc, response| acc ^ response.r0)
    }

    /// Applies one `(index, delta)` update. The primary slot is XORed
    /// unconditionally: a used hint is never read again, and an unused
    /// one must reflect the new value when eventually queried.
    pub fn apply_update(&mut self, index: u64, delta: Entry) -> Result<()> {
        let slot = self.iprf.eval(index)?;
        self.primary[slot as usize].parity ^= delta;
        if let Some(ids) = self.backup_members.get(&index) {
            for &id in ids {
                self.backups[id].parity ^= delta;
            }
        }
        debug!(slot, "applied update");
        Ok(())
    }

    /// Folds an ordered delta stream; returns how many were applied.
    pub fn apply_deltas(
        &mut self,
        deltas: impl IntoIterator<Item = io::Result<(u64, Entry)>>,
    ) -> Result<u64> {
        let mut applied = 0u64;
        for record in deltas {
            let (index, delta) = record?;
            self.apply_update(index, delta)?;
            applied += 1;
        }
        Ok(applied)
    }
}

impl QueryPlan {
    /// Lowers the punctured set onto the structured wire contract. The
    /// members are grouped by chunk; layer `l` carries each chunk's
    /// `l`-th member at its true offset inside `P`, while every other
    /// chunk gets a uniform decoy offset on the complement side. The
    /// common case of at most one member per chunk is a single query,
    /// and a plan whose set was `{target}` alone needs none.
    pub fn to_structured_queries(
        &self,
        params: &PlinkoParams,
        rng: &mut dyn RngCore,
    ) -> Vec<StructuredQuery> {
        let set_size = params.set_size as usize;
        let mut per_chunk: Vec<Vec<u64>> = vec![Vec::new(); set_size];
        for &index in &self.punctured {
            per_chunk[params.chunk_of(index) as usize].push(params.offset_of(index));
        }
        let layers = per_chunk.iter().map(Vec::len).max().unwrap_or(0);

        let mut queries = Vec::with_capacity(layers);
        for layer in 0..layers {
            let mut chunks = Vec::new();
            let mut offsets = Vec::with_capacity(set_size);
            for (chunk, members) in per_chunk.iter().enumerate() {
                match members.get(layer) {
                    Some(&offset) => {
                        chunks.push(chunk as u64);
                        offsets.push(offset);
                    }
                    None => offsets.push(uniform_below(rng, params.chunk_size)),
                }
            }
            queries.push(StructuredQuery { chunks, offsets });
        }
        queries
    }
}

/// Uniform draw from `[0, bound)` by rejection; no modulo bias.
pub(crate) fn uniform_below(rng: &mut dyn RngCore, bound: u64) -> u64 {
    debug_assert!(bound > 0);
    let excess = (u64::MAX % bound).wrapping_add(1) % bound;
    let limit = u64::MAX - excess;
    loop {
        let v = rng.next_u64();
        if v <= limit {
            return v % bound;
        }
    }
}

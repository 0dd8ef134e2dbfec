//! Server-side query handler.
//!
//! The server is stateless beyond its read-only database: every query is
//! answered by one pass over the chunk geometry. A structured query
//! names a subset `P` of chunk IDs plus one offset per chunk; the
//! response carries the XOR parity of the selected entries on each side
//! of the partition. Independent queries may be served in parallel
//! because nothing here mutates.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::db::EntryLookup;
use crate::entry::Entry;
use crate::error::{PirError, Result};
use crate::params::PlinkoParams;

/// A structured set-parity query: `chunks` is the subset `P`, `offsets`
/// holds one offset per chunk (length must equal `set_size`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub chunks: Vec<u64>,
    pub offsets: Vec<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResponse {
    /// Parity over the chunks named in `P`.
    pub r0: Entry,
    /// Parity over the complement.
    pub r1: Entry,
    pub server_time_ns: u64,
}

/// Debug-only direct lookup. Reveals the index; never use on a path
/// that should stay private.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaintextQuery {
    pub index: u64,
}

pub struct Server<D> {
    db: D,
    params: PlinkoParams,
}

impl<D: EntryLookup> Server<D> {
    pub fn new(db: D) -> Self {
        let params = PlinkoParams::derive(db.len());
        Self { db, params }
    }

    pub fn params(&self) -> &PlinkoParams {
        &self.params
    }

    /// Answers a structured query with both partition parities. Offsets
    /// are reduced mod `chunk_size`; chunk cells past the end of the
    /// database contribute zero.
    pub fn answer_structured(&self, query: &StructuredQuery) -> Result<StructuredResponse> {
        let set_size = self.params.set_size;
        if query.offsets.len() as u64 != set_size {
            return Err(PirError::QueryMalformed {
                reason: "offset vector length does not match set size",
            });
        }
        let mut in_p = vec![false; set_size as usize];
        for &chunk in &query.chunks {
            if chunk >= set_size {
                return Err(PirError::QueryMalformed {
                    reason: "chunk id at or above set size",
                });
            }
            in_p[chunk as usize] = true;
        }

        let started = Instant::now();
        let mut r0 = Entry::ZERO;
        let mut r1 = Entry::ZERO;
        for chunk in 0..set_size {
            let offset = query.offsets[chunk as usize] % self.params.chunk_size;
            let index = chunk * self.params.chunk_size + offset;
            let value = self.db.entry(index).unwrap_or(Entry::ZERO);
            if in_p[chunk as usize] {
                r0 ^= value;
            } else {
                r1 ^= value;
            }
        }
        Ok(StructuredResponse {
            r0,
            r1,
            server_time_ns: started.elapsed().as_nanos() as u64,
        })
    }

    pub fn answer_plaintext(&self, query: &PlaintextQuery) -> Result<Entry> {
        self.db.entry(query.index).ok_or(PirError::Domain {
            what: "entry index",
            bound: self.db.len(),
        })
    }
}

//! Plinko PIR core.
//!
//! Cryptographic substrate for single-server private information
//! retrieval with constant-work online updates:
//! - `prf`: the keyed AES-128 block PRF behind every derived bit
//! - `prp`: small-domain permutations (unbalanced Feistel, lookup table)
//! - `binomial` / `pmns`: derandomized multinomial ball-to-bin sampling
//! - `iprf`: the invertible PRF `F = S ∘ P` with preimage enumeration
//! - `client`: offline hint build, backup pool, query and update engine
//! - `server`: stateless structured set-parity query handler
//! - `db`: snapshot streams, memory-mapped databases, delta records

pub mod binomial;
pub mod client;
pub mod db;
pub mod entry;
pub mod error;
pub mod iprf;
pub mod keys;
pub mod params;
pub mod pmns;
pub mod prf;
pub mod prp;
pub mod server;

pub use client::{BackupHint, Client, HintSource, PrimaryHint, QueryPlan};
pub use db::{snapshot_digest, DeltaReader, EntryLookup, MemSnapshot, MmapSnapshot, SnapshotStream};
pub use entry::Entry;
pub use error::{PirError, Result};
pub use iprf::Iprf;
pub use keys::{MasterSecret, PrfKey128, CTX_PMNS, CTX_PRP, MASTER_SECRET_LEN};
pub use params::PlinkoParams;
pub use prp::{Prp, PrpKind};
pub use server::{PlaintextQuery, Server, StructuredQuery, StructuredResponse};

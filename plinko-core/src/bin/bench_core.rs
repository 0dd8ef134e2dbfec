//! Benchmark the hint-build and query paths of the PIR core.
//!
//! Compares the Feistel and table PRP backings over a synthetic or
//! memory-mapped database and reports per-entry offline cost plus
//! online query latency.
//!
//! Run: cargo build --release -p plinko-core --bin bench_core
//!      ./target/release/bench_core [--entries N] [--hint-slots M] [--db FILE]

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use plinko_core::{
    snapshot_digest, Client, Entry, MasterSecret, MemSnapshot, MmapSnapshot, PrpKind, Server,
    SnapshotStream,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Benchmark PIR core hint build and queries")]
struct Args {
    /// Number of synthetic database entries (ignored with --db)
    #[arg(long, default_value_t = 100_000)]
    entries: u64,

    /// Number of primary hint slots
    #[arg(long, default_value_t = 1024)]
    hint_slots: u64,

    /// Queries to time after the build
    #[arg(long, default_value_t = 200)]
    queries: u64,

    /// Benchmark over a snapshot file instead of a synthetic database
    #[arg(long)]
    db: Option<PathBuf>,
}

fn main() -> eyre::Result<()> {
    let args = Args::parse();

    let (snapshot, label): (Box<dyn SnapshotStream>, &str) = match &args.db {
        Some(path) => (Box::new(MmapSnapshot::open(path)?), "mmap"),
        None => (
            Box::new(MemSnapshot::from_fn(args.entries, Entry::from_u64)),
            "synthetic",
        ),
    };
    let entries = snapshot.len();

    println!("=== Plinko core benchmark ===");
    println!("Database: {} ({} entries)", label, entries);
    println!("Hint slots: {}", args.hint_slots);
    println!("Snapshot digest: {}", snapshot_digest(snapshot.as_ref()).to_hex());
    println!();

    let master = MasterSecret::new(&[0x42u8; 16])?;
    for kind in [PrpKind::Feistel, PrpKind::Table] {
        bench_kind(&args, snapshot.as_ref(), &master, entries, kind)?;
    }
    Ok(())
}

fn bench_kind(
    args: &Args,
    snapshot: &dyn SnapshotStream,
    master: &MasterSecret,
    entries: u64,
    kind: PrpKind,
) -> eyre::Result<()> {
    println!("--- {:?} PRP ---", kind);

    let bar = ProgressBar::new(entries).with_style(ProgressStyle::with_template(
        "  building hints {bar:30} {pos}/{len}",
    )?);
    let watched = ProgressStream {
        inner: snapshot,
        bar: &bar,
    };
    let mut client = Client::new(master, entries, args.hint_slots, kind);

    let start = Instant::now();
    client.build_hints(&watched)?;
    let build = start.elapsed().as_secs_f64();
    bar.finish_and_clear();

    let checksum: u8 = client
        .primary_hints()
        .iter()
        .flat_map(|hint| hint.parity.to_bytes())
        .fold(0u8, |acc, byte| acc ^ byte);
    println!(
        "  offline: {:.2} s total, {:.2} us/entry (checksum {})",
        build,
        build * 1_000_000.0 / entries as f64,
        checksum
    );

    let materialized = MemSnapshot::new(snapshot.stream().map(|(_, entry)| entry).collect());
    let server = Server::new(materialized);
    let mut rng = ChaCha20Rng::seed_from_u64(7);

    let queries = args.queries.min(args.hint_slots).min(entries);
    let start = Instant::now();
    for i in 0..queries {
        let target = (i * 7919) % entries;
        if let Ok(plan) = client.query(target) {
            for query in plan.to_structured_queries(client.params(), &mut rng) {
                let _ = server.answer_structured(&query)?;
            }
        }
    }
    let online = start.elapsed().as_secs_f64();
    println!(
        "  online: {} queries in {:.3} s ({:.2} ms/query)",
        queries,
        online,
        online * 1000.0 / queries.max(1) as f64
    );
    println!();
    Ok(())
}

/// Ticks a progress bar as the hint build drains the stream.
struct ProgressStream<'a> {
    inner: &'a dyn SnapshotStream,
    bar: &'a ProgressBar,
}

impl SnapshotStream for ProgressStream<'_> {
    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn stream(&self) -> Box<dyn Iterator<Item = (u64, Entry)> + '_> {
        Box::new(self.inner.stream().inspect(|_| self.bar.inc(1)))
    }
}

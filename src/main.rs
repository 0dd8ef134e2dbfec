//! Operations CLI for the Plinko PIR core.
//!
//! Synthesizes snapshot files, derives partition parameters, builds hint
//! state, runs a full local query round trip against an in-process
//! server, and folds delta files into live hints.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use byteorder::{LittleEndian, WriteBytesExt};
use clap::{Args, Parser, Subcommand};
use eyre::{bail, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use plinko_core::{
    snapshot_digest, Client, DeltaReader, MasterSecret, MmapSnapshot, PlaintextQuery, PlinkoParams,
    PrpKind, Server, SnapshotStream,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Plinko PIR snapshot and hint tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a synthetic snapshot file of 32-byte records
    GenDb {
        /// Number of entries
        #[arg(long)]
        entries: u64,

        /// Output snapshot path
        #[arg(long)]
        out: PathBuf,

        /// Seed for the record contents
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },

    /// Print the partition parameters derived from an entry count
    Params {
        #[arg(long)]
        entries: u64,
    },

    /// Build primary and backup hints over a snapshot
    Build {
        #[arg(long)]
        db: PathBuf,

        #[command(flatten)]
        hints: HintArgs,
    },

    /// Run one private retrieval against an in-process server
    Query {
        #[arg(long)]
        db: PathBuf,

        /// Database index to retrieve
        #[arg(long)]
        target: u64,

        #[command(flatten)]
        hints: HintArgs,
    },

    /// Build hints, then fold a delta file into them
    Update {
        #[arg(long)]
        db: PathBuf,

        /// Delta file: records of 8-byte LE index + 32-byte XOR delta
        #[arg(long)]
        deltas: PathBuf,

        #[command(flatten)]
        hints: HintArgs,
    },
}

#[derive(Args, Debug)]
struct HintArgs {
    /// Primary hint slots; defaults to 4x the chunk count
    #[arg(long)]
    hint_slots: Option<u64>,

    /// Backup hint count
    #[arg(long, default_value_t = 0)]
    backups: usize,

    /// Indices per backup hint; defaults to the expected slot load
    #[arg(long)]
    backup_size: Option<u64>,

    /// 32 hex chars of master secret
    #[arg(long, default_value = "00000000000000000000000000000000")]
    master: String,

    /// PRP backing: feistel or table
    #[arg(long, default_value = "feistel")]
    prp: String,

    /// Seed for backup sampling and query decoys
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::GenDb { entries, out, seed } => gen_db(entries, &out, seed),
        Command::Params { entries } => {
            let params = PlinkoParams::derive(entries);
            println!("entries:    {}", params.entries);
            println!("chunk_size: {}", params.chunk_size);
            println!("set_size:   {}", params.set_size);
            Ok(())
        }
        Command::Build { db, hints } => build(&db, &hints).map(|_| ()),
        Command::Query { db, target, hints } => query(&db, target, &hints),
        Command::Update { db, deltas, hints } => update(&db, &deltas, &hints),
    }
}

fn gen_db(entries: u64, out: &PathBuf, seed: u64) -> eyre::Result<()> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut writer = BufWriter::new(File::create(out).wrap_err("creating snapshot file")?);
    let bar = ProgressBar::new(entries)
        .with_style(ProgressStyle::with_template("writing {bar:30} {pos}/{len}")?);
    for _ in 0..entries {
        for _ in 0..4 {
            writer.write_u64::<LittleEndian>(rng.next_u64())?;
        }
        bar.inc(1);
    }
    writer.flush()?;
    bar.finish_and_clear();
    info!(entries, path = %out.display(), "snapshot written");
    Ok(())
}

fn build(db: &PathBuf, hints: &HintArgs) -> eyre::Result<(Client, MmapSnapshot)> {
    let snapshot = MmapSnapshot::open(db).wrap_err("opening snapshot")?;
    let entries = snapshot.len();
    let params = PlinkoParams::derive(entries);
    let slots = hints.hint_slots.unwrap_or(params.set_size * 4).max(1);
    let master = parse_master(&hints.master)?;

    let started = Instant::now();
    let mut client = Client::new(&master, entries, slots, parse_prp(&hints.prp)?);
    client.build_hints(&snapshot)?;

    if hints.backups > 0 {
        let set_size = hints
            .backup_size
            .unwrap_or_else(|| (entries / slots).max(1));
        let mut rng = ChaCha20Rng::seed_from_u64(hints.seed);
        client.build_backups(&snapshot, hints.backups, set_size, &mut rng)?;
    }

    println!("entries:  {}", entries);
    println!("slots:    {}", slots);
    println!("digest:   {}", snapshot_digest(&snapshot).to_hex());
    println!("elapsed:  {:.2} s", started.elapsed().as_secs_f64());
    println!("finished: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    Ok((client, snapshot))
}

fn query(db: &PathBuf, target: u64, hints: &HintArgs) -> eyre::Result<()> {
    let (mut client, snapshot) = build(db, hints)?;
    let server = Server::new(snapshot);
    let mut rng = ChaCha20Rng::seed_from_u64(hints.seed.wrapping_add(1));

    let plan = client.query(target)?;
    let queries = plan.to_structured_queries(client.params(), &mut rng);
    let mut responses = Vec::with_capacity(queries.len());
    let mut server_ns = 0u64;
    for structured in &queries {
        let response = server.answer_structured(structured)?;
        server_ns += response.server_time_ns;
        responses.push(response);
    }
    let value = client.reconstruct(&plan, &responses);

    let expected = server.answer_plaintext(&PlaintextQuery { index: target })?;
    if value != expected {
        bail!("reconstruction mismatch against plaintext lookup");
    }

    println!("value:       {}", value.to_hex());
    println!("queries:     {}", queries.len());
    println!("server time: {} ns", server_ns);
    Ok(())
}

fn update(db: &PathBuf, deltas: &PathBuf, hints: &HintArgs) -> eyre::Result<()> {
    let (mut client, _snapshot) = build(db, hints)?;
    let reader = DeltaReader::open(deltas).wrap_err("opening delta file")?;
    let applied = client.apply_deltas(reader)?;
    println!("applied:  {} deltas", applied);
    Ok(())
}

fn parse_master(text: &str) -> eyre::Result<MasterSecret> {
    let raw = hex::decode(text).wrap_err("master secret must be hex")?;
    Ok(MasterSecret::new(&raw)?)
}

fn parse_prp(text: &str) -> eyre::Result<PrpKind> {
    match text {
        "feistel" => Ok(PrpKind::Feistel),
        "table" => Ok(PrpKind::Table),
        other => bail!("unknown PRP backing '{}', expected feistel or table", other),
    }
}

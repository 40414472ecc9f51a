//! romcard-scan
//!
//! Acquire a ROM image and print what it contains

use anyhow::Context;
use clap::Parser;
use romcard_rs::{FourCC, ReaderOptions, RomReader, RomSummary};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "romcard-scan")]
#[command(about = "Inspect a handheld firmware ROM image")]
struct Args {
    /// Path to the ROM image
    image: PathBuf,

    /// TOML file with reader options
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Emit a JSON report instead of text
    #[arg(long)]
    json: bool,

    /// List databases
    #[arg(short = 'd', long)]
    databases: bool,

    /// List every chunk
    #[arg(long)]
    chunks: bool,

    /// Dump the feature table
    #[arg(short = 'f', long)]
    features: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    summary: RomSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    databases: Option<&'a [romcard_rs::Database]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunks: Option<Vec<&'a romcard_rs::Chunk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    features: Option<&'a romcard_rs::FeatureTable>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let options = match &args.config {
        Some(path) => ReaderOptions::load(path)
            .with_context(|| format!("loading options from {}", path.display()))?,
        None => ReaderOptions::default(),
    };

    let mut reader = RomReader::builder()
        .options(options)
        .path(args.image.clone())
        .build()
        .with_context(|| format!("reading {}", args.image.display()))?;

    reader
        .acquire_all()
        .with_context(|| format!("acquiring {}", args.image.display()))?;

    if args.json {
        let report = Report {
            summary: reader.summary(),
            databases: args.databases.then(|| reader.databases()),
            chunks: args.chunks.then(|| reader.chunks().values().collect()),
            features: if args.features { reader.features() } else { None },
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_summary(&reader.summary());
    if args.databases {
        print_databases(&reader);
    }
    if args.chunks {
        print_chunks(&reader);
    }
    if args.features {
        print_features(&reader);
    }

    Ok(())
}

fn print_summary(summary: &RomSummary) {
    println!("Image:     {} bytes, sha256 {}", summary.size, summary.sha256);
    if summary.window_start != 0 {
        println!("Big ROM:   at file offset {:#x}", summary.window_start);
    }
    println!("Base:      {:#010x}", summary.base);

    if let Some(card) = &summary.card {
        println!("Card:      {} ({})", card.name, card.manufacturer);
        println!(
            "Header:    v{}, firmware {} ({:#x})",
            card.hdr_version, card.rom_version_string, card.rom_version
        );
        if card.company_id != 0 || card.hal_id != 0 {
            println!(
                "Ids:       company {} hal {}",
                FourCC(card.company_id),
                FourCC(card.hal_id)
            );
        }
    }
    if let Some(cpu) = &summary.cpu {
        println!("CPU:       328={} EZ={} VZ={}", cpu.cpu_328, cpu.ez, cpu.vz);
    }
    if let Some(version) = &summary.version {
        println!(
            "Version:   {} (stage {}, build {})",
            version, version.stage, version.build
        );
    }
    println!(
        "Contents:  {} heap(s), {} chunk(s), {} database(s), {} feature(s)",
        summary.heap_count, summary.chunk_count, summary.database_count, summary.feature_count
    );
    match summary.splash {
        Some(depth) => println!("Splash:    {:?}", depth),
        None => println!("Splash:    none"),
    }
}

fn print_databases(reader: &RomReader) {
    println!();
    println!("{:<32} {:>4} {:>4} {:>5} {:>5}", "NAME", "TYPE", "CRTR", "ATTR", "ITEMS");
    for db in reader.databases() {
        println!(
            "{:<32} {:>4} {:>4} {:#06x} {:>5}",
            db.name,
            db.kind,
            db.creator,
            db.attributes,
            db.items.len()
        );
    }
}

fn print_chunks(reader: &RomReader) {
    println!();
    println!("{:<10} {:>4} {:>8} {:<16} {:>4} {:>5}", "LID", "HEAP", "SIZE", "KIND", "DB", "ITEM");
    for chunk in reader.chunks().values() {
        let db = chunk.database.map(|d| d.to_string()).unwrap_or_default();
        let item = chunk.item.map(|i| i.to_string()).unwrap_or_default();
        let kind = format!("{:?}", chunk.kind);
        println!(
            "{:#010x} {:>4} {:>8} {:<16} {:>4} {:>5}",
            chunk.local_id, chunk.heap, chunk.size, kind, db, item
        );
    }
}

fn print_features(reader: &RomReader) {
    let Some(table) = reader.features() else {
        println!();
        println!("No feature table");
        return;
    };
    println!();
    for creator in table.creators() {
        if let Some(values) = table.creator(creator) {
            for (number, value) in values {
                println!("{} {:>5} = {:#010x}", creator, number, value);
            }
        }
    }
}

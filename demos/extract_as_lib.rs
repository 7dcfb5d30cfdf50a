//! # Geodelta - library usage example
//!
//! Shows three common patterns for consuming Geodelta as a Rust library:
//!
//! 1. **From a config file** - simplest, mirrors the CLI
//! 2. **Programmatic request** - build an `ExtractionRequest` in code and
//!    inspect the reconstructed features
//! 3. **Decode only** - read a raw changeset without any database
//!
//! Run with a config file:
//!   cargo run --example extract_as_lib -- geodelta.toml
//!
//! Run against a project directory and layer:
//!   cargo run --example extract_as_lib -- /work/survey "survey/points.gpkg|layername=points"
//!
//! Run with no arguments for the offline decode demo.

use anyhow::Result;
use geodelta::{
    decode, fingerprint,
    presentation::writers::{write_to_file, writer_for},
    AppConfig, ChangesetBuilder, ExtractionRequest, NoFeedback, Operation, ReconstructedFeature,
    Value, VecSink,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match (args.get(1), args.get(2)) {
        (Some(project), Some(layer)) => programmatic_request(project, layer).await,
        (Some(path), None) => from_config_file(path).await,
        _ => decode_only(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern 1 - load config from a TOML file (same as the CLI does internally)
// ─────────────────────────────────────────────────────────────────────────────
async fn from_config_file(path: &str) -> Result<()> {
    println!("=== Pattern 1: from config file ({path}) ===\n");

    let cfg = AppConfig::load(Some(path))?;
    let mut writer = writer_for(&cfg.output.format)
        .ok_or_else(|| anyhow::anyhow!("Unknown format: {}", cfg.output.format))?;

    let report = geodelta::run(&cfg, writer.as_sink(), &NoFeedback).await?;
    let written = write_to_file(&*writer, report.extraction_id, &cfg.output.dir)?;

    println!("Written: {}", written.display());
    println!("Features: {}", report.features_emitted);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern 2 - build the request in code and keep the features in memory.
// ─────────────────────────────────────────────────────────────────────────────
async fn programmatic_request(project: &str, layer: &str) -> Result<()> {
    println!("=== Pattern 2: programmatic request ===\n");

    let request = ExtractionRequest::new(project, layer);
    let mut sink = VecSink::new();
    let report = geodelta::extract(&request, &mut sink, &NoFeedback).await?;

    println!("table   : {}", report.table);
    println!("id      : {}", report.extraction_id);
    if let Some(fp) = &report.fingerprint {
        println!("diff    : {}", fp);
    }
    println!();

    for feature in &sink.features {
        println!("  {}", describe(feature, &sink));
    }

    for warning in &report.warnings {
        eprintln!("⚠  {warning}");
    }

    // Example: refuse to continue when the local edits delete features
    if report.summary.total_deletes > 0 {
        eprintln!(
            "⚠  {} deleted feature(s), review before syncing.",
            report.summary.total_deletes,
        );
    }

    let json = serde_json::to_string_pretty(&report)?;
    println!("\nFull report: {} bytes of JSON", json.len());
    Ok(())
}

fn describe(feature: &ReconstructedFeature, sink: &VecSink) -> String {
    let marker = match feature.operation {
        Operation::Insert => "+",
        Operation::Update => "~",
        Operation::Delete => "-",
    };
    let attrs = sink
        .fields
        .iter()
        .zip(&feature.values)
        .map(|(f, v)| format!("{}={:?}", f.name, v))
        .collect::<Vec<_>>()
        .join(", ");
    let geom = feature
        .geometry
        .as_ref()
        .map_or("no geometry".to_string(), |g| format!("{} bytes WKB", g.len()));
    format!("{marker} {:?}  {attrs}  ({geom})", feature.key)
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern 3 - decode a changeset without touching any database.
// ─────────────────────────────────────────────────────────────────────────────
fn decode_only() -> Result<()> {
    println!("=== Pattern 3: decode only ===\n");

    let bytes = ChangesetBuilder::new()
        .table("points", &[1, 0, 0])
        .insert(&[
            Some(Value::Integer(1)),
            Some(Value::Null),
            Some(Value::Text("new well".into())),
        ])
        .update(
            &[Some(Value::Integer(2)), None, Some(Value::Text("old".into()))],
            &[None, None, Some(Value::Text("renamed".into()))],
        )
        .build();

    let changeset = decode(&bytes)?;
    println!("fingerprint : {}", fingerprint(&bytes));
    for block in changeset.blocks() {
        println!("━━ {} ({} columns) ━━", block.table(), block.column_count());
        for row in block.rows() {
            let changed = row.slots().iter().filter(|s| !s.is_unchanged()).count();
            println!("  {:<6} {} column(s) recorded", row.operation().as_str(), changed);
        }
    }
    Ok(())
}

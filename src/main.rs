use anyhow::Result;
use clap::Parser;
use geodelta::presentation::cli_summary::{print_perf_summary, print_summary};
use geodelta::presentation::writers::{all_writers, write_to_file, writer_for};
use geodelta::{AppConfig, AtomicFeedback, LogLevel, VecSink};
use std::sync::Arc;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(
    name = "geodelta",
    about = "Geodelta: review the local edits of a GeoPackage layer as complete features."
)]
struct Cli {
    /// Project working copy directory
    #[arg(short, long)]
    project: Option<String>,

    /// Layer source, e.g. `survey/points.gpkg|layername=points`
    #[arg(short, long)]
    layer: Option<String>,

    /// Optional TOML config file
    #[arg(short, long)]
    config: Option<String>,

    /// Output format: json or jsonl
    #[arg(short, long)]
    format: Option<String>,

    /// Output directory
    #[arg(short, long)]
    output: Option<String>,

    #[arg(long)]
    dry_run: bool,

    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    geodelta::init_tracing(match (cli.verbose, cli.quiet) {
        (true, _) => LogLevel::Debug,
        (_, true) => LogLevel::Error,
        _ => LogLevel::Info,
    });

    let mut cfg = AppConfig::load(cli.config.as_deref())?;
    if let Some(project) = cli.project {
        cfg.project.dir = Some(project);
    }
    if let Some(layer) = cli.layer {
        cfg.layer.source = Some(layer);
    }
    if let Some(format) = cli.format {
        cfg.output.format = format;
    }
    if let Some(output) = cli.output {
        cfg.output.dir = output;
    }

    let feedback = Arc::new(AtomicFeedback::new());
    {
        let feedback = Arc::clone(&feedback);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current record");
                feedback.cancel();
            }
        });
    }

    if cli.dry_run {
        let mut sink = VecSink::new();
        let report = geodelta::run(&cfg, &mut sink, feedback.as_ref()).await?;
        print_summary(&report);
        if cli.verbose {
            print_perf_summary(&report.perf);
        }
        return Ok(());
    }

    let mut writer = writer_for(&cfg.output.format).ok_or_else(|| {
        let known: Vec<&str> = all_writers().iter().map(|w| w.extension()).collect();
        anyhow::anyhow!("Unknown format: {} (expected one of: {})", cfg.output.format, known.join(", "))
    })?;
    let report = geodelta::run(&cfg, writer.as_sink(), feedback.as_ref()).await?;

    print_summary(&report);
    if cli.verbose {
        print_perf_summary(&report.perf);
    }

    if report.canceled {
        println!("Extraction canceled, nothing written.");
        return Ok(());
    }

    let path = write_to_file(&*writer, report.extraction_id, &cfg.output.dir)?;
    println!("Features written to {}", path.display());

    Ok(())
}

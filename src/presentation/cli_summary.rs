use crate::application::extraction::ExtractionReport;
use crate::application::monitoring::PerfReport;
use colored::*;
use tabled::settings::{object::Columns, Alignment, Modify, Style};
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct SummaryRow {
    metric: String,
    value: String,
}

pub fn print_summary(report: &ExtractionReport) {
    println!();

    println!("{}", "GEODELTA EXTRACTION SUMMARY".bold().cyan());
    println!("Layer table: {}", report.table.blue());
    println!("Extraction: {}", report.extraction_id.to_string().bright_yellow());
    if let Some(fp) = &report.fingerprint {
        println!("Changeset: {}", fp.as_str().dimmed());
    }
    println!();

    if report.empty_changeset {
        println!("{}", "No local changes recorded.".italic());
        return;
    }

    if report.canceled {
        println!(
            "{} after {} of {} record(s)",
            "Canceled".bold().red(),
            report.records_processed,
            report.records_total
        );
        println!();
    }

    let s = &report.summary;
    let summary_rows = vec![
        SummaryRow {
            metric: "Inserted features".into(),
            value: s.total_inserts.to_string().green().to_string(),
        },
        SummaryRow {
            metric: "Updated features".into(),
            value: s.total_updates.to_string().yellow().to_string(),
        },
        SummaryRow {
            metric: "Deleted features".into(),
            value: s.total_deletes.to_string().red().to_string(),
        },
        SummaryRow {
            metric: "Total features".into(),
            value: s.total_changes.to_string().bold().to_string(),
        },
        SummaryRow {
            metric: "Records processed".into(),
            value: format!("{}/{}", report.records_processed, report.records_total),
        },
    ];

    let summary_table = Table::new(summary_rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..=1)).with(Alignment::right()))
        .to_string();
    println!("{summary_table}");

    if !report.skipped_tables.is_empty() {
        println!(
            "{} changes of other tables ignored: {}",
            "!".yellow().bold(),
            report.skipped_tables.join(", ")
        );
    }

    if !report.warnings.is_empty() {
        println!();
        println!("{}", format!("{} WARNING(S)", report.warnings.len()).bold().yellow());
        for w in &report.warnings {
            println!("  {}", w.yellow());
        }
    }
    println!();
}

// ─── Performance summary ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct PerfRow {
    operation: String,
    table: String,
    items: String,
    #[tabled(rename = "time (ms)")]
    duration_ms: String,
}

/// Print a performance timing table to stdout.
pub fn print_perf_summary(report: &PerfReport) {
    if report.timings.is_empty() {
        return;
    }

    println!("{}", "PERFORMANCE".bold().cyan());

    let rows: Vec<PerfRow> = report
        .timings
        .iter()
        .map(|t| PerfRow {
            operation: t.operation.dimmed().to_string(),
            table: t.table.bold().to_string(),
            items: t.items.to_string(),
            duration_ms: format_duration(t.duration_ms),
        })
        .collect();

    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..=3)).with(Alignment::right()))
        .to_string();

    println!("{table}");

    println!(
        "  Lookups: {} ({} missing)  ·  {} ms elapsed",
        report.lookups.to_string().bold(),
        report.lookup_misses,
        format_duration(report.total_ms),
    );
    println!();
}

fn format_duration(ms: u128) -> String {
    if ms >= 1_000 {
        format!("{:.1}s", ms as f64 / 1_000.0).yellow().to_string()
    } else if ms >= 100 {
        ms.to_string().yellow().to_string()
    } else {
        ms.to_string().green().to_string()
    }
}

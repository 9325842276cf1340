// src/output.rs
// =============================================================================
// Turns scan outcomes into something a human (or another tool) can read.
//
// Formats:
// - table: one row per outcome, 404s hidden unless asked for
// - JSON: the whole outcome list, pretty printed
// - JSON lines: one outcome per line, for the --out file
// =============================================================================

use crate::scan::{ProbeOutcome, ScanSummary};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Prints the results either as a table or JSON
pub fn print_results(outcomes: &[ProbeOutcome], json: bool, show_all: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcomes)?);
    } else {
        print!("{}", render_table(outcomes, show_all));
    }
    Ok(())
}

/// Builds the human-readable table, sorted by path then method.
pub fn render_table(outcomes: &[ProbeOutcome], show_all: bool) -> String {
    let mut rows: Vec<&ProbeOutcome> = outcomes
        .iter()
        .filter(|o| show_all || !o.is_not_found())
        .collect();
    rows.sort_by(|a, b| {
        a.task
            .path
            .cmp(&b.task.path)
            .then(a.task.method.as_str().cmp(b.task.method.as_str()))
    });

    let mut out = format!(
        "{:<60} {:<8} {:<20} {:<6} {}\n",
        "URL", "METHOD", "STATUS", "DEPTH", "NOTE"
    );
    out.push_str(&"=".repeat(110));
    out.push('\n');

    for outcome in rows {
        // Truncate URL if too long for display
        let url_display = if outcome.url.chars().count() > 57 {
            format!("{}...", outcome.url.chars().take(57).collect::<String>())
        } else {
            outcome.url.clone()
        };

        out.push_str(&format!(
            "{:<60} {:<8} {:<20} {:<6} {}\n",
            url_display,
            outcome.task.method,
            format_status(outcome),
            outcome.task.depth,
            format_note(outcome)
        ));
    }

    out
}

/// Appends the run summary below the table.
pub fn print_summary(summary: &ScanSummary, shown: usize) {
    println!();
    println!("📊 Summary:");
    println!("   🔎 Probes: {}", summary.probes);
    println!("   📂 Shown: {}", shown);
    println!("   📁 Expanded: {}", summary.expandable);
    println!("   ⚠️  Errors: {}", summary.errors);
    println!("   ⏱️  Elapsed: {:.2?}", summary.elapsed);
    if summary.cancelled {
        println!("   🛑 Scan was cancelled before it finished");
    }
}

/// Writes one JSON object per line.
pub fn write_json_lines(path: &Path, outcomes: &[ProbeOutcome]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create output file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);

    for outcome in outcomes {
        serde_json::to_writer(&mut writer, outcome)?;
        writer.write_all(b"\n")?;
    }

    writer.flush()?;
    Ok(())
}

// Formats the outcome's status as a short label
fn format_status(outcome: &ProbeOutcome) -> String {
    match (outcome.status, &outcome.error) {
        (Some(code), _) if outcome.expandable => format!("📁 {}", code),
        (Some(404), _) => "❌ 404".to_string(),
        (Some(code), _) if (300..400).contains(&code) => format!("🔀 {}", code),
        (Some(code), _) => format!("✅ {}", code),
        (None, Some(error)) => format!("⚠️  {:?}", error.kind).to_uppercase(),
        (None, None) => "?".to_string(),
    }
}

fn format_note(outcome: &ProbeOutcome) -> String {
    if let Some(location) = &outcome.location {
        format!("-> {}", location)
    } else if let Some(error) = &outcome.error {
        error.message.clone()
    } else {
        String::new()
    }
}

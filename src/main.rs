// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging
// 3. Dispatch to the appropriate subcommand handler
// 4. Exit with proper code (0 = finished, 1 = cancelled, 2 = error)
//
// The scan engine itself lives in the library (src/scan/); this file only
// wires flags, dictionaries, cancellation and output around it.
// =============================================================================

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ScanArgs};
use dirscout::dictionary;
use dirscout::output;
use dirscout::scan::Scanner;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // {:#} prints the whole context chain on one line
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// Returns:
//   Ok(0) = scan (or other command) finished
//   Ok(1) = scan was cancelled before it finished
//   Err   = setup or IO error (exit code 2)
async fn run() -> Result<i32> {
    let cli = Cli::parse();
    dirscout::logging::init(dirscout::logging::level_from_verbosity(cli.verbose))?;

    match cli.command {
        Commands::Scan(args) => handle_scan(args).await,
        Commands::DictionaryGenerate {
            path,
            out,
            absolute,
        } => {
            handle_generate(&path, out.as_deref(), absolute)?;
            Ok(0)
        }
        Commands::Version => {
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

async fn handle_scan(args: ScanArgs) -> Result<i32> {
    let config = args.to_config()?;
    let timeout = config.timeout;

    eprintln!("🔍 Scanning: {}", args.url);
    let dictionary = dictionary::load(&args.dictionary, timeout).await?;
    if dictionary.is_empty() {
        warn!(source = %args.dictionary, "dictionary is empty, nothing will be probed");
    }
    eprintln!(
        "📄 {} dictionary entries, depth {}, {} workers",
        dictionary.len(),
        args.scan_depth,
        args.threads
    );

    let cancel = CancellationToken::new();
    spawn_cancel_triggers(&cancel, args.max_duration);

    let scanner = Scanner::with_http(config, dictionary)?;
    let mut handle = scanner
        .start(cancel.clone())
        .await
        .context("scan could not start")?;

    // Outcomes stream in as workers finish; show the interesting ones live
    let mut outcomes = Vec::new();
    while let Some(outcome) = handle.next().await {
        if !outcome.is_not_found() && !args.json {
            info!(url = %outcome.url, status = ?outcome.status, "found");
        }
        outcomes.push(outcome);
    }
    let summary = handle.finish().await?;

    output::print_results(&outcomes, args.json, args.show_all)?;
    if !args.json {
        let shown = outcomes
            .iter()
            .filter(|o| args.show_all || !o.is_not_found())
            .count();
        output::print_summary(&summary, shown);
    }

    if let Some(path) = &args.out {
        output::write_json_lines(path, &outcomes)?;
        eprintln!("💾 Results written to {}", path.display());
    }

    Ok(if summary.cancelled { 1 } else { 0 })
}

// Ctrl-C and the optional deadline both cancel the same token
fn spawn_cancel_triggers(cancel: &CancellationToken, max_duration: Option<u64>) {
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n🛑 Interrupted, stopping scan...");
            on_ctrl_c.cancel();
        }
    });

    if let Some(secs) = max_duration {
        let on_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(seconds = secs, "maximum scan duration reached, stopping");
            on_deadline.cancel();
        });
    }
}

fn handle_generate(root: &Path, out: Option<&Path>, absolute: bool) -> Result<()> {
    let dictionary = dictionary::generate(root, absolute)?;

    let mut writer: Box<dyn Write> = match out {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("failed to create '{}'", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    for entry in dictionary.iter() {
        writeln!(writer, "{}", entry)?;
    }
    writer.flush()?;

    if let Some(path) = out {
        eprintln!("📄 {} entries written to {}", dictionary.len(), path.display());
    }
    Ok(())
}

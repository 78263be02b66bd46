use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    process::ExitCode,
};

use pyramid::{read_point_table, verify_pyramid};

/// Check that the finest level of a PTIL pyramid holds exactly the points of
/// the source table.
#[derive(Parser, Debug)]
#[command(name = "ptile_verify", version)]
struct Args {
    /// Source table the pyramid was built from (.csv or .zip).
    #[arg(long)]
    input: PathBuf,

    /// Pyramid directory (the one containing the numbered level directories).
    #[arg(long)]
    tiles: PathBuf,

    /// Write the full report as JSON to this path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Example rows listed per discrepancy category.
    #[arg(long, default_value_t = 20)]
    max_listed: usize,
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let table = read_point_table(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    info!("Comparing against {}", args.tiles.display());
    let report = verify_pyramid(&table.rows, &args.tiles, args.max_listed)
        .with_context(|| format!("verifying {}", args.tiles.display()))?;

    info!(
        "source={} rebuilt={} missing={} invalid={} unreadable_tiles={}",
        report.source_points,
        report.rebuilt_points,
        report.reconciliation.missing,
        report.reconciliation.invalid,
        report.unreadable_tiles
    );

    if let Some(path) = &args.report {
        let mut writer = BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        );
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writer.flush()?;
        info!("Report written to {}", path.display());
    }

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

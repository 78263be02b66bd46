//! End-to-end pyramid build: sidecar, base binning, then one coarser level at
//! a time. Each level is fully written before the next is derived from it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::aggregate::aggregate_level;
use crate::binner::bin_points;
use crate::config::{PyramidConfig, SidecarConfig};
use crate::error::{PyramidError, Result};
use crate::store::{write_level, write_omitted};
use crate::table::PointTable;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Seed for subsampling; entropy when `None`.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSummary {
    pub level: u32,
    pub tile_size: u64,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub points: usize,
    pub skipped_records: usize,
}

#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub output_dir: PathBuf,
    pub sidecar: PathBuf,
    pub omitted: usize,
    pub omitted_file: Option<PathBuf>,
    /// Finest level first.
    pub levels: Vec<LevelSummary>,
}

impl BuildSummary {
    pub fn skipped_records(&self) -> usize {
        self.levels.iter().map(|l| l.skipped_records).sum()
    }
}

/// Name of the pyramid directory for `input`: its file name up to the first `.`.
pub fn input_name(input: &Path) -> Result<String> {
    input
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            PyramidError::InvalidConfig(format!("cannot derive a name from {}", input.display()))
        })
}

/// Check `output_dir` and return `{output_dir}/{name}`; nothing is created.
pub fn pyramid_root(output_dir: &Path, name: &str) -> Result<PathBuf> {
    if !output_dir.is_dir() {
        return Err(PyramidError::InvalidOutputDir(output_dir.to_owned()));
    }
    Ok(output_dir.join(name))
}

/// Build and persist the whole pyramid for `table` under `root`.
pub fn build_pyramid(
    table: &PointTable,
    config: &PyramidConfig,
    root: &Path,
    options: &BuildOptions,
) -> Result<BuildSummary> {
    config.validate()?;
    let started = Instant::now();

    fs::create_dir_all(root)?;
    let sidecar = SidecarConfig::from(config).write(root)?;

    info!("Parsing and classifying points...");
    let binned = bin_points(&table.rows, config);
    let omitted_file = write_omitted(root, &binned.omitted)?;

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut levels = Vec::with_capacity(config.level_count as usize + 1);
    let mut current = binned.grid;

    loop {
        let stats = write_level(root, &current)?;
        levels.push(LevelSummary {
            level: current.level,
            tile_size: config.tile_size_at(current.level),
            tiles_x: current.dims.tiles_x,
            tiles_y: current.dims.tiles_y,
            points: stats.points,
            skipped_records: stats.skipped_records,
        });

        if current.level == 0 {
            break;
        }

        let next = current.level - 1;
        info!(
            "Generating level {} (tile size {})",
            next,
            config.tile_size_at(next)
        );
        current = aggregate_level(&current, config.grid_at(next), &mut rng);
    }

    info!(
        "Pyramid written to {} in {:.2?}",
        root.display(),
        started.elapsed()
    );

    Ok(BuildSummary {
        output_dir: root.to_owned(),
        sidecar,
        omitted: binned.omitted.len(),
        omitted_file,
        levels,
    })
}

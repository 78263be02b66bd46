//! On-disk layout: `{root}/{level}/{col}/{row}.bin`, one PTIL file per tile.
//!
//! The numerically largest level directory is always the finest level;
//! readers discover it with [`finest_level`].

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use ptile::{PointRecord, PtileTile, TileKey};
use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use crate::binner::OmittedPoint;
use crate::error::{PyramidError, Result};
use crate::grid::TileGrid;

pub const TILE_EXTENSION: &str = "bin";
pub const OMITTED_FILE_NAME: &str = "omittedPoints.json";

pub fn level_dir(root: &Path, level: u32) -> PathBuf {
    root.join(level.to_string())
}

pub fn tile_path(root: &Path, key: TileKey) -> PathBuf {
    level_dir(root, key.level)
        .join(key.col.to_string())
        .join(format!("{}.{}", key.row, TILE_EXTENSION))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelWriteStats {
    pub tiles: usize,
    pub points: usize,
    pub skipped_records: usize,
}

/// Write every tile of `grid` (empty ones included). Tiles are written in
/// parallel; the first I/O failure is returned.
pub fn write_level(root: &Path, grid: &TileGrid) -> Result<LevelWriteStats> {
    for col in 0..grid.dims.tiles_x {
        fs::create_dir_all(level_dir(root, grid.level).join(col.to_string()))?;
    }

    let skipped: Vec<usize> = grid
        .tiles()
        .par_iter()
        .enumerate()
        .map(|(index, points)| -> Result<usize> {
            let key = grid.key(index);
            let tile = PtileTile {
                tile_key: Some(key),
                points: points.clone(),
            };

            let skipped = ptile::write_file(tile_path(root, key), &tile)?;
            if skipped > 0 {
                warn!(
                    "Tile {}/{}/{}: skipped {} records that could not be encoded",
                    key.level, key.col, key.row, skipped
                );
            }
            Ok(skipped)
        })
        .collect::<Result<_>>()?;

    let skipped_records: usize = skipped.iter().sum();
    let stats = LevelWriteStats {
        tiles: skipped.len(),
        points: grid.point_count() - skipped_records,
        skipped_records,
    };

    info!(
        "Saved level {}: {} tiles, {} points",
        grid.level, stats.tiles, stats.points
    );
    Ok(stats)
}

/// Largest integer-named subdirectory of `root`.
pub fn finest_level(root: &Path) -> Result<u32> {
    let mut finest = None;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        let Some(level) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };

        finest = finest.max(Some(level));
    }

    finest.ok_or_else(|| PyramidError::NoLevels(root.to_owned()))
}

#[derive(Debug, Default)]
pub struct LoadedLevel {
    pub level: u32,
    pub points: Vec<PointRecord>,
    pub tiles_read: usize,
    pub unreadable: Vec<(PathBuf, String)>,
}

/// Decode every `.bin` file below `{root}/{level}`. A tile that fails to
/// parse is recorded in `unreadable` and skipped.
pub fn load_level(root: &Path, level: u32) -> Result<LoadedLevel> {
    let dir = level_dir(root, level);
    let mut loaded = LoadedLevel {
        level,
        ..LoadedLevel::default()
    };

    for entry in WalkDir::new(&dir).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let is_tile = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s == TILE_EXTENSION)
            .unwrap_or(false);
        if !is_tile {
            continue;
        }

        match ptile::read_file(path) {
            Ok(tile) => {
                loaded.tiles_read += 1;
                loaded.points.extend(tile.points);
            }
            Err(err) => {
                warn!("Failed to parse tile {}: {}", path.display(), err);
                loaded.unreadable.push((path.to_owned(), err.to_string()));
            }
        }
    }

    debug!(
        "Loaded {} points from {} tiles under {}",
        loaded.points.len(),
        loaded.tiles_read,
        dir.display()
    );
    Ok(loaded)
}

#[derive(Serialize)]
struct OmittedDocument<'a> {
    count: usize,
    points: &'a [OmittedPoint],
}

/// Write the omitted-points diagnostic into `dir`. Nothing is written for an
/// empty list.
pub fn write_omitted(dir: &Path, omitted: &[OmittedPoint]) -> Result<Option<PathBuf>> {
    if omitted.is_empty() {
        return Ok(None);
    }

    let path = dir.join(OMITTED_FILE_NAME);
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(
        &mut writer,
        &OmittedDocument {
            count: omitted.len(),
            points: omitted,
        },
    )?;
    writer.flush()?;

    warn!("{} omitted points listed in {}", omitted.len(), path.display());
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binner::OmitReason;
    use crate::geometry::GridDims;

    fn record(x: f64, owner: &str) -> PointRecord {
        PointRecord::from_xy(x, x + 1.0, [1, 2, 3], "g".into(), owner.into())
    }

    #[test]
    fn addressing_layout() {
        let p = tile_path(Path::new("/out/run"), TileKey::new(3, 5, 7));
        assert_eq!(p, Path::new("/out/run/3/5/7.bin"));
    }

    #[test]
    fn writes_every_tile_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = TileGrid::empty(2, GridDims { tiles_x: 2, tiles_y: 4 });
        grid.set(1, 3, vec![record(1.0, "a"), record(2.0, "b")]);
        grid.set(0, 0, vec![record(3.0, "c")]);

        let stats = write_level(dir.path(), &grid).unwrap();
        assert_eq!(stats, LevelWriteStats { tiles: 8, points: 3, skipped_records: 0 });
        assert!(tile_path(dir.path(), TileKey::new(2, 0, 3)).is_file());

        let tile = ptile::read_file(tile_path(dir.path(), TileKey::new(2, 1, 3))).unwrap();
        assert_eq!(tile.tile_key, Some(TileKey::new(2, 1, 3)));
        assert_eq!(tile.points, vec![record(1.0, "a"), record(2.0, "b")]);

        let loaded = load_level(dir.path(), 2).unwrap();
        assert_eq!(loaded.tiles_read, 8);
        assert_eq!(loaded.points.len(), 3);
        assert!(loaded.unreadable.is_empty());
    }

    #[test]
    fn skipped_records_are_not_counted_as_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = TileGrid::empty(0, GridDims { tiles_x: 2, tiles_y: 2 });
        let oversized = "o".repeat(u16::MAX as usize + 1);
        grid.set(0, 0, vec![record(1.0, "a"), record(2.0, &oversized)]);

        let stats = write_level(dir.path(), &grid).unwrap();
        assert_eq!(stats, LevelWriteStats { tiles: 4, points: 1, skipped_records: 1 });

        let loaded = load_level(dir.path(), 0).unwrap();
        assert_eq!(loaded.points.len(), stats.points);
    }

    #[test]
    fn finest_level_is_max_integer_dir() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["0", "1", "10", "2", "notes", "11.bak"] {
            fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("99"), b"file, not a dir").unwrap();
        assert_eq!(finest_level(dir.path()).unwrap(), 10);

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            finest_level(empty.path()).unwrap_err(),
            PyramidError::NoLevels(_)
        ));
    }

    #[test]
    fn unreadable_tiles_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let grid = TileGrid::empty(0, GridDims { tiles_x: 2, tiles_y: 2 });
        write_level(dir.path(), &grid).unwrap();
        fs::write(tile_path(dir.path(), TileKey::new(0, 1, 1)), b"garbage").unwrap();
        fs::write(level_dir(dir.path(), 0).join("readme.txt"), b"ignored").unwrap();

        let loaded = load_level(dir.path(), 0).unwrap();
        assert_eq!(loaded.tiles_read, 3);
        assert_eq!(loaded.unreadable.len(), 1);
    }

    #[test]
    fn omitted_file_only_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_omitted(dir.path(), &[]).unwrap().is_none());

        let omitted = vec![OmittedPoint {
            owner_id: "7".into(),
            x: -1.0,
            y: 2.0,
            col: -1,
            row: 0,
            reason: OmitReason::OutOfBounds,
        }];
        let path = write_omitted(dir.path(), &omitted).unwrap().unwrap();

        let doc: serde_json::Value =
            serde_json::from_reader(File::open(path).unwrap()).unwrap();
        assert_eq!(doc["count"], 1);
        assert_eq!(doc["points"][0]["owner_id"], "7");
        assert_eq!(doc["points"][0]["reason"], "out_of_bounds");
    }
}

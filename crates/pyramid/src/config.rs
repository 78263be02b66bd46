//! Pyramid configuration: derived once from the request and the input table,
//! validated, then shared read-only by every stage.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::color_map::ColorMap;
use crate::error::{PyramidError, Result};
use crate::geometry::{plan_grid, plan_levels, Extent, GridDims, DEFAULT_TILE_BUDGET};
use crate::table::PointTable;

pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Upper bound on the level count so per-level tile sizes fit in a u64.
pub const MAX_LEVELS: u32 = 32;

pub const SIDECAR_FILE_NAME: &str = "config.json";

/// User-facing knobs before planning.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// Image extent; derived from the table when `None`.
    pub extent: Option<Extent>,
    pub base_tile_size: u32,
    /// Coarser levels above the base; planned from `tile_budget` when `None`.
    pub level_count: Option<u32>,
    pub tile_budget: u64,
}

impl Default for PlanRequest {
    fn default() -> Self {
        Self {
            extent: None,
            base_tile_size: DEFAULT_TILE_SIZE,
            level_count: None,
            tile_budget: DEFAULT_TILE_BUDGET,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PyramidConfig {
    pub width: u32,
    pub height: u32,
    pub base_tile_size: u32,
    /// Index of the finest (base) level; level 0 is the coarsest.
    pub level_count: u32,
    pub color_map: ColorMap,
}

/// Smallest integer extent that strictly contains every finite point.
pub fn extent_from_table(table: &PointTable) -> Option<Extent> {
    let (mx, my) = table.max_xy()?;
    let axis = |v: f64| (v.max(0.0).floor() + 1.0).min(u32::MAX as f64) as u32;
    Some(Extent::new(axis(mx), axis(my)))
}

impl PyramidConfig {
    pub fn new(
        extent: Extent,
        base_tile_size: u32,
        level_count: u32,
        color_map: ColorMap,
    ) -> Result<Self> {
        let config = Self {
            width: extent.width,
            height: extent.height,
            base_tile_size,
            level_count,
            color_map,
        };
        config.validate()?;
        Ok(config)
    }

    /// Resolve a request against the input table.
    pub fn plan(request: &PlanRequest, table: &PointTable, color_map: ColorMap) -> Result<Self> {
        if request.base_tile_size == 0 {
            return Err(PyramidError::InvalidConfig("tile size must be > 0".into()));
        }
        if request.tile_budget == 0 && request.level_count.is_none() {
            return Err(PyramidError::InvalidConfig("tile budget must be > 0".into()));
        }

        let extent = match request.extent {
            Some(extent) => extent,
            None => {
                let extent = extent_from_table(table).ok_or_else(|| {
                    PyramidError::InvalidConfig("no finite coordinates to derive the extent".into())
                })?;
                info!(
                    "Image extent derived from points: {} x {}",
                    extent.width, extent.height
                );
                extent
            }
        };

        let level_count = match request.level_count {
            Some(levels) => levels,
            None => plan_levels(extent, request.base_tile_size as u64, request.tile_budget),
        };

        Self::new(extent, request.base_tile_size, level_count, color_map)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PyramidError::InvalidConfig(format!(
                "extent must be non-empty, got {} x {}",
                self.width, self.height
            )));
        }
        if self.base_tile_size == 0 {
            return Err(PyramidError::InvalidConfig("tile size must be > 0".into()));
        }
        if self.level_count > MAX_LEVELS {
            return Err(PyramidError::InvalidConfig(format!(
                "level count {} exceeds {}",
                self.level_count, MAX_LEVELS
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn extent(&self) -> Extent {
        Extent::new(self.width, self.height)
    }

    /// Tile side length at `level`: `base_tile_size * 2^(level_count - level)`.
    pub fn tile_size_at(&self, level: u32) -> u64 {
        debug_assert!(level <= self.level_count);
        (self.base_tile_size as u64) << (self.level_count - level)
    }

    pub fn grid_at(&self, level: u32) -> GridDims {
        plan_grid(self.extent(), self.tile_size_at(level))
    }

    /// Tile size of the coarsest level, as advertised to viewers.
    pub fn top_tile_size(&self) -> u64 {
        self.tile_size_at(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarColor {
    pub label: String,
    pub color: [u8; 3],
}

/// The `config.json` document consumed by viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarConfig {
    pub layer_height: u32,
    pub layer_width: u32,
    pub layers: u32,
    pub tile_size: u64,
    pub color_map: Vec<SidecarColor>,
}

/// Positions are stored `[y, x]`, so viewers treat y as their first axis:
/// `layer_width` spans y and `layer_height` spans x.
impl From<&PyramidConfig> for SidecarConfig {
    fn from(config: &PyramidConfig) -> Self {
        Self {
            layer_height: config.width,
            layer_width: config.height,
            layers: config.level_count,
            tile_size: config.top_tile_size(),
            color_map: config
                .color_map
                .iter()
                .map(|(label, color)| SidecarColor {
                    label: label.to_owned(),
                    color,
                })
                .collect(),
        }
    }
}

impl SidecarConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Write `config.json` into `dir`, creating it if needed.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(SIDECAR_FILE_NAME);

        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;

        info!("Wrote {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::PointRow;

    fn table(points: &[(f64, f64)]) -> PointTable {
        PointTable {
            source: PathBuf::from("t.csv"),
            rows: points
                .iter()
                .map(|&(x, y)| PointRow {
                    x,
                    y,
                    label: "a".into(),
                    owner_id: "1".into(),
                })
                .collect(),
        }
    }

    #[test]
    fn plans_from_table() {
        let t = table(&[(10.0, 20.0), (1023.5, 7.0), (f64::NAN, 5000.0)]);
        let config = PyramidConfig::plan(&PlanRequest::default(), &t, ColorMap::default()).unwrap();

        assert_eq!((config.width, config.height), (1024, 21));
        assert_eq!(config.level_count, 1);
        assert_eq!(config.tile_size_at(1), 512);
        assert_eq!(config.tile_size_at(0), 1024);
        assert_eq!(config.grid_at(1), GridDims { tiles_x: 2, tiles_y: 2 });
    }

    #[test]
    fn explicit_request_wins() {
        let t = table(&[(1.0, 1.0)]);
        let request = PlanRequest {
            extent: Some(Extent::new(8192, 4096)),
            base_tile_size: 256,
            level_count: Some(3),
            tile_budget: 16,
        };
        let config = PyramidConfig::plan(&request, &t, ColorMap::default()).unwrap();
        assert_eq!(config.level_count, 3);
        assert_eq!(config.top_tile_size(), 2048);
        assert_eq!(config.grid_at(3), GridDims { tiles_x: 32, tiles_y: 16 });
        assert_eq!(config.grid_at(0), GridDims { tiles_x: 4, tiles_y: 2 });
    }

    #[test]
    fn rejects_bad_configuration() {
        let t = table(&[(1.0, 1.0)]);
        let zero_tile = PlanRequest {
            base_tile_size: 0,
            ..PlanRequest::default()
        };
        assert!(PyramidConfig::plan(&zero_tile, &t, ColorMap::default()).is_err());

        assert!(PyramidConfig::new(Extent::new(0, 10), 512, 1, ColorMap::default()).is_err());
        assert!(PyramidConfig::new(Extent::new(10, 10), 512, 40, ColorMap::default()).is_err());
    }

    #[test]
    fn sidecar_round_trips() {
        let mut colors = ColorMap::default();
        colors.insert("ACTB", [1, 2, 3]);
        let config = PyramidConfig::new(Extent::new(2000, 1000), 512, 2, colors).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let sidecar = SidecarConfig::from(&config);
        let path = sidecar.write(&dir.path().join("out")).unwrap();

        let back = SidecarConfig::load(&path).unwrap();
        assert_eq!(back, sidecar);
        // Non-square on purpose: the axes follow the [y, x] position order.
        assert_eq!(back.layer_height, 2000);
        assert_eq!(back.layer_width, 1000);
        assert_eq!(back.tile_size, 2048);
        assert_eq!(back.color_map[0].label, "ACTB");
    }
}

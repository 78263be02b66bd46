//! Base-level binning: each input row lands in exactly one tile or in the
//! omitted list.

use log::{info, warn};
use ptile::PointRecord;
use rayon::prelude::*;
use serde::Serialize;

use crate::color_map::ColorMap;
use crate::config::PyramidConfig;
use crate::geometry::GridDims;
use crate::grid::TileGrid;
use crate::table::PointRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OmitReason {
    OutOfBounds,
    UnknownLabel,
}

/// A row excluded from the grid, with the tile indices it computed to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OmittedPoint {
    pub owner_id: String,
    pub x: f64,
    pub y: f64,
    pub col: i64,
    pub row: i64,
    pub reason: OmitReason,
}

#[derive(Debug)]
pub struct BinnedLevel {
    pub grid: TileGrid,
    pub omitted: Vec<OmittedPoint>,
}

/// `floor(v / tile_size)`; non-finite input saturates and is rejected by the
/// bounds check.
#[inline]
pub fn tile_index(v: f64, tile_size: u64) -> i64 {
    (v / tile_size as f64).floor() as i64
}

enum Placement {
    Tile(usize, PointRecord),
    Omitted(OmittedPoint),
}

fn place(row: &PointRow, dims: GridDims, tile_size: u64, colors: &ColorMap) -> Placement {
    let col = tile_index(row.x, tile_size);
    let r = tile_index(row.y, tile_size);

    let omitted = |reason| {
        Placement::Omitted(OmittedPoint {
            owner_id: row.owner_id.clone(),
            x: row.x,
            y: row.y,
            col,
            row: r,
            reason,
        })
    };

    if !(row.x.is_finite() && row.y.is_finite()) || !dims.contains(col, r) {
        return omitted(OmitReason::OutOfBounds);
    }

    let Some(color) = colors.get(&row.label) else {
        return omitted(OmitReason::UnknownLabel);
    };

    let index = r as usize * dims.tiles_x as usize + col as usize;
    Placement::Tile(
        index,
        PointRecord::from_xy(row.x, row.y, color, row.label.clone(), row.owner_id.clone()),
    )
}

/// Bin every row into the base grid (`config.level_count`).
///
/// Placement runs in parallel; accumulation is sequential in input order, so
/// the per-tile point order matches the table.
pub fn bin_points(rows: &[PointRow], config: &PyramidConfig) -> BinnedLevel {
    let level = config.level_count;
    let dims = config.grid_at(level);
    let tile_size = config.base_tile_size as u64;
    let mut grid = TileGrid::empty(level, dims);

    let placements: Vec<Placement> = rows
        .par_iter()
        .map(|row| place(row, dims, tile_size, &config.color_map))
        .collect();

    let mut omitted = Vec::new();
    for placement in placements {
        match placement {
            Placement::Tile(index, point) => grid.push_at(index, point),
            Placement::Omitted(point) => omitted.push(point),
        }
    }

    if omitted.is_empty() {
        info!("Binned all {} points into level {}", rows.len(), level);
    } else {
        warn!(
            "{} of {} points have been omitted while binning",
            omitted.len(),
            rows.len()
        );
        for point in omitted.iter().take(10) {
            warn!(
                "  omitted owner={} at ({}, {}) -> tile ({}, {}): {:?}",
                point.owner_id, point.x, point.y, point.col, point.row, point.reason
            );
        }
    }

    BinnedLevel { grid, omitted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Extent;

    fn row(x: f64, y: f64, label: &str) -> PointRow {
        PointRow {
            x,
            y,
            label: label.into(),
            owner_id: format!("{x}:{y}"),
        }
    }

    fn config() -> PyramidConfig {
        let mut colors = ColorMap::default();
        colors.insert("a", [10, 20, 30]);
        // 1024 x 1024 with 512 px base tiles -> 2 x 2 grid at level 1.
        PyramidConfig::new(Extent::new(1024, 1024), 512, 1, colors).unwrap()
    }

    #[test]
    fn edge_points_use_floor() {
        let binned = bin_points(&[row(512.0, 0.0, "a"), row(511.999, 512.0, "a")], &config());
        assert!(binned.omitted.is_empty());
        assert_eq!(binned.grid.get(1, 0).unwrap().len(), 1);
        assert_eq!(binned.grid.get(0, 1).unwrap().len(), 1);
        assert_eq!(binned.grid.get(0, 0).unwrap().len(), 0);
    }

    #[test]
    fn resolves_color_and_swaps_position() {
        let binned = bin_points(&[row(3.0, 700.0, "a")], &config());
        let p = &binned.grid.get(0, 1).unwrap()[0];
        assert_eq!(p.position, [700.0, 3.0]);
        assert_eq!(p.color, [10, 20, 30]);
    }

    #[test]
    fn out_of_bounds_and_unknown_labels_are_omitted() {
        let rows = vec![
            row(-0.5, 10.0, "a"),
            row(1024.0, 10.0, "a"),
            row(10.0, 5000.0, "a"),
            row(f64::NAN, 1.0, "a"),
            row(10.0, 10.0, "nope"),
            row(10.0, 10.0, "a"),
        ];
        let binned = bin_points(&rows, &config());

        assert_eq!(binned.grid.point_count(), 1);
        assert_eq!(binned.omitted.len(), 5);
        assert_eq!(binned.omitted[0].col, -1);
        assert_eq!(binned.omitted[1].col, 2);
        assert_eq!(binned.omitted[2].row, 9);
        assert_eq!(binned.omitted[3].reason, OmitReason::OutOfBounds);
        assert_eq!(binned.omitted[4].reason, OmitReason::UnknownLabel);
    }

    #[test]
    fn binning_partitions_input() {
        let rows: Vec<PointRow> = (0..2000)
            .map(|i| {
                let v = i as f64 * 0.61 - 50.0;
                row(v, (i * 37 % 1100) as f64, if i % 7 == 0 { "b" } else { "a" })
            })
            .collect();
        let binned = bin_points(&rows, &config());
        assert_eq!(binned.grid.point_count() + binned.omitted.len(), rows.len());
    }
}

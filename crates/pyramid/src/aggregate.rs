//! Coarse levels from fine ones: every coarse tile takes a uniform random
//! 20% (rounded down, without replacement) of each of its four children.
//!
//! Sparse children can contribute nothing at all (1-4 points -> 0 drawn), so
//! callers must not assume any coarse tile is non-empty.

use log::debug;
use ptile::{PointRecord, TileKey};
use rand::seq::index;
use rand::Rng;

use crate::geometry::GridDims;
use crate::grid::TileGrid;

/// Points drawn from a child holding `n`: `floor(n * 0.2)`, computed exactly.
#[inline]
pub fn sample_count(n: usize) -> usize {
    n / 5
}

fn sample_child<R: Rng>(points: &[PointRecord], rng: &mut R, out: &mut Vec<PointRecord>) {
    let amount = sample_count(points.len());
    if amount == 0 {
        return;
    }

    out.extend(
        index::sample(rng, points.len(), amount)
            .into_iter()
            .map(|i| points[i].clone()),
    );
}

/// Build level `finer.level - 1` with grid `dims` from `finer`.
///
/// Children outside `finer`'s grid count as empty tiles.
pub fn aggregate_level<R: Rng>(finer: &TileGrid, dims: GridDims, rng: &mut R) -> TileGrid {
    debug_assert!(finer.level > 0, "level 0 has no coarser level");
    let level = finer.level - 1;
    let mut coarse = TileGrid::empty(level, dims);

    let mut missing_children = 0usize;
    for row in 0..dims.tiles_y {
        for col in 0..dims.tiles_x {
            let mut points = Vec::new();

            for child in TileKey::new(level, col, row).children() {
                match finer.get(child.col, child.row) {
                    Some(child_points) => sample_child(child_points, rng, &mut points),
                    None => missing_children += 1,
                }
            }

            coarse.set(col, row, points);
        }
    }

    debug!(
        "Level {}: {} tiles ({}x{}), {} points from {} ({} children outside level {})",
        level,
        dims.tile_count(),
        dims.tiles_x,
        dims.tiles_y,
        coarse.point_count(),
        finer.point_count(),
        missing_children,
        finer.level
    );

    coarse
}

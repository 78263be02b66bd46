//! Tile-grid planning for the pyramid.
//!
//! Grids are always rounded up to an even number of tiles per axis so that
//! every coarse tile has exactly four children one level finer.

/// Image extent in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Number of tiles along each axis of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDims {
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl GridDims {
    #[inline]
    pub fn tile_count(self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    #[inline]
    pub fn contains(self, col: i64, row: i64) -> bool {
        (0..self.tiles_x as i64).contains(&col) && (0..self.tiles_y as i64).contains(&row)
    }
}

/// Tiles used by the pyramid's coarsest level when no level count is given.
pub const DEFAULT_TILE_BUDGET: u64 = 16;

#[inline]
fn even_tiles(extent: u32, tile_size: u64) -> u32 {
    let n = (extent as u64).div_ceil(tile_size);
    let n = n + (n & 1);
    n.min(u32::MAX as u64 - 1) as u32
}

/// `ceil(extent / tile_size)` per axis, bumped to the next even integer.
///
/// `tile_size` must be non-zero; [`crate::PyramidConfig`] validates this.
pub fn plan_grid(extent: Extent, tile_size: u64) -> GridDims {
    GridDims {
        tiles_x: even_tiles(extent.width, tile_size),
        tiles_y: even_tiles(extent.height, tile_size),
    }
}

/// Number of coarser levels above the base grid.
///
/// Starting at depth 1, the tile size doubles per depth until the grid holds
/// at most `tile_budget` tiles. Once the grid has collapsed to its minimum
/// (2x2, or empty) doubling cannot shrink it any further, so that depth is
/// returned even if the budget is below four.
pub fn plan_levels(extent: Extent, tile_size: u64, tile_budget: u64) -> u32 {
    let mut depth = 1u32;
    loop {
        let level_tile_size = tile_size.saturating_mul(1u64 << depth.min(63));
        let grid = plan_grid(extent, level_tile_size);
        let tiles = grid.tiles_x as u64 * grid.tiles_y as u64;

        if tiles <= tile_budget || (grid.tiles_x <= 2 && grid.tiles_y <= 2) {
            return depth;
        }

        depth += 1;
    }
}

use ptile::{PointRecord, TileKey};

use crate::geometry::GridDims;

/// All tiles of one pyramid level, row-major, indexed by `(col, row)`.
/// Empty tiles are present with an empty point list.
#[derive(Debug, Clone)]
pub struct TileGrid {
    pub level: u32,
    pub dims: GridDims,
    tiles: Vec<Vec<PointRecord>>,
}

impl TileGrid {
    pub fn empty(level: u32, dims: GridDims) -> Self {
        Self {
            level,
            dims,
            tiles: vec![Vec::new(); dims.tile_count()],
        }
    }

    #[inline]
    fn index(&self, col: u32, row: u32) -> Option<usize> {
        (col < self.dims.tiles_x && row < self.dims.tiles_y)
            .then(|| row as usize * self.dims.tiles_x as usize + col as usize)
    }

    /// Points of tile `(col, row)`, or `None` outside the grid.
    pub fn get(&self, col: u32, row: u32) -> Option<&[PointRecord]> {
        self.index(col, row).map(|i| self.tiles[i].as_slice())
    }

    pub(crate) fn push_at(&mut self, index: usize, point: PointRecord) {
        self.tiles[index].push(point);
    }

    pub(crate) fn set(&mut self, col: u32, row: u32, points: Vec<PointRecord>) {
        if let Some(i) = self.index(col, row) {
            self.tiles[i] = points;
        }
    }

    pub fn point_count(&self) -> usize {
        self.tiles.iter().map(Vec::len).sum()
    }

    pub fn key(&self, index: usize) -> TileKey {
        let tiles_x = self.dims.tiles_x as usize;
        TileKey::new(self.level, (index % tiles_x) as u32, (index / tiles_x) as u32)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileKey, &[PointRecord])> + '_ {
        self.tiles
            .iter()
            .enumerate()
            .map(move |(i, points)| (self.key(i), points.as_slice()))
    }

    pub(crate) fn tiles(&self) -> &[Vec<PointRecord>] {
        &self.tiles
    }
}

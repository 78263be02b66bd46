//! PTIL: dependency-free tile format for labelled 2D points in image pixel space.
//!
//! - One file per tile of a multi-resolution point pyramid.
//! - Positions are stored `[y, x]` (row-major) as f64, so large pixel
//!   coordinates survive a round trip bit-for-bit.
//! - Owner ids are stored as text, never as a numeric type.
//!
//! File layout (little-endian):
//!   00  : [u8;4]  magic = b"PTIL"
//!   04  : u32     version = 1
//!   08  : u32     flags (bitfield)
//!                 bit 0 => tile key present (12 bytes)
//!   0C  : u32     points_count
//!   ..  : u32[3]  tile key: level, col, row   (if bit0)
//!   ..  : for each point:
//!           f64 y, f64 x
//!           u8 r, u8 g, u8 b
//!           u16 label_len, [label_len bytes UTF-8]
//!           u16 owner_len, [owner_len bytes UTF-8]
//!
//! A tile with no points is exactly the header (16 bytes, 28 with a key).

use std::fs::File;
use std::io::{self, ErrorKind, Write};
use std::path::Path;

pub const PTIL_MAGIC: [u8; 4] = *b"PTIL";
pub const PTIL_VERSION: u32 = 1;

/// Size of the fixed header without the optional tile key.
pub const HEADER_LEN: usize = 16;

/// Size of the optional tile key block.
pub const TILE_KEY_LEN: usize = 12;

const FLAG_TILE_KEY: u32 = 1 << 0;

/// Address of one tile in the pyramid.
///
/// `level` 0 is the coarsest level; the finest level has the largest index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub level: u32,
    pub col: u32,
    pub row: u32,
}

impl TileKey {
    #[inline]
    pub fn new(level: u32, col: u32, row: u32) -> Self {
        Self { level, col, row }
    }

    /// The four children one level finer, always in the same winding:
    /// `(2c, 2r)`, `(2c+1, 2r)`, `(2c+1, 2r+1)`, `(2c, 2r+1)`.
    #[inline]
    pub fn children(self) -> [TileKey; 4] {
        let level = self.level + 1;
        let (c, r) = (self.col * 2, self.row * 2);
        [
            TileKey::new(level, c, r),
            TileKey::new(level, c + 1, r),
            TileKey::new(level, c + 1, r + 1),
            TileKey::new(level, c, r + 1),
        ]
    }
}

/// One encoded point. `position` is `[y, x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub position: [f64; 2],
    pub color: [u8; 3],
    pub label: String,
    pub owner_id: String,
}

impl PointRecord {
    /// Build a record from image-space `(x, y)`, swapping into storage order.
    #[inline]
    pub fn from_xy(x: f64, y: f64, color: [u8; 3], label: String, owner_id: String) -> Self {
        Self {
            position: [y, x],
            color,
            label,
            owner_id,
        }
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.position[1]
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.position[0]
    }

    /// A record can be encoded when its position is finite and both strings
    /// fit a u16 length prefix.
    pub fn is_encodable(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.label.len() <= u16::MAX as usize
            && self.owner_id.len() <= u16::MAX as usize
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        16 + 3 + 2 + self.label.len() + 2 + self.owner_id.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PtileTile {
    pub tile_key: Option<TileKey>,
    pub points: Vec<PointRecord>,
}

/// Output of [`encode_tile`]: the bytes plus the number of records that were
/// dropped because they could not be encoded.
#[derive(Debug, Clone)]
pub struct EncodedTile {
    pub bytes: Vec<u8>,
    pub written: usize,
    pub skipped: usize,
}

#[inline(always)]
fn need(buf: &[u8], want: usize) -> io::Result<()> {
    if buf.len() < want {
        Err(io::Error::new(ErrorKind::UnexpectedEof, "truncated PTIL"))
    } else {
        Ok(())
    }
}

#[inline(always)]
fn take<'a>(buf: &mut &'a [u8], n: usize) -> io::Result<&'a [u8]> {
    need(buf, n)?;
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

#[inline(always)]
fn le_u16(buf: &mut &[u8]) -> io::Result<u16> {
    let b = take(buf, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

#[inline(always)]
fn le_u32(buf: &mut &[u8]) -> io::Result<u32> {
    let b = take(buf, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[inline(always)]
fn le_f64(buf: &mut &[u8]) -> io::Result<f64> {
    let b = take(buf, 8)?;
    Ok(f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
}

#[inline(always)]
fn short_str(buf: &mut &[u8]) -> io::Result<String> {
    let len = le_u16(buf)? as usize;
    let raw = take(buf, len)?;
    String::from_utf8(raw.to_vec()).map_err(|_| bad("string field is not UTF-8"))
}

#[cold]
fn bad(msg: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg)
}

/// Parse PTIL from a contiguous byte slice. This is the single source of truth for parsing.
pub fn parse_tile_bytes(mut p: &[u8]) -> io::Result<PtileTile> {
    if take(&mut p, 4)? != PTIL_MAGIC {
        return Err(bad("bad PTIL magic"));
    }

    let version = le_u32(&mut p)?;
    if version != PTIL_VERSION {
        return Err(bad("unsupported PTIL version"));
    }

    let flags = le_u32(&mut p)?;
    if flags & !FLAG_TILE_KEY != 0 {
        return Err(bad("unknown PTIL flags"));
    }

    let count = le_u32(&mut p)? as usize;

    let tile_key = if flags & FLAG_TILE_KEY != 0 {
        Some(TileKey {
            level: le_u32(&mut p)?,
            col: le_u32(&mut p)?,
            row: le_u32(&mut p)?,
        })
    } else {
        None
    };

    // Each record is at least 23 bytes; reject absurd counts before allocating.
    let min_bytes = count.checked_mul(23).ok_or_else(|| bad("points size overflow"))?;
    need(p, min_bytes)?;

    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        let y = le_f64(&mut p)?;
        let x = le_f64(&mut p)?;
        let rgb = take(&mut p, 3)?;
        let color = [rgb[0], rgb[1], rgb[2]];
        let label = short_str(&mut p)?;
        let owner_id = short_str(&mut p)?;

        points.push(PointRecord {
            position: [y, x],
            color,
            label,
            owner_id,
        });
    }

    if !p.is_empty() {
        return Err(bad("trailing bytes after PTIL records"));
    }

    Ok(PtileTile { tile_key, points })
}

/// Encode a tile. Records that fail [`PointRecord::is_encodable`] are skipped;
/// the header count always matches the records actually written.
pub fn encode_tile(tile: &PtileTile) -> EncodedTile {
    let (keep, skipped): (Vec<&PointRecord>, Vec<&PointRecord>) =
        tile.points.iter().partition(|p| p.is_encodable());

    let body: usize = keep.iter().map(|p| p.encoded_len()).sum();
    let key_len = if tile.tile_key.is_some() { TILE_KEY_LEN } else { 0 };
    let mut out = Vec::with_capacity(HEADER_LEN + key_len + body);

    let flags = if tile.tile_key.is_some() { FLAG_TILE_KEY } else { 0 };

    out.extend_from_slice(&PTIL_MAGIC);
    out.extend_from_slice(&PTIL_VERSION.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&(keep.len() as u32).to_le_bytes());

    if let Some(key) = tile.tile_key {
        out.extend_from_slice(&key.level.to_le_bytes());
        out.extend_from_slice(&key.col.to_le_bytes());
        out.extend_from_slice(&key.row.to_le_bytes());
    }

    for point in &keep {
        out.extend_from_slice(&point.position[0].to_le_bytes());
        out.extend_from_slice(&point.position[1].to_le_bytes());
        out.extend_from_slice(&point.color);
        out.extend_from_slice(&(point.label.len() as u16).to_le_bytes());
        out.extend_from_slice(point.label.as_bytes());
        out.extend_from_slice(&(point.owner_id.len() as u16).to_le_bytes());
        out.extend_from_slice(point.owner_id.as_bytes());
    }

    EncodedTile {
        bytes: out,
        written: keep.len(),
        skipped: skipped.len(),
    }
}

/// Fast path: prefer mmap; fall back to a single read.
#[cfg(feature = "mmap")]
pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<PtileTile> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        // Zero-length maps are rejected on some platforms.
        return parse_tile_bytes(&[]);
    }
    let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
    parse_tile_bytes(&map)
}

#[cfg(not(feature = "mmap"))]
pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<PtileTile> {
    let bytes = std::fs::read(path)?;
    parse_tile_bytes(&bytes)
}

/// Write a tile to `path`, returning the number of records skipped.
pub fn write_file<P: AsRef<Path>>(path: P, tile: &PtileTile) -> io::Result<usize> {
    let encoded = encode_tile(tile);

    let mut file = File::create(path)?;
    file.write_all(&encoded.bytes)?;
    file.flush()?;

    Ok(encoded.skipped)
}

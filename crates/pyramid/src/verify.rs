//! Rebuild the point table from the finest persisted level and reconcile it
//! against the source table.
//!
//! The reconciliation is a multiset full outer join on `(x, y, label,
//! owner_id)` with exact equality. Rows only in the source are *missing*,
//! rows only in the tiles are *invalid*.

use std::collections::HashMap;
use std::path::Path;

use log::{info, warn};
use ptile::PointRecord;
use serde::Serialize;

use crate::error::Result;
use crate::store::{finest_level, load_level};
use crate::table::PointRow;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct JoinKey {
    x: u64,
    y: u64,
    label: String,
    owner_id: String,
}

/// Bit pattern used for exact float comparison; `-0.0` equals `0.0`.
#[inline]
fn coord_bits(v: f64) -> u64 {
    if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

impl JoinKey {
    fn new(x: f64, y: f64, label: &str, owner_id: &str) -> Self {
        Self {
            x: coord_bits(x),
            y: coord_bits(y),
            label: label.to_owned(),
            owner_id: owner_id.to_owned(),
        }
    }
}

/// A row listed in the report as an example of a discrepancy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListedPoint {
    pub x: f64,
    pub y: f64,
    pub label: String,
    pub owner_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reconciliation {
    pub missing: usize,
    pub invalid: usize,
    pub missing_examples: Vec<ListedPoint>,
    pub invalid_examples: Vec<ListedPoint>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.missing == 0 && self.invalid == 0
    }
}

/// Full outer join of `source` and `rebuilt`; `rebuilt` positions are `[y, x]`.
/// At most `max_listed` examples are kept per category.
pub fn reconcile(
    source: &[PointRow],
    rebuilt: &[PointRecord],
    max_listed: usize,
) -> Reconciliation {
    // Positive: more copies in the source. Negative: more copies in the tiles.
    let mut balance: HashMap<JoinKey, i64> = HashMap::with_capacity(source.len());

    for row in source {
        *balance
            .entry(JoinKey::new(row.x, row.y, &row.label, &row.owner_id))
            .or_default() += 1;
    }

    for point in rebuilt {
        *balance
            .entry(JoinKey::new(point.x(), point.y(), &point.label, &point.owner_id))
            .or_default() -= 1;
    }

    let mut result = Reconciliation::default();
    for (key, count) in balance {
        if count == 0 {
            continue;
        }

        let listed = ListedPoint {
            x: f64::from_bits(key.x),
            y: f64::from_bits(key.y),
            label: key.label,
            owner_id: key.owner_id,
        };

        if count > 0 {
            result.missing += count as usize;
            result.missing_examples.push(listed);
        } else {
            result.invalid += count.unsigned_abs() as usize;
            result.invalid_examples.push(listed);
        }
    }

    for examples in [&mut result.missing_examples, &mut result.invalid_examples] {
        examples.sort_by(|a, b| {
            a.label
                .cmp(&b.label)
                .then_with(|| a.owner_id.cmp(&b.owner_id))
                .then_with(|| a.x.total_cmp(&b.x))
                .then_with(|| a.y.total_cmp(&b.y))
        });
        examples.truncate(max_listed);
    }

    result
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub finest_level: u32,
    pub source_points: usize,
    pub rebuilt_points: usize,
    pub tiles_read: usize,
    pub unreadable_tiles: usize,
    #[serde(flatten)]
    pub reconciliation: Reconciliation,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.unreadable_tiles == 0 && self.reconciliation.is_clean()
    }
}

/// Verify the pyramid rooted at `tiles_root` against `source`.
pub fn verify_pyramid(
    source: &[PointRow],
    tiles_root: &Path,
    max_listed: usize,
) -> Result<VerifyReport> {
    let level = finest_level(tiles_root)?;
    info!("Finest level under {}: {}", tiles_root.display(), level);

    let loaded = load_level(tiles_root, level)?;
    info!(
        "Successfully loaded {} points from {} tiles",
        loaded.points.len(),
        loaded.tiles_read
    );

    let reconciliation = reconcile(source, &loaded.points, max_listed);

    let report = VerifyReport {
        finest_level: level,
        source_points: source.len(),
        rebuilt_points: loaded.points.len(),
        tiles_read: loaded.tiles_read,
        unreadable_tiles: loaded.unreadable.len(),
        reconciliation,
    };

    if report.reconciliation.is_clean() {
        info!("No discrepancies have been found");
    } else {
        warn!("Discrepancies in data have been found");
        warn!("Number of invalid points: {}", report.reconciliation.invalid);
        warn!("Number of missing points: {}", report.reconciliation.missing);
    }
    if report.unreadable_tiles > 0 {
        warn!("{} tile files could not be parsed", report.unreadable_tiles);
    }

    Ok(report)
}

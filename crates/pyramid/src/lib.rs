//! Multi-resolution tile pyramids for very large point overlays.
//!
//! A flat table of labelled points in image pixel space is binned into a base
//! tile grid, then every coarser level is derived from the level below by
//! 2x2 quad-merge and random subsampling. Tiles are persisted as PTIL files
//! (see the `ptile` crate) under `{root}/{level}/{col}/{row}.bin`, where the
//! largest level number is the finest level. [`verify_pyramid`] reloads the
//! finest level and reconciles it against the source table.

pub mod aggregate;
pub mod binner;
pub mod build;
pub mod color_map;
pub mod config;
mod csv_text;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod store;
pub mod table;
pub mod verify;

pub use aggregate::aggregate_level;
pub use binner::{bin_points, BinnedLevel, OmitReason, OmittedPoint};
pub use build::{build_pyramid, input_name, pyramid_root, BuildOptions, BuildSummary, LevelSummary};
pub use color_map::ColorMap;
pub use config::{PlanRequest, PyramidConfig, SidecarConfig};
pub use error::{PyramidError, Result};
pub use geometry::{plan_grid, plan_levels, Extent, GridDims};
pub use grid::TileGrid;
pub use table::{read_point_table, PointRow, PointTable};
pub use verify::{reconcile, verify_pyramid, Reconciliation, VerifyReport};

pub use ptile::{PointRecord, TileKey};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use rand::{rngs::StdRng, SeedableRng};
use std::path::{Path, PathBuf};

use pyramid::{
    build_pyramid, geometry::DEFAULT_TILE_BUDGET, input_name, pyramid_root, read_point_table,
    BuildOptions, ColorMap, Extent, PlanRequest, PointTable, PyramidConfig,
};

/// Convert a point table into a PTIL tile pyramid plus its `config.json`.
#[derive(Parser, Debug, Clone)]
#[command(name = "csv2ptile", version)]
struct Args {
    /// Input table (.csv, or a .zip containing one).
    #[arg(long)]
    input: PathBuf,

    /// Directory in which the `{input_name}` pyramid directory is created.
    /// Defaults to the input file's directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Optional `gene,color` table of `#RRGGBB` colors; random colors otherwise.
    #[arg(long)]
    color_map: Option<PathBuf>,

    /// Fail instead of generating colors when --color-map holds no entries.
    #[arg(long, default_value_t = false)]
    strict_color_map: bool,

    /// Image width in pixels (derived from the points if not set).
    #[arg(long, requires = "height")]
    width: Option<u32>,

    /// Image height in pixels (derived from the points if not set).
    #[arg(long, requires = "width")]
    height: Option<u32>,

    /// Tile size in pixels at the finest level.
    #[arg(long, default_value_t = pyramid::config::DEFAULT_TILE_SIZE)]
    tile_size: u32,

    /// Number of levels above the finest one (planned from --tile-budget if not set).
    #[arg(long)]
    levels: Option<u32>,

    /// Maximum tile count of the coarsest level when planning levels.
    #[arg(long, default_value_t = DEFAULT_TILE_BUDGET)]
    tile_budget: u64,

    /// Seed for subsampling and color generation, for reproducible output.
    #[arg(long)]
    seed: Option<u64>,

    /// Log the planned geometry and exit without writing anything.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn resolve_color_map(args: &Args, table: &PointTable, rng: &mut StdRng) -> Result<ColorMap> {
    let Some(path) = &args.color_map else {
        return Ok(ColorMap::generate(table.labels(), rng));
    };

    match ColorMap::from_csv(path)
        .with_context(|| format!("loading color map {}", path.display()))?
    {
        Some(map) => Ok(map),
        None if args.strict_color_map => bail!("color map {} has no entries", path.display()),
        None => {
            warn!("Falling back to randomly generated colors");
            Ok(ColorMap::generate(table.labels(), rng))
        }
    }
}

fn log_plan(config: &PyramidConfig) {
    let base = config.grid_at(config.level_count);
    let top = config.grid_at(0);

    info!(
        "Final configuration:\n  \
         Image resolution: {} x {}\n  \
         Finest level {}: tile size {}, tiles X {} | Y {}\n  \
         Coarsest level 0: tile size {}, tiles X {} | Y {}\n  \
         Colors: {}",
        config.width,
        config.height,
        config.level_count,
        config.base_tile_size,
        base.tiles_x,
        base.tiles_y,
        config.top_tile_size(),
        top.tiles_x,
        top.tiles_y,
        config.color_map.len()
    );
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let output_dir = match &args.output_dir {
        Some(dir) => dir.clone(),
        None => args
            .input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf(),
    };

    // Configuration errors are fatal before any output is written.
    let name = input_name(&args.input)?;
    let root = pyramid_root(&output_dir, &name)?;

    let table = read_point_table(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let color_map = resolve_color_map(&args, &table, &mut rng)?;

    let request = PlanRequest {
        extent: args.width.zip(args.height).map(|(w, h)| Extent::new(w, h)),
        base_tile_size: args.tile_size,
        level_count: args.levels,
        tile_budget: args.tile_budget,
    };
    let config = PyramidConfig::plan(&request, &table, color_map)?;
    log_plan(&config);

    if args.dry_run {
        info!("Dry run: nothing written (would write to {})", root.display());
        return Ok(());
    }

    let options = BuildOptions {
        seed: args.seed.map(|s| s.wrapping_add(1)),
    };
    let summary = build_pyramid(&table, &config, &root, &options)?;

    for level in &summary.levels {
        info!(
            "  level {:>2}: {:>4} x {:<4} tiles of {:>6} px, {} points",
            level.level, level.tiles_x, level.tiles_y, level.tile_size, level.points
        );
    }

    if summary.omitted > 0 {
        warn!("{} points omitted", summary.omitted);
    }
    if summary.skipped_records() > 0 {
        warn!("{} records skipped while encoding", summary.skipped_records());
    }

    info!("Conversion finished: {}", summary.output_dir.display());
    Ok(())
}

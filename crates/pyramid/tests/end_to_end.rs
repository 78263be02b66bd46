use std::fs;
use std::path::Path;

use pyramid::{
    build_pyramid, input_name, pyramid_root, read_point_table, store, verify_pyramid, BuildOptions,
    ColorMap, PlanRequest, PyramidConfig, SidecarConfig,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn write_csv(path: &Path, n: usize, extent: f64, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut text = String::from(",x_pixel_coordinate,y_pixel_coordinate,gene_name,cell_id\n");
    for i in 0..n {
        let x: f64 = rng.gen_range(0.0..extent);
        let y: f64 = rng.gen_range(0.0..extent);
        let gene = ["ACTB", "GAPDH", "CD3E", "MS4A1"][i % 4];
        text.push_str(&format!("{i},{x},{y},{gene},{}\n", 1_000_000_000_000u64 + i as u64));
    }
    fs::write(path, text).unwrap();
}

#[test]
fn build_then_verify_reports_no_discrepancies() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("transcripts.csv");
    write_csv(&input, 1000, 1024.0, 42);

    let table = read_point_table(&input).unwrap();
    let colors = ColorMap::generate(table.labels(), &mut StdRng::seed_from_u64(1));

    let request = PlanRequest {
        extent: Some(pyramid::Extent::new(1024, 1024)),
        base_tile_size: 512,
        level_count: None,
        tile_budget: 16,
    };
    let config = PyramidConfig::plan(&request, &table, colors).unwrap();
    assert_eq!(config.level_count, 1);

    let root = pyramid_root(dir.path(), &input_name(&input).unwrap()).unwrap();
    let summary = build_pyramid(&table, &config, &root, &BuildOptions::default()).unwrap();
    assert_eq!(summary.omitted, 0);
    assert_eq!(summary.levels[0].points, 1000);

    let sidecar = SidecarConfig::load(&root.join("config.json")).unwrap();
    assert_eq!(sidecar.layers, 1);
    assert_eq!(sidecar.tile_size, 1024);
    assert_eq!(sidecar.color_map.len(), 4);

    assert_eq!(store::finest_level(&root).unwrap(), 1);

    let report = verify_pyramid(&table.rows, &root, 10).unwrap();
    assert_eq!(report.finest_level, 1);
    assert_eq!(report.reconciliation.missing, 0);
    assert_eq!(report.reconciliation.invalid, 0);
    assert_eq!(report.rebuilt_points, 1000);
    assert!(report.is_clean());
}

#[test]
fn tampered_tiles_are_detected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("cells.csv");
    write_csv(&input, 300, 2000.0, 7);

    let table = read_point_table(&input).unwrap();
    let colors = ColorMap::generate(table.labels(), &mut StdRng::seed_from_u64(2));
    let config = PyramidConfig::plan(&PlanRequest::default(), &table, colors).unwrap();

    let root = pyramid_root(dir.path(), "cells").unwrap();
    build_pyramid(&table, &config, &root, &BuildOptions { seed: Some(3) }).unwrap();

    // Replace one base tile with a single foreign point.
    let finest = store::finest_level(&root).unwrap();
    let key = pyramid::TileKey::new(finest, 0, 0);
    let original = ptile::read_file(store::tile_path(&root, key)).unwrap();
    let tampered = ptile::PtileTile {
        tile_key: Some(key),
        points: vec![pyramid::PointRecord::from_xy(
            1.0,
            1.0,
            [0, 0, 0],
            "ACTB".into(),
            "not-a-cell".into(),
        )],
    };
    ptile::write_file(store::tile_path(&root, key), &tampered).unwrap();

    let report = verify_pyramid(&table.rows, &root, 5).unwrap();
    assert_eq!(report.reconciliation.missing, original.points.len());
    assert_eq!(report.reconciliation.invalid, 1);
    assert!(!report.is_clean());
}

//! Tests for polygon loading, the spatial join and the region map cache

use ndarray::array;
use regionagg::{
    config::EngineConfig,
    errors::RegionAggError,
    message::Grid,
    region::{cache_path, normalize_longitude, CountryPolygons, RegionMapBuilder},
};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// AAA: lon 0..10, lat 0..10 (listed first)
/// BBB: lon -10..0, lat 0..10 (shares the lon 0 edge with AAA)
/// -99: lon 20..30, lat 0..10 (disputed territory, numeric code)
/// CCC: multipolygon with one part at lon 40..50, lat 0..10
const COUNTRIES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"ADM0_A3": "AAA", "ISO_A3": "AAA"},
     "geometry": {"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
    {"type": "Feature", "properties": {"ADM0_A3": "BBB", "ISO_A3": "-99"},
     "geometry": {"type": "Polygon", "coordinates": [[[-10,0],[0,0],[0,10],[-10,10],[-10,0]]]}},
    {"type": "Feature", "properties": {"ADM0_A3": -99, "ISO_A3": -99},
     "geometry": {"type": "Polygon", "coordinates": [[[20,0],[30,0],[30,10],[20,10],[20,0]]]}},
    {"type": "Feature", "properties": {"ADM0_A3": "CCC", "ISO_A3": "CCC"},
     "geometry": {"type": "MultiPolygon",
                  "coordinates": [[[[40,0],[50,0],[50,10],[40,10],[40,0]]]]}},
    {"type": "Feature", "properties": {"ADM0_A3": "PNT"},
     "geometry": {"type": "Point", "coordinates": [60, 5]}},
    {"type": "Feature", "properties": {"ADM0_A3": "NUL"}, "geometry": null}
  ]
}"#;

fn write_countries(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("countries.geojson");
    fs::write(&path, COUNTRIES).expect("Failed to write polygons");
    path
}

/// Row 0 at lat 5: AAA, -99, BBB (lon 355), AAA/BBB edge (lon 0), CCC
/// Row 1 at lat -50: ocean everywhere
fn test_grid() -> Grid {
    Grid::from_axes(&array![5.0, -50.0], &array![5.0, 25.0, 355.0, 0.0, 45.0])
}

#[test]
fn test_normalize_longitude() {
    assert_eq!(normalize_longitude(355.0), -5.0);
    assert_eq!(normalize_longitude(180.0), 180.0);
    assert_eq!(normalize_longitude(-170.0), -170.0);
    assert_eq!(normalize_longitude(0.0), 0.0);
}

#[test]
fn test_parse_geojson() {
    let polygons = CountryPolygons::from_geojson_str(COUNTRIES, "ADM0_A3").unwrap();
    // the point and null geometries are skipped
    assert_eq!(polygons.len(), 4);
    assert_eq!(polygons.features()[2].code.as_deref(), Some("-99"));

    assert_eq!(polygons.locate(5.0, 5.0).and_then(|p| p.code.as_deref()), Some("AAA"));
    assert_eq!(polygons.locate(45.0, 5.0).and_then(|p| p.code.as_deref()), Some("CCC"));
    assert!(polygons.locate(100.0, 5.0).is_none());
    // boundary points are inside; the first feature wins
    assert_eq!(polygons.locate(0.0, 5.0).and_then(|p| p.code.as_deref()), Some("AAA"));
    assert_eq!(polygons.locate(-10.0, 0.0).and_then(|p| p.code.as_deref()), Some("BBB"));
}

#[test]
fn test_parse_geojson_rejects_bad_documents() {
    assert!(CountryPolygons::from_geojson_str("not json", "ADM0_A3").is_err());
    let err = CountryPolygons::from_geojson_str(r#"{"type": "Feature"}"#, "ADM0_A3").unwrap_err();
    assert!(matches!(err, RegionAggError::PolygonDataset { .. }));
}

#[test]
fn test_build_region_map() {
    let dir = tempdir().expect("Failed to create temp dir");
    let config = EngineConfig::default()
        .with_polygon_path(write_countries(dir.path()))
        .with_cache_dir(dir.path());

    let map = RegionMapBuilder::new(&config).build(&test_grid()).unwrap();
    assert_eq!(map.dim(), (2, 5));
    assert_eq!(map.code_at(0, 0), Some("AAA"));
    assert_eq!(map.code_at(0, 1), Some("XXX"));
    assert_eq!(map.code_at(0, 2), Some("BBB"));
    assert_eq!(map.code_at(0, 3), Some("AAA"));
    assert_eq!(map.code_at(0, 4), Some("CCC"));
    assert!((0..5).all(|j| map.code_at(1, j) == Some("XXX")));
    assert_eq!(map.regions(), &["AAA", "BBB", "CCC"]);
}

#[test]
fn test_string_sentinel_is_unassigned() {
    let dir = tempdir().expect("Failed to create temp dir");
    let config = EngineConfig::default()
        .with_polygon_path(write_countries(dir.path()))
        .with_code_field("ISO_A3")
        .with_cache_dir(dir.path());

    let map = RegionMapBuilder::new(&config).build(&test_grid()).unwrap();
    // BBB carries "-99" under ISO_A3, so its lon 355 cell is unassigned
    assert_eq!(map.code_at(0, 2), Some("XXX"));
    assert_eq!(map.code_at(0, 0), Some("AAA"));
    assert!(!map.codes().iter().any(|c| c == "-99"));
}

#[test]
fn test_build_is_deterministic() {
    let dir = tempdir().expect("Failed to create temp dir");
    let config = EngineConfig::default()
        .with_polygon_path(write_countries(dir.path()))
        .with_cache_dir(dir.path());
    let builder = RegionMapBuilder::new(&config);

    let first = builder.build(&test_grid()).unwrap();
    let second = builder.build(&test_grid()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_cache_round_trip() {
    let dir = tempdir().expect("Failed to create temp dir");
    let polygons = write_countries(dir.path());
    let config = EngineConfig::default()
        .with_polygon_path(&polygons)
        .with_cache_dir(dir.path().join("cache"));
    let grid = test_grid();

    let built = RegionMapBuilder::new(&config).load_or_build(&grid).unwrap();
    let cache = cache_path(&dir.path().join("cache"), (2, 5));
    assert!(cache.exists());
    assert!(cache.ends_with("region_map_2x5.json"));

    // without the polygons the map can only come from the cache
    fs::remove_file(&polygons).unwrap();
    let loaded = RegionMapBuilder::new(&config).load_or_build(&grid).unwrap();
    assert_eq!(built, loaded);
}

#[test]
fn test_corrupt_cache_is_rebuilt() {
    let dir = tempdir().expect("Failed to create temp dir");
    let config = EngineConfig::default()
        .with_polygon_path(write_countries(dir.path()))
        .with_cache_dir(dir.path());
    let cache = cache_path(dir.path(), (2, 5));
    fs::write(&cache, "{ truncated").unwrap();

    let map = RegionMapBuilder::new(&config).load_or_build(&test_grid()).unwrap();
    assert_eq!(map.code_at(0, 0), Some("AAA"));

    let reloaded = RegionMapBuilder::new(&config).load_or_build(&test_grid()).unwrap();
    assert_eq!(map, reloaded);
}

#[test]
fn test_stride_builds_on_subsampled_grid() {
    let dir = tempdir().expect("Failed to create temp dir");
    let config = EngineConfig::default()
        .with_polygon_path(write_countries(dir.path()))
        .with_cache_dir(dir.path())
        .with_stride(2);

    let map = RegionMapBuilder::new(&config).load_or_build(&test_grid()).unwrap();
    // rows 0, columns 0, 2 and 4 of the full grid
    assert_eq!(map.dim(), (1, 3));
    assert_eq!(map.stride(), 2);
    assert_eq!(map.code_at(0, 0), Some("AAA"));
    assert_eq!(map.code_at(0, 1), Some("BBB"));
    assert_eq!(map.code_at(0, 2), Some("CCC"));
    assert!(cache_path(dir.path(), (1, 3)).exists());
}

#[test]
fn test_missing_polygon_dataset() {
    let dir = tempdir().expect("Failed to create temp dir");
    let config = EngineConfig::default()
        .with_polygon_path(dir.path().join("nowhere.geojson"))
        .with_cache_dir(dir.path());

    let err = RegionMapBuilder::new(&config).load_or_build(&test_grid()).unwrap_err();
    assert!(matches!(err, RegionAggError::PolygonDatasetMissing { .. }));
    assert!(!cache_path(dir.path(), (2, 5)).exists());
}

#[test]
fn test_config_validation() {
    assert!(EngineConfig::default().validate().is_ok());
    assert!(EngineConfig::default().with_stride(0).validate().is_err());
    assert!(EngineConfig::default().with_code_field(" ").validate().is_err());
    assert!(EngineConfig::default().with_unassigned_code("").validate().is_err());
}

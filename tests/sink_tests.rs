//! Tests for the table and append-mode output sinks

use chrono::{TimeZone, Utc};
use regionagg::{
    aggregate::{AggregateRecord, CellRecord},
    config::OutputMode,
    message::VariableCode,
    sink::{table::TABLE_HEADER, AppendSink, Layout, OutputSink, TableSink},
};
use std::fs;
use tempfile::tempdir;

fn record(month: u32, region: &str, code: &str, value: f64) -> AggregateRecord {
    AggregateRecord {
        valid_time: Utc.with_ymd_and_hms(2021, month, 1, 0, 0, 0).unwrap(),
        forecast_step: 0,
        region: region.to_string(),
        variable: VariableCode::from(code),
        value,
        cells: 1,
    }
}

#[test]
fn test_layout_for_mode() {
    assert_eq!(Layout::for_mode(OutputMode::Table), None);
    assert_eq!(Layout::for_mode(OutputMode::RegionDetail), Some(Layout::RegionDetail));
    assert_eq!(Layout::for_mode(OutputMode::RegionMeans), Some(Layout::RegionMeans));
    assert_eq!(Layout::for_mode(OutputMode::VariableMeans), Some(Layout::VariableMeans));
    assert!(!OutputMode::Table.is_streaming());
    assert!(OutputMode::RegionDetail.is_streaming());
    assert_eq!("region-means".parse::<OutputMode>().unwrap(), OutputMode::RegionMeans);
    assert!("monthly".parse::<OutputMode>().is_err());
}

#[test]
fn test_layout_file_names() {
    assert_eq!(Layout::RegionDetail.file_name("FRA"), "era5_monthly_FRA.csv");
    assert_eq!(Layout::RegionMeans.file_name("FRA"), "region_means_FRA.csv");
    assert_eq!(Layout::VariableMeans.file_name("10si"), "country_avg_10si.csv");
    assert_eq!(Layout::VariableMeans.file_name("Total_Precip"), "country_avg_totalprecip.csv");
    assert_eq!(Layout::RegionMeans.file_name("../x"), "region_means____x.csv");
}

#[test]
fn test_table_sink_csv() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("out").join("country_variable_averages.csv");

    let mut sink = TableSink::new().with_precision(Some(2));
    sink.write_records(&[record(1, "FRA", "2t", 280.0 + 1.0 / 3.0)]).unwrap();
    sink.write_records(&[record(2, "DEU", "10si", 4.5)]).unwrap();
    sink.finish().unwrap();
    assert_eq!(sink.len(), 2);

    sink.write_csv(&path).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], TABLE_HEADER);
    assert_eq!(lines[1], "2021-01-01 00:00:00,0,FRA,2t,280.33");
    assert_eq!(lines[2], "2021-02-01 00:00:00,0,DEU,10si,4.50");
    assert_eq!(lines.len(), 3);

    // rewriting replaces the table
    sink.write_csv(&path).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);
}

#[test]
fn test_append_sink_writes_header_once() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut sink = AppendSink::new(dir.path(), Layout::RegionMeans).unwrap();

    sink.write_records(&[record(1, "FRA", "2t", 280.5)]).unwrap();
    sink.write_records(&[record(2, "FRA", "2t", 281.5)]).unwrap();
    assert_eq!(sink.open_targets(), 1);
    sink.finish().unwrap();
    assert_eq!(sink.open_targets(), 0);

    let path = sink.target_path("FRA");
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(
        text,
        "year,month,variable_shortname,value\n2021,1,2t,280.5\n2021,2,2t,281.5\n"
    );

    // a later run appends to the existing file without a second header
    let mut again = AppendSink::new(dir.path(), Layout::RegionMeans).unwrap();
    again.write_records(&[record(3, "FRA", "2t", 282.5)]).unwrap();
    again.finish().unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 4);
    assert_eq!(text.matches("year,month").count(), 1);
}

#[test]
fn test_codes_sharing_a_file_name_share_one_target() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut sink = AppendSink::new(dir.path(), Layout::RegionMeans).unwrap();

    sink.write_records(&[record(1, "A.B", "2t", 1.0), record(1, "A/B", "2t", 2.0)])
        .unwrap();
    assert_eq!(sink.open_targets(), 1);
    sink.finish().unwrap();
    assert_eq!(sink.targets_opened(), 1);

    let text = fs::read_to_string(dir.path().join("region_means_A_B.csv")).unwrap();
    assert_eq!(
        text,
        "year,month,variable_shortname,value\n2021,1,2t,1\n2021,1,2t,2\n"
    );
}

#[test]
fn test_append_sink_variable_layout() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut sink = AppendSink::new(dir.path(), Layout::VariableMeans).unwrap();
    sink.write_records(&[
        record(1, "FRA", "10si", 3.0),
        record(1, "DEU", "10si", 4.0),
        record(1, "FRA", "2t", 280.0),
    ])
    .unwrap();
    sink.finish().unwrap();
    assert_eq!(sink.targets_opened(), 2);

    let wind = fs::read_to_string(dir.path().join("country_avg_10si.csv")).unwrap();
    assert_eq!(
        wind,
        "year,month,country_code,value\n2021,1,FRA,3\n2021,1,DEU,4\n"
    );
    assert!(dir.path().join("country_avg_2t.csv").exists());
}

#[test]
fn test_region_detail_ignores_means() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut sink = AppendSink::new(dir.path(), Layout::RegionDetail).unwrap();
    assert!(sink.wants_cells());

    sink.write_records(&[record(1, "FRA", "2t", 280.0)]).unwrap();
    assert_eq!(sink.targets_opened(), 0);

    sink.write_cells(&[CellRecord {
        valid_time: Utc.with_ymd_and_hms(2021, 7, 1, 0, 0, 0).unwrap(),
        region: "FRA".into(),
        variable: VariableCode::WindSpeed,
        lat: 47.5,
        lon: 2.25,
        value: 3.5,
    }])
    .unwrap();
    sink.finish().unwrap();

    let text = fs::read_to_string(dir.path().join("era5_monthly_FRA.csv")).unwrap();
    assert_eq!(
        text,
        "year,month,variable_shortname,lat,long,value\n2021,7,10si,47.5,2.25,3.5\n"
    );
}

#[test]
fn test_append_sink_flushes_on_drop() {
    let dir = tempdir().expect("Failed to create temp dir");
    {
        let mut sink = AppendSink::new(dir.path(), Layout::RegionMeans).unwrap();
        sink.write_records(&[record(1, "ITA", "sde", 0.25)]).unwrap();
    }
    let text = fs::read_to_string(dir.path().join("region_means_ITA.csv")).unwrap();
    assert_eq!(text.lines().nth(1), Some("2021,1,sde,0.25"));
}

//! Aggregation of cache segments and in-memory compression


use std::fs;
use std::path::PathBuf;

use chronofetch::chronofetch_core::schema::DataType;
use chronofetch::chronofetch_core::table::{Column, ColumnData, Table};
use chronofetch::chronofetch_exec::aggregate::{order_cache_files, Aggregator};
use chronofetch::chronofetch_exec::compress::{compress_column, compress_table};
use chronofetch::chronofetch_io::segment::write_segment;
use chronofetch::chronofetch_io::RunLog;
use tempfile::TempDir;
use test_data_gen::{read_lines, time_table};

fn write(dir: &TempDir, name: &str, table: &Table) -> PathBuf {
    let path = dir.path().join(name);
    write_segment(&path, table).expect("write segment");
    path
}

fn timestamps(table: &Table, column: &str) -> Vec<String> {
    let col = table.column(column).expect("column present");
    (0..table.num_rows())
        .map(|i| col.data.value_string(i).unwrap_or_default())
        .collect()
}

#[test]
fn test_order_cache_files() {
    let mut files = vec![
        PathBuf::from("c/p_2024-01-15T08_2024-01-15T12.seg"),
        PathBuf::from("c/p_2024-01-15T00_2024-01-15T04.seg"),
        PathBuf::from("c/p_2024-01-15T04_2024-01-15T08.seg"),
    ];
    order_cache_files(&mut files, true);
    assert!(files[0].to_string_lossy().contains("T00_"));
    assert!(files[2].to_string_lossy().contains("T08_"));

    order_cache_files(&mut files, false);
    assert!(files[0].to_string_lossy().contains("T08_"));
}

#[test]
fn test_sorted_across_files() {
    let dir = TempDir::new().expect("tempdir");
    let t1 = "2024-01-15T01:00:00Z";
    let t2 = "2024-01-15T02:00:00Z";
    let t3 = "2024-01-15T03:00:00Z";
    let files = vec![
        write(&dir, "a.seg", &time_table(&[t2])),
        write(&dir, "b.seg", &time_table(&[t1])),
        write(&dir, "c.seg", &time_table(&[t3])),
    ];
    let log = RunLog::disabled();

    let asc = Aggregator::new(&log, "timestamp", true)
        .aggregate(&files)
        .expect("aggregate");
    assert_eq!(
        timestamps(&asc, "timestamp"),
        vec![
            "2024-01-15T01:00:00.000Z",
            "2024-01-15T02:00:00.000Z",
            "2024-01-15T03:00:00.000Z"
        ]
    );
    assert_eq!(asc.column("timestamp").map(|c| c.data.data_type()), Some(DataType::Timestamp));

    let desc = Aggregator::new(&log, "timestamp", false)
        .aggregate(&files)
        .expect("aggregate");
    assert_eq!(timestamps(&desc, "timestamp")[0], "2024-01-15T03:00:00.000Z");
}

#[test]
fn test_fallback_sort_column() {
    let dir = TempDir::new().expect("tempdir");
    let files = vec![write(
        &dir,
        "a.seg",
        &time_table(&["2024-01-15 05:00:00", "2024-01-15 04:00:00.250"]),
    )];
    let log = RunLog::disabled();
    let table = Aggregator::new(&log, "@timestamp", true)
        .aggregate(&files)
        .expect("aggregate");
    assert_eq!(
        timestamps(&table, "timestamp"),
        vec!["2024-01-15T04:00:00.250Z", "2024-01-15T05:00:00.000Z"]
    );
}

#[test]
fn test_no_sort_column_keeps_order() {
    let dir = TempDir::new().expect("tempdir");
    let table = Table::new(vec![Column::new(
        "name",
        vec![Some("z".to_string()), Some("a".to_string())],
    )])
    .expect("table");
    let files = vec![write(&dir, "a.seg", &table)];
    let log = RunLog::disabled();
    let out = Aggregator::new(&log, "missing", true)
        .aggregate(&files)
        .expect("aggregate");
    assert_eq!(out, table);
}

#[test]
fn test_unparseable_time_fails() {
    let dir = TempDir::new().expect("tempdir");
    let files = vec![write(&dir, "a.seg", &time_table(&["yesterday"]))];
    let log = RunLog::disabled();
    let err = Aggregator::new(&log, "timestamp", true)
        .aggregate(&files)
        .expect_err("bad timestamp");
    assert!(err.to_string().contains("yesterday"));
}

#[test]
fn test_missing_and_empty_files_skipped() {
    let dir = TempDir::new().expect("tempdir");
    let present = write(&dir, "a.seg", &time_table(&["2024-01-15T01:00:00Z"]));
    let empty = dir.path().join("empty.seg");
    fs::write(&empty, b"").expect("empty file");
    let no_rows = write(&dir, "none.seg", &Table::empty());
    let missing = dir.path().join("missing.seg");

    let log = RunLog::disabled();
    let out = Aggregator::new(&log, "timestamp", true)
        .aggregate(&[missing, empty, present, no_rows])
        .expect("aggregate");
    assert_eq!(out.num_rows(), 1);
}

#[test]
fn test_many_files_in_batches() {
    let dir = TempDir::new().expect("tempdir");
    let files: Vec<PathBuf> = (0..25)
        .map(|i| {
            let t = format!("2024-01-15T{:02}:00:00Z", i % 24);
            write(&dir, &format!("{i:02}.seg"), &time_table(&[&t, &t]))
        })
        .collect();
    let log = RunLog::disabled();
    let out = Aggregator::new(&log, "timestamp", true)
        .aggregate(&files)
        .expect("aggregate");
    assert_eq!(out.num_rows(), 50);
}

#[test]
fn test_columns_aligned_by_name() {
    let dir = TempDir::new().expect("tempdir");
    let with_user = Table::new(vec![
        Column::new("timestamp", vec![Some("2024-01-15T02:00:00Z".to_string())]),
        Column::new("user", vec![Some("ann".to_string())]),
    ])
    .expect("table");
    let files = vec![
        write(&dir, "a.seg", &time_table(&["2024-01-15T01:00:00Z"])),
        write(&dir, "b.seg", &with_user),
    ];
    let log = RunLog::disabled();
    let out = Aggregator::new(&log, "timestamp", true)
        .aggregate(&files)
        .expect("aggregate");
    assert_eq!(out.column_names(), vec!["timestamp", "seq", "user"]);
    let user = &out.column("user").expect("user").data;
    assert_eq!(user.value_string(0), None);
    assert_eq!(user.value_string(1).as_deref(), Some("ann"));
    assert_eq!(out.column("seq").expect("seq").data.null_count(), 1);
}

#[test]
fn test_compression_downcasts() {
    let small_ints = ColumnData::Int64(vec![Some(1), Some(-7), None, Some(100)]);
    assert_eq!(
        compress_column(&small_ints).map(|c| c.data_type()),
        Some(DataType::Int8)
    );
    let mid_ints = ColumnData::Int64(vec![Some(40_000), Some(-3)]);
    assert_eq!(
        compress_column(&mid_ints).map(|c| c.data_type()),
        Some(DataType::Int32)
    );
    let big_ints = ColumnData::Int64(vec![Some(i64::MAX)]);
    assert!(compress_column(&big_ints).is_none());

    let floats = ColumnData::Float64(vec![Some(0.1), Some(123_456.789), Some(f64::NAN), None]);
    assert_eq!(
        compress_column(&floats).map(|c| c.data_type()),
        Some(DataType::Float32)
    );
    let huge = ColumnData::Float64(vec![Some(1e300)]);
    assert!(compress_column(&huge).is_none());

    let repeated: Vec<Option<String>> = (0..10).map(|i| Some(format!("k{}", i % 2))).collect();
    let dict = compress_column(&ColumnData::Utf8(repeated.clone())).expect("dictionary");
    assert_eq!(dict.data_type(), DataType::Dictionary);
    for (i, v) in repeated.iter().enumerate() {
        assert_eq!(dict.value_string(i), v.clone());
    }

    let distinct: Vec<Option<String>> = (0..10).map(|i| Some(format!("k{i}"))).collect();
    assert!(compress_column(&ColumnData::Utf8(distinct)).is_none());
    assert!(compress_column(&ColumnData::Int64(vec![])).is_none());
}

#[test]
fn test_aggregate_with_compression() {
    let dir = TempDir::new().expect("tempdir");
    let files = vec![write(
        &dir,
        "a.seg",
        &time_table(&["2024-01-15T01:00:00Z", "2024-01-15T00:00:00Z"]),
    )];
    let log = RunLog::disabled();
    let out = Aggregator::new(&log, "timestamp", true)
        .compress(true)
        .aggregate(&files)
        .expect("aggregate");
    assert_eq!(out.column("seq").map(|c| c.data.data_type()), Some(DataType::Int8));
    assert_eq!(out.column("seq").and_then(|c| c.data.value_string(0)).as_deref(), Some("1"));

    let mut table = time_table(&["2024-01-15T01:00:00Z"]);
    assert_eq!(compress_table(&mut table, &log), 1);
}

#[test]
fn test_write_csv_projects_onto_header() {
    let dir = TempDir::new().expect("tempdir");
    let files = vec![
        write(&dir, "a.seg", &time_table(&["2024-01-15T02:00:00Z", "2024-01-15T01:00:00Z"])),
        write(&dir, "b.seg", &time_table(&["2024-01-15T03:00:00Z"])),
    ];
    let output = dir.path().join("out").join("result.csv");
    let header = vec!["timestamp".to_string(), "user".to_string(), "seq".to_string()];

    let log = RunLog::disabled();
    let rows = Aggregator::new(&log, "timestamp", true)
        .write_csv(&files, &header, &output)
        .expect("write csv");
    assert_eq!(rows, 3);

    let lines = read_lines(&output);
    assert_eq!(lines[0], "timestamp,user,seq");
    assert_eq!(lines[1], "2024-01-15T01:00:00.000Z,,1");
    assert_eq!(lines[2], "2024-01-15T02:00:00.000Z,,0");
    assert_eq!(lines[3], "2024-01-15T03:00:00.000Z,,0");
}

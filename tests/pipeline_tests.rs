//! End-to-end runs of the engine against a mock backend


use std::fs;

use chronofetch::chronofetch_core::config::QueryConfig;
use chronofetch::chronofetch_exec::{Engine, ExecError, Output, RunOutcome};
use chronofetch::chronofetch_io::metadata::METADATA_FILE;
use tempfile::TempDir;
use test_data_gen::{base_config, read_lines, temp_settings, utc, MockBackend};

const DAY: &str = "events-2024.01.15";

fn file_config(dir: &TempDir) -> QueryConfig {
    base_config(&[DAY])
        .output_path(dir.path().join("out.csv"))
        .build()
        .expect("config")
}

fn run(dir: &TempDir, workers: usize, config: &QueryConfig, backend: &MockBackend) -> RunOutcome {
    Engine::new(temp_settings(dir, workers))
        .run(config, backend)
        .expect("run succeeds")
}

fn assert_ascending(lines: &[String]) {
    let times: Vec<&str> = lines
        .iter()
        .skip(1)
        .map(|l| l.split(',').next().unwrap_or_default())
        .collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]), "not ascending: {times:?}");
}

#[test]
fn test_file_output_end_to_end() {
    let dir = TempDir::new().expect("tempdir");
    let config = file_config(&dir);
    let backend = MockBackend::new(3);

    let outcome = run(&dir, 4, &config, &backend);
    assert_eq!(
        outcome.output,
        Output::File {
            path: dir.path().join("out.csv"),
            rows: 21
        }
    );
    assert_eq!(outcome.report.successes, 7);
    assert_eq!(outcome.report.errors, 0);
    assert_eq!(outcome.report.backend_calls, 7);
    assert_eq!(outcome.report.cache_hits, 0);
    assert_eq!(backend.call_count(), 7);
    let report = serde_json::to_value(&outcome.report).expect("report serializes");
    assert_eq!(report["backend_calls"], 7);

    let lines = read_lines(&dir.path().join("out.csv"));
    assert_eq!(lines.len(), 22);
    assert_eq!(lines[0], "timestamp,user,value");
    assert!(lines[1].starts_with("2024-01-15T00:00:00.000Z,user_0,0"));
    assert_ascending(&lines);

    let cache = dir.path().join("cache").join(config.cache_key());
    assert!(!cache.exists(), "ephemeral cache removed");
    assert!(dir.path().join("logs").join("query_out.log").exists());
}

#[test]
fn test_persistent_cache_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let config = base_config(&[DAY])
        .output_path(dir.path().join("out.csv"))
        .persist_cache(true)
        .build()
        .expect("config");

    let first_backend = MockBackend::new(2);
    let first = run(&dir, 3, &config, &first_backend);
    assert_eq!(first_backend.call_count(), 7);
    let first_csv = fs::read_to_string(dir.path().join("out.csv")).expect("first output");

    let cache = dir.path().join("cache").join(config.cache_key());
    assert!(cache.join(METADATA_FILE).exists());
    assert!(cache.join("query_out.log").exists(), "log relocated into cache");
    assert!(cache.join(DAY).is_dir());

    let second_backend = MockBackend::new(2);
    let second = run(&dir, 3, &config, &second_backend);
    assert_eq!(second_backend.call_count(), 0);
    assert_eq!(second.report.cache_hits, 7);
    assert_eq!(second.report.successes, 7);
    assert_eq!(second.report.backend_calls, 0);
    assert_eq!(
        fs::read_to_string(dir.path().join("out.csv")).expect("second output"),
        first_csv
    );
    assert_eq!(first.output, second.output);
}

#[test]
fn test_fail_fast_aborts_without_output() {
    let dir = TempDir::new().expect("tempdir");
    let config = file_config(&dir);
    let backend = MockBackend::new(3).failing_on(">= '2024-01-15T08:00:00.000Z'");

    let err = Engine::new(temp_settings(&dir, 1))
        .run(&config, &backend)
        .expect_err("fail-fast run aborts");
    match &err {
        ExecError::Backend { query, source } => {
            assert!(query.contains("2024-01-15T08:00:00.000Z"));
            assert!(source.message().contains("mock failure"));
        }
        other => panic!("expected backend error, got {other}"),
    }
    assert!(err.is_fetch_failure());
    assert!(!err.suggestions().is_empty());
    assert!(!dir.path().join("out.csv").exists());
    assert!(!dir.path().join("cache").join(config.cache_key()).exists());
}

#[test]
fn test_tolerant_mode_counts_errors() {
    let dir = TempDir::new().expect("tempdir");
    let config = base_config(&[DAY])
        .output_path(dir.path().join("out.csv"))
        .ignore_exceptions(true)
        .build()
        .expect("config");
    let backend = MockBackend::new(3).failing_on(">= '2024-01-15T08:00:00.000Z'");

    let outcome = run(&dir, 4, &config, &backend);
    assert_eq!(outcome.report.errors, 1);
    assert_eq!(outcome.report.successes, 6);
    assert_eq!(backend.call_count(), 7);
    assert!(matches!(outcome.output, Output::File { rows: 18, .. }));

    let log = fs::read_to_string(dir.path().join("logs").join("query_out.log")).expect("log");
    assert!(log.contains("--- ERROR: mock failure"));
    assert!(log.contains("Successes: 6, Errors: 1"));
}

#[test]
fn test_table_mode_sorted() {
    let dir = TempDir::new().expect("tempdir");
    let backend = MockBackend::new(3);

    let config = base_config(&[DAY]).return_table(true).build().expect("config");
    let outcome = run(&dir, 4, &config, &backend);
    let table = outcome.output.into_table().expect("table output");
    assert_eq!(table.num_rows(), 21);
    let ts = &table.column("timestamp").expect("timestamp").data;
    assert_eq!(ts.value_string(0).as_deref(), Some("2024-01-15T00:00:00.000Z"));
    assert_eq!(ts.value_string(20).as_deref(), Some("2024-01-16T00:02:00.000Z"));

    let config = base_config(&[DAY])
        .return_table(true)
        .ascending(false)
        .compress(true)
        .build()
        .expect("config");
    let table = run(&dir, 4, &config, &backend)
        .output
        .into_table()
        .expect("table output");
    let ts = &table.column("timestamp").expect("timestamp").data;
    assert_eq!(ts.value_string(0).as_deref(), Some("2024-01-16T00:02:00.000Z"));
    assert_eq!(
        table.column("user").map(|c| c.data.data_type()),
        Some(chronofetch::chronofetch_core::schema::DataType::Dictionary)
    );
}

#[test]
fn test_empty_results_are_not_errors() {
    let dir = TempDir::new().expect("tempdir");
    let config = file_config(&dir);
    let backend = MockBackend::new(3).empty_on("SELECT");

    let outcome = run(&dir, 4, &config, &backend);
    assert_eq!(outcome.report.successes, 7);
    assert_eq!(outcome.report.errors, 0);
    assert_eq!(outcome.report.backend_calls, 7);
    assert_eq!(read_lines(&dir.path().join("out.csv")), vec!["timestamp,user,value"]);
}

#[test]
fn test_isolated_run_leaves_no_trace() {
    let dir = TempDir::new().expect("tempdir");
    let config = base_config(&[DAY])
        .output_path(dir.path().join("out.csv"))
        .persist_cache(true)
        .isolated(true)
        .build()
        .expect("config");
    let backend = MockBackend::new(1);

    let outcome = run(&dir, 2, &config, &backend);
    assert_eq!(outcome.report.peak_memory_mb, 0.0);
    assert!(dir.path().join("out.csv").exists());
    assert!(!dir.path().join("logs").exists());
    assert!(!dir.path().join("cache").join(config.cache_key()).exists());
}

#[test]
fn test_existing_cache_dir_kept() {
    let dir = TempDir::new().expect("tempdir");
    let config = file_config(&dir);
    let cache = dir.path().join("cache").join(config.cache_key());
    fs::create_dir_all(&cache).expect("pre-existing cache");

    run(&dir, 2, &config, &MockBackend::new(1));
    assert!(cache.join(DAY).is_dir(), "pre-existing directory survives");
    assert!(!cache.join(METADATA_FILE).exists(), "metadata only when persistent");
}

#[test]
fn test_worker_panic_reported() {
    let dir = TempDir::new().expect("tempdir");
    let config = file_config(&dir);
    let backend = MockBackend::new(1).panicking_on(">= '2024-01-15T04:00:00.000Z'");

    let err = Engine::new(temp_settings(&dir, 2))
        .run(&config, &backend)
        .expect_err("panic surfaces as an error");
    assert!(matches!(err, ExecError::WorkerPanic(_)));
}

#[test]
fn test_worker_count_does_not_change_output() {
    let outputs: Vec<String> = [1, 8]
        .iter()
        .map(|&workers| {
            let dir = TempDir::new().expect("tempdir");
            let config = base_config(&[DAY, "events-2024.01.16"])
                .output_path(dir.path().join("out.csv"))
                .window_hours(3)
                .build()
                .expect("config");
            run(&dir, workers, &config, &MockBackend::new(2));
            fs::read_to_string(dir.path().join("out.csv")).expect("output")
        })
        .collect();
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn test_time_range_limits_queries() {
    let dir = TempDir::new().expect("tempdir");
    let config = base_config(&[DAY])
        .output_path(dir.path().join("out.csv"))
        .time_range(utc(2024, 1, 15, 1, 30, 0), utc(2024, 1, 15, 9, 15, 0))
        .build()
        .expect("config");
    let backend = MockBackend::new(2).with_time_field("EventTime");

    let outcome = run(&dir, 4, &config, &backend);
    assert_eq!(backend.call_count(), 3);
    assert_eq!(outcome.report.successes, 3);
    let calls = backend.calls();
    assert!(calls.iter().all(|q| q.contains("`EventTime` >= ")));
    assert_eq!(
        calls
            .iter()
            .filter(|q| q.contains("`EventTime` <= '2024-01-15T09:15:00.000Z'"))
            .count(),
        1
    );
}

#[test]
fn test_wider_range_after_narrow_run_fetches_missing_rows() {
    let dir = TempDir::new().expect("tempdir");
    let ranged = |start_hour: u32| {
        base_config(&[DAY])
            .return_table(true)
            .persist_cache(true)
            .time_range(utc(2024, 1, 15, start_hour, 0, 0), utc(2024, 1, 15, 11, 0, 0))
            .build()
            .expect("config")
    };

    let narrow = ranged(10);
    let first_backend = MockBackend::new(2);
    let first = run(&dir, 2, &narrow, &first_backend);
    assert_eq!(first_backend.call_count(), 1);
    let table = first.output.into_table().expect("table output");
    let ts = &table.column("timestamp").expect("timestamp").data;
    assert_eq!(ts.value_string(0).as_deref(), Some("2024-01-15T10:00:00.000Z"));

    let wide = ranged(8);
    assert_eq!(wide.cache_key(), narrow.cache_key());
    let second_backend = MockBackend::new(2);
    let second = run(&dir, 2, &wide, &second_backend);
    assert_eq!(second_backend.call_count(), 1);
    assert_eq!(second.report.cache_hits, 0);
    let table = second.output.into_table().expect("table output");
    let ts = &table.column("timestamp").expect("timestamp").data;
    assert_eq!(ts.value_string(0).as_deref(), Some("2024-01-15T08:00:00.000Z"));

    let third_backend = MockBackend::new(2);
    let third = run(&dir, 2, &narrow, &third_backend);
    assert_eq!(third_backend.call_count(), 0);
    assert_eq!(third.report.cache_hits, 1);
}

#[test]
fn test_repeated_partition_fetched_once() {
    let dir = TempDir::new().expect("tempdir");
    let config = base_config(&[DAY, DAY])
        .return_table(true)
        .build()
        .expect("config");
    assert_eq!(config.partitions(), &[DAY.to_string()]);

    let backend = MockBackend::new(3);
    let outcome = run(&dir, 4, &config, &backend);
    assert_eq!(backend.call_count(), 7);
    assert_eq!(outcome.report.successes, 7);
    let table = outcome.output.into_table().expect("table output");
    assert_eq!(table.num_rows(), 21);
}

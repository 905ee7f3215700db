use bioapp::apps::{App, LoadAligned, LoadJson, RunStatus, WriteDb, WriteJson, WriteSeqs, app_fn, run_status};
use bioapp::core::config::{ApplyOptions, IfSerial, ParallelConfig};
use bioapp::core::directory::DataStoreDirectory;
use bioapp::core::{logging, parallel};
use bioapp::core::sqlite::DataStoreSqlite;
use bioapp::data::DataObject;
use bioapp::{BioappError, DataStore, Mode, NotCompleted, open_data_store};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn workers(n: usize) -> ParallelConfig {
    ParallelConfig {
        max_workers: Some(n),
        chunksize: None,
        if_serial: IfSerial::Ignore,
    }
}

fn seed_fasta(root: &Path, n: usize, ragged: &[usize]) {
    fs::create_dir_all(root).expect("mkdir");
    for i in 0..n {
        let body = if ragged.contains(&i) {
            ">a\nACG\n>b\nACGT\n".to_string()
        } else {
            format!(">a\nACGT\n>b\nAC{}T\n", ["A", "C", "G", "T"][i % 4])
        };
        fs::write(root.join(format!("s{:03}.fasta", i)), body).expect("seed");
    }
}

#[test]
fn apply_to_preserves_order_in_serial_and_parallel() {
    let slow_square = app_fn("slow_square", |x: u64| {
        std::thread::sleep(std::time::Duration::from_micros((50 - x % 50) * 20));
        Ok(x * x)
    });
    let inputs: Vec<u64> = (0..200).collect();
    let serial = slow_square
        .apply_to(inputs.clone(), &ApplyOptions::serial())
        .expect("serial");
    let parallel = slow_square
        .apply_to(inputs.clone(), &ApplyOptions::parallel(workers(4)))
        .expect("parallel");
    assert_eq!(serial, parallel);
    let values: Vec<u64> = parallel.into_iter().map(|r| r.expect("ok")).collect();
    assert_eq!(values, inputs.iter().map(|x| x * x).collect::<Vec<_>>());
}

#[test]
fn one_malformed_input_yields_one_failure_in_place() {
    let parse = app_fn("parse_int", |s: String| {
        s.parse::<i64>()
            .map_err(|e| NotCompleted::error("parse_int", e).with_source(Some(s.clone())))
    });
    let inputs = ["1", "2", "x", "4", "5"].map(String::from);
    for options in [ApplyOptions::serial(), ApplyOptions::parallel(workers(3))] {
        let results = parse.apply_to(inputs.clone(), &options).expect("apply");
        assert_eq!(results.len(), 5);
        let failed: Vec<usize> = results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.is_err().then_some(i))
            .collect();
        assert_eq!(failed, vec![2]);
        assert_eq!(results[4], Ok(5));
        assert_eq!(run_status(&results), RunStatus::PartiallyCompleted);
    }
}

#[test]
fn parallel_loader_writer_pipeline_with_cleanup_mirrors_source_members() {
    logging::init();
    let tmp = TempDir::new().expect("tempdir");
    let raw = tmp.path().join("raw");
    seed_fasta(&raw, 24, &[5, 17]);

    let input = open_data_store(&raw, Some("fasta"), Mode::Read, None).expect("open input");
    let out_root = tmp.path().join("aligned");
    let output = open_data_store(&out_root, Some("fasta"), Mode::Write, None).expect("open output");
    fs::write(out_root.join(".partial-stale"), b"left by a crashed run").expect("stale partial");

    let pipeline = LoadAligned::new("fasta").expect("loader") + WriteSeqs::new(output.clone(), "fasta").expect("writer");
    let options = ApplyOptions::parallel(workers(4)).with_cleanup(true);
    let members = input.members().expect("members");
    let results = pipeline.apply_to(members.clone(), &options).expect("apply");

    assert_eq!(results.len(), 24);
    let expected: Vec<String> = members
        .iter()
        .map(|m| m.unique_id.clone())
        .filter(|id| id != "s005.fasta" && id != "s017.fasta")
        .collect();
    let written: Vec<String> = output
        .members()
        .expect("output members")
        .into_iter()
        .map(|m| m.unique_id)
        .collect();
    assert_eq!(written, expected);

    let failed: Vec<String> = output
        .not_completed()
        .expect("nc")
        .into_iter()
        .map(|m| m.unique_id)
        .collect();
    assert_eq!(failed, vec!["s005.fasta", "s017.fasta"]);
    assert!(results.iter().all(|r| r.is_ok()), "writer records every outcome");
    assert!(!out_root.join(".partial-stale").exists(), "cleanup removes partial files");
    assert!(output.validate().expect("validate").is_ok());
}

#[test]
fn parallel_writers_share_one_database_store() {
    let tmp = TempDir::new().expect("tempdir");
    let raw = tmp.path().join("raw");
    seed_fasta(&raw, 30, &[3]);
    let input = open_data_store(&raw, Some("fasta"), Mode::Read, None).expect("open input");
    let db = DataStoreSqlite::open(tmp.path().join("aln.sqlitedb"), Mode::Overwrite, None).expect("open db");

    let pipeline = LoadAligned::new("fasta").expect("loader") + WriteDb::new(db.clone());
    let results = pipeline
        .apply_to(input.members().expect("members"), &ApplyOptions::parallel(workers(4)).with_cleanup(true))
        .expect("apply");
    assert_eq!(results.len(), 30);
    assert_eq!(db.len().expect("records"), 29);
    assert_eq!(db.not_completed().expect("nc").len(), 1);
    assert_eq!(db.locked().expect("locked"), None, "cleanup releases the writer lock");
}

#[test]
fn overwrite_store_is_cleared_before_workers_write() {
    let tmp = TempDir::new().expect("tempdir");
    let out_root = tmp.path().join("out");
    fs::create_dir_all(&out_root).expect("mkdir");
    fs::write(out_root.join("old.json"), b"{}").expect("old record");

    let output = DataStoreDirectory::open(&out_root, Some("json"), Mode::Overwrite, None).expect("open");
    let tag = app_fn("tag", |i: usize| {
        let obj = DataObject::Table(bioapp::data::Table::default()).with_source(&format!("t{:02}", i));
        Ok(obj)
    });
    let pipeline = tag + WriteJson::new(output.clone());
    let results = pipeline
        .apply_to(0..40usize, &ApplyOptions::parallel(workers(8)))
        .expect("apply");
    assert_eq!(run_status(&results), RunStatus::Completed);
    assert_eq!(output.len().expect("len"), 40);
    assert!(output.get("old.json").is_err());

    let reload = LoadJson + app_fn("source", |o: DataObject| Ok(o.source().map(str::to_string)));
    let sources = reload
        .apply_to(output.members().expect("members"), &ApplyOptions::serial())
        .expect("reload");
    assert_eq!(sources[0], Ok(Some("t00".to_string())));
}

#[test]
fn if_serial_raise_refuses_single_worker_parallel_run() {
    let app = app_fn("id", |x: i32| Ok(x));
    let config = ParallelConfig {
        max_workers: Some(1),
        chunksize: None,
        if_serial: IfSerial::Raise,
    };
    let err = app
        .apply_to([1, 2, 3], &ApplyOptions::parallel(config))
        .expect_err("single worker");
    assert!(matches!(err, BioappError::Configuration(_)));

    let config = ParallelConfig {
        max_workers: Some(1),
        ..ParallelConfig::default()
    };
    let results = app
        .apply_to([1, 2, 3], &ApplyOptions::parallel(config))
        .expect("warn falls back to serial");
    assert_eq!(results, vec![Ok(1), Ok(2), Ok(3)]);
}

#[test]
fn workers_report_rank_and_master_does_not() {
    assert!(parallel::is_master_process());
    assert_eq!(parallel::get_rank(), 0);
    let ranks = parallel::map(
        |_: usize| (parallel::get_rank(), parallel::is_master_process()),
        (0..16).collect(),
        &workers(2),
        None,
    )
    .expect("map");
    assert!(ranks.iter().all(|&(rank, master)| rank >= 1 && !master));
}

#[test]
fn apply_options_load_from_toml_file() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("run.toml");
    fs::write(
        &path,
        "parallel = true\ncleanup = true\n\n[workers]\nmax_workers = 2\nif_serial = \"raise\"\n",
    )
    .expect("write config");
    let options = ApplyOptions::load(&path).expect("load");
    assert!(options.parallel && options.cleanup && !options.show_progress);
    assert_eq!(options.workers.resolved_workers(), 2);
    assert_eq!(options.workers.if_serial, IfSerial::Raise);

    let doubled = app_fn("double", |x: i32| Ok(x * 2))
        .apply_to([1, 2], &options)
        .expect("apply");
    assert_eq!(doubled, vec![Ok(2), Ok(4)]);
}

#[test]
fn progress_bar_does_not_change_results() {
    let app = app_fn("inc", |x: i32| Ok(x + 1));
    let options = ApplyOptions::serial().with_progress(true);
    assert_eq!(app.apply_to([1, 2], &options).expect("apply"), vec![Ok(2), Ok(3)]);
    let options = ApplyOptions::parallel(workers(2)).with_progress(true);
    assert_eq!(app.apply_to([1, 2], &options).expect("apply"), vec![Ok(2), Ok(3)]);
}

#[test]
fn composed_pipeline_reports_last_store() {
    let tmp = TempDir::new().expect("tempdir");
    let store = DataStoreDirectory::open(tmp.path().join("o"), Some("json"), Mode::Write, None).expect("open");
    let pipeline = LoadJson + WriteJson::new(store.clone());
    let reported = pipeline.data_store().expect("writer store");
    assert_eq!(reported.source(), store.source());
    assert_eq!(pipeline.name(), "load_json + write_json");
}

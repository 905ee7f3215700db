use bioapp::core::directory::DataStoreDirectory;
use bioapp::core::sqlite::DataStoreSqlite;
use bioapp::{BioappError, DataStore, Mode, NotCompleted, open_data_store};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn seed_dir(root: &Path, names: &[&str]) {
    fs::create_dir_all(root).expect("create seed dir");
    for name in names {
        fs::write(root.join(name), format!(">{}\nACGT\n", name)).expect("write seed file");
    }
}

#[test]
fn directory_store_enumerates_sorted_and_filtered_by_suffix() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path().join("raw");
    seed_dir(&root, &["c.fasta", "a.fasta", "b.fasta", "notes.txt"]);

    let store = open_data_store(&root, Some("fasta"), Mode::Read, None).expect("open");
    let ids: Vec<String> = store
        .members()
        .expect("members")
        .into_iter()
        .map(|m| m.unique_id)
        .collect();
    assert_eq!(ids, vec!["a.fasta", "b.fasta", "c.fasta"]);
    assert_eq!(store.len().expect("len"), 3);

    let again: Vec<String> = store
        .members()
        .expect("members")
        .into_iter()
        .map(|m| m.unique_id)
        .collect();
    assert_eq!(ids, again, "enumeration order must be stable");
}

#[test]
fn directory_store_limit_glob_and_wildcard() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path().join("raw");
    seed_dir(&root, &["a.fasta", "b.fasta", "c.fa", "d.txt"]);

    let limited = open_data_store(&root, Some("fasta"), Mode::Read, Some(1)).expect("open");
    assert_eq!(limited.len().expect("len"), 1);

    let glob = open_data_store(&root, Some("fa*"), Mode::Read, None).expect("open");
    assert_eq!(glob.len().expect("len"), 3);

    let all = open_data_store(&root, Some("*"), Mode::Read, None).expect("open");
    assert_eq!(all.len().expect("len"), 4);
}

#[test]
fn directory_store_sees_external_writes_on_each_enumeration() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path().join("raw");
    seed_dir(&root, &["a.fasta"]);
    let store = open_data_store(&root, Some("fasta"), Mode::Read, None).expect("open");
    assert_eq!(store.len().expect("len"), 1);
    seed_dir(&root, &["b.fasta"]);
    assert_eq!(store.len().expect("len"), 2);
}

#[test]
fn directory_store_construction_errors() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path().join("raw");
    seed_dir(&root, &["a.fasta"]);

    let missing_suffix = open_data_store(&root, None, Mode::Read, None);
    assert!(matches!(missing_suffix, Err(BioappError::Configuration(_))));

    let empty_suffix = open_data_store(&root, Some(""), Mode::Read, None);
    assert!(matches!(empty_suffix, Err(BioappError::Configuration(_))));

    let missing_root = open_data_store(tmp.path().join("nope"), Some("fasta"), Mode::Read, None);
    assert!(missing_root.is_err());
}

#[cfg(unix)]
#[test]
fn write_modes_refuse_read_only_roots() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path().join("locked");
    seed_dir(&root, &["a.fasta"]);
    fs::set_permissions(&root, fs::Permissions::from_mode(0o555)).expect("chmod");

    for mode in [Mode::Write, Mode::Overwrite] {
        let dir = DataStoreDirectory::open(&root, Some("fasta"), mode, None);
        assert!(matches!(dir, Err(BioappError::Configuration(_))), "directory in {} mode", mode);
        let db = DataStoreSqlite::open(root.join("out.sqlitedb"), mode, None);
        assert!(matches!(db, Err(BioappError::Configuration(_))), "database in {} mode", mode);
    }
    assert!(DataStoreDirectory::open(&root, Some("fasta"), Mode::Read, None).is_ok());
    assert!(!root.join("out.sqlitedb").exists());

    fs::set_permissions(&root, fs::Permissions::from_mode(0o755)).expect("chmod back");
}

#[test]
fn index_access_out_of_range_is_an_error() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path().join("raw");
    seed_dir(&root, &["a.fasta", "b.fasta"]);
    let store = open_data_store(&root, Some("fasta"), Mode::Read, None).expect("open");

    assert_eq!(store.member(1).expect("member 1").unique_id, "b.fasta");
    let err = store.member(2).expect_err("index 2 is out of range");
    assert!(matches!(err, BioappError::IndexOutOfRange { index: 2, len: 2 }));
    assert!(matches!(store.get("zzz.fasta"), Err(BioappError::NotFound(_))));
}

#[test]
fn read_only_store_rejects_writes() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path().join("raw");
    seed_dir(&root, &["a.fasta"]);
    let store = open_data_store(&root, Some("fasta"), Mode::Read, None).expect("open");
    let err = store.write("b.fasta", b">b\nA\n", None).expect_err("read-only");
    assert!(matches!(err, BioappError::ReadOnly(_)));
    let marker = NotCompleted::fail("x", "y");
    assert!(store.write_not_completed("b.fasta", &marker).is_err());
}

#[test]
fn overwrite_mode_clears_prior_state_once_and_is_idempotent() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path().join("out");
    seed_dir(&root, &["stale.json"]);

    let store = DataStoreDirectory::open(&root, Some("json"), Mode::Overwrite, None).expect("open");
    store.write("a.json", b"{\"v\": 1}", None).expect("first write");
    store.write("b.json", b"{\"v\": 2}", None).expect("second write");
    store.write("a.json", b"{\"v\": 3}", None).expect("rewrite");

    let members = store.members().expect("members");
    let ids: Vec<&str> = members.iter().map(|m| m.unique_id.as_str()).collect();
    assert_eq!(ids, vec!["a.json", "b.json"], "stale record is cleared, later writes survive");
    let a = store.get("a.json").expect("a.json");
    assert_eq!(a.read_text().expect("read"), "{\"v\": 3}");
}

#[test]
fn write_mode_rejects_conflicting_content_but_accepts_identical_rewrite() {
    let tmp = TempDir::new().expect("tempdir");
    let store =
        DataStoreDirectory::open(tmp.path().join("out"), Some("json"), Mode::Write, None).expect("open");
    store.write("a.json", b"1", None).expect("write");
    store.write("a.json", b"1", None).expect("identical rewrite");
    let err = store.write("a.json", b"2", None).expect_err("conflict");
    assert!(matches!(err, BioappError::Validation(_)));
    assert_eq!(store.len().expect("len"), 1);
}

#[test]
fn write_mode_keeps_existing_records() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path().join("out");
    seed_dir(&root, &["old.fasta"]);
    let store = DataStoreDirectory::open(&root, Some("fasta"), Mode::Write, None).expect("open");
    store.write("new.fasta", b">n\nA\n", None).expect("write");
    assert_eq!(store.len().expect("len"), 2);
}

#[test]
fn directory_not_completed_round_trips_with_cause_chain() {
    let tmp = TempDir::new().expect("tempdir");
    let store =
        DataStoreDirectory::open(tmp.path().join("out"), Some("json"), Mode::Write, None).expect("open");
    let root = NotCompleted::error("load_aligned", "parse error").with_source(Some("s1.fasta".into()));
    let mid = NotCompleted::fail("filter", "upstream failed").with_cause(root);
    let marker = NotCompleted::fail("writer", "nothing to write").with_cause(mid);

    let member = store.write_not_completed("s1.fasta", &marker).expect("write nc");
    assert_eq!(member.unique_id, "s1.json");
    assert_eq!(store.not_completed().expect("nc").len(), 1);
    assert!(store.members().expect("members").is_empty());

    let back = NotCompleted::from_json(&member.read_text().expect("read")).expect("parse");
    assert_eq!(back, marker);
    assert_eq!(back.chain_len(), 3);
    assert_eq!(back.root_cause().origin, "load_aligned");
}

#[test]
fn successful_write_clears_not_completed_entry() {
    let tmp = TempDir::new().expect("tempdir");
    let store =
        DataStoreDirectory::open(tmp.path().join("out"), Some("json"), Mode::Write, None).expect("open");
    store
        .write_not_completed("a.json", &NotCompleted::fail("x", "first try failed"))
        .expect("write nc");
    store.write("a.json", b"{}", None).expect("write");
    assert!(store.not_completed().expect("nc").is_empty());
    assert_eq!(store.drop_not_completed(None).expect("drop"), 0);
}

#[test]
fn validate_detects_tampered_records() {
    let tmp = TempDir::new().expect("tempdir");
    let root = tmp.path().join("out");
    let store = DataStoreDirectory::open(&root, Some("json"), Mode::Write, None).expect("open");
    store.write("a.json", b"{\"v\": 1}", None).expect("write");
    store.write("b.json", b"{\"v\": 2}", None).expect("write");
    assert!(store.validate().expect("validate").is_ok());

    fs::write(root.join("b.json"), b"{\"v\": 99}").expect("tamper");
    fs::write(root.join("c.json"), b"{}").expect("unchecked file");
    let report = store.validate().expect("validate");
    assert_eq!(report.checked, 3);
    assert_eq!(report.mismatched, vec!["b.json"]);
    assert_eq!(report.missing, vec!["c.json"]);
}

#[test]
fn describe_and_summarise_not_completed() {
    let tmp = TempDir::new().expect("tempdir");
    let store =
        DataStoreDirectory::open(tmp.path().join("out"), Some("json"), Mode::Write, None).expect("open");
    store.write("ok.json", b"{}", None).expect("write");
    for id in ["x.json", "y.json"] {
        let marker = NotCompleted::fail("filter", "too short").with_source(Some(id.into()));
        store.write_not_completed(id, &marker).expect("nc");
    }
    let marker = NotCompleted::error("load", "bad header").with_source(Some("z.json".into()));
    store.write_not_completed("z.json", &marker).expect("nc");

    let summary = store.describe().expect("describe");
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.not_completed, 3);
    assert_eq!(summary.mode, Mode::Write);

    let groups = store.summary_not_completed().expect("summary");
    assert_eq!(groups.len(), 2);
    let too_short = groups.iter().find(|g| g.message == "too short").expect("group");
    assert_eq!(too_short.count, 2);
    assert_eq!(too_short.sources, vec!["x.json", "y.json"]);

    assert_eq!(store.drop_not_completed(Some("x.json")).expect("drop one"), 1);
    assert_eq!(store.drop_not_completed(None).expect("drop rest"), 2);
    assert!(store.not_completed().expect("nc").is_empty());
}

#[test]
fn open_data_store_dispatches_on_sqlitedb_extension() {
    let tmp = TempDir::new().expect("tempdir");
    let db = open_data_store(tmp.path().join("out.sqlitedb"), None, Mode::Write, None).expect("open db");
    db.write("a", b"{}", Some("bioapp.data.Table")).expect("write");
    assert_eq!(db.record_type().expect("record type").as_deref(), Some("bioapp.data.Table"));
    assert!(tmp.path().join("out.sqlitedb").is_file());
}

#[test]
fn sqlite_store_enumerates_in_identifier_order_with_limit() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("out.sqlitedb");
    let store = DataStoreSqlite::open(&path, Mode::Write, None).expect("open");
    for id in ["c", "a", "b"] {
        store.write(id, id.as_bytes(), None).expect("write");
    }
    let ids: Vec<String> = store.members().expect("members").into_iter().map(|m| m.unique_id).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(store.member(0).expect("first").read().expect("read"), b"a");

    let limited = DataStoreSqlite::open(&path, Mode::Read, Some(2)).expect("open read");
    assert_eq!(limited.len().expect("len"), 2);
}

#[test]
fn sqlite_store_keeps_one_record_type() {
    let tmp = TempDir::new().expect("tempdir");
    let store = DataStoreSqlite::open(tmp.path().join("t.sqlitedb"), Mode::Write, None).expect("open");
    store.write("a", b"1", Some("bioapp.data.Table")).expect("write");
    let err = store
        .write("b", b"2", Some("bioapp.data.Alignment"))
        .expect_err("mixed record types");
    assert!(matches!(err, BioappError::Validation(_)));
    assert_eq!(store.len().expect("len"), 1);
}

#[test]
fn sqlite_overwrite_is_idempotent_and_clears_prior_runs() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("o.sqlitedb");
    {
        let first = DataStoreSqlite::open(&path, Mode::Write, None).expect("open");
        first.write("old", b"x", None).expect("write");
    }
    let store = DataStoreSqlite::open(&path, Mode::Overwrite, None).expect("open overwrite");
    store.write("a", b"1", None).expect("write");
    store.write("a", b"2", None).expect("rewrite");
    let members = store.members().expect("members");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].unique_id, "a");
    assert_eq!(members[0].read().expect("read"), b"2");
}

#[test]
fn sqlite_not_completed_is_separate_from_records() {
    let tmp = TempDir::new().expect("tempdir");
    let store = DataStoreSqlite::open(tmp.path().join("nc.sqlitedb"), Mode::Write, None).expect("open");
    let cause = NotCompleted::error("load_db", "missing").with_source(Some("s1".into()));
    let marker = NotCompleted::fail("filter", "skipped").with_cause(cause);
    store.write_not_completed("s1", &marker).expect("write nc");

    assert_eq!(store.not_completed().expect("nc").len(), 1);
    assert_eq!(store.len().expect("len"), 0);
    let nc = &store.not_completed().expect("nc")[0];
    let back = NotCompleted::from_json(&nc.read_text().expect("read")).expect("parse");
    assert_eq!(back, marker);
    assert_eq!(back.caused_by.as_deref(), marker.caused_by.as_deref());
}

#[test]
fn sqlite_lock_is_taken_over_and_released_on_cleanup() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("lock.sqlitedb");
    let first = DataStoreSqlite::open(&path, Mode::Write, None).expect("open first");
    let first_token = first.locked().expect("locked").expect("lock token");

    let second = DataStoreSqlite::open(&path, Mode::Write, None).expect("open second");
    let second_token = second.locked().expect("locked").expect("lock token");
    assert_ne!(first_token, second_token);
    assert!(second_token.starts_with(&format!("{}:", std::process::id())));

    assert!(!first.unlock(false).expect("unlock foreign"), "only the holder's lock is released");
    second.cleanup().expect("cleanup");
    assert_eq!(second.locked().expect("locked"), None);
}

#[test]
fn sqlite_read_mode_requires_existing_file() {
    let tmp = TempDir::new().expect("tempdir");
    let err = DataStoreSqlite::open(tmp.path().join("missing.sqlitedb"), Mode::Read, None)
        .expect_err("missing db");
    assert!(matches!(err, BioappError::NotFound(_)));
}

#[test]
fn sqlite_concurrent_writers_do_not_lose_records() {
    let tmp = TempDir::new().expect("tempdir");
    let store = DataStoreSqlite::open(tmp.path().join("c.sqlitedb"), Mode::Write, None).expect("open");
    std::thread::scope(|scope| {
        for t in 0..4 {
            let store = &store;
            scope.spawn(move || {
                for i in 0..25 {
                    store
                        .write(&format!("r{t}-{i:02}"), format!("{t}{i}").as_bytes(), None)
                        .expect("concurrent write");
                }
            });
        }
    });
    assert_eq!(store.len().expect("len"), 100);
    assert!(store.validate().expect("validate").is_ok());
}

//! End-to-end properties of export and restore, run against the in-memory
//! and SQLite stores through the public API.

use std::cell::RefCell;
use std::time::Duration;

use clinic_backup::cache::ApplicationCache;
use clinic_backup::i18n::Catalog;
use clinic_backup::model::BackupDocument;
use clinic_backup::store::{MemoryStore, ReadinessPolicy, RemoteStore, SqliteStore, MAX_BATCH_OPS};
use clinic_backup::sync::{
    read_backup, ExportOptions, Exporter, ImportOptions, Importer, SyncError,
};
use serde_json::{json, Value};
use tempfile::TempDir;

fn no_wait() -> ReadinessPolicy {
    ReadinessPolicy {
        attempts: 1,
        interval: Duration::ZERO,
    }
}

fn export_options<'a>() -> ExportOptions<'a> {
    ExportOptions {
        readiness: no_wait(),
        consultation_page_size: 2,
        ..ExportOptions::default()
    }
}

fn import_options<'a>() -> ImportOptions<'a> {
    ImportOptions {
        readiness: no_wait(),
        ..ImportOptions::default()
    }
}

fn document(value: &Value) -> BackupDocument {
    BackupDocument::from_json_str(&value.to_string()).unwrap()
}

fn import<S: RemoteStore>(store: &mut S, doc: BackupDocument) -> Result<(), SyncError> {
    let mut cache = ApplicationCache::default();
    let catalog = Catalog::default();
    Importer::new(store, &mut cache, &catalog)
        .with_options(import_options())
        .import(doc)
        .map(|_| ())
}

fn seeded_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.insert("patients", "1", json!({"name": "陳大文", "phone": "91234567"}));
    store.insert("patients", "p-2", json!({"name": "B", "tags": ["vip"], "address": {"district": "灣仔"}}));
    for i in 0..5 {
        store.insert(
            "consultations",
            &format!("c{i}"),
            json!({"patientId": "1", "date": {"seconds": 1_700_000_000 + i, "nanoseconds": 0}}),
        );
    }
    store.insert("users", "u1", json!({"name": "Dr. Lee", "personalSettings": {"theme": "dark"}}));
    store.insert("billingItems", "4001", json!({"name": "診金", "price": 150}));
    store.insert("patientPackages", "pk1", json!({"patientId": "1", "remaining": 3}));
    store.set_kv_tree(json!({
        "herbInventory": {"h1": {"stock": 10}},
        "scheduleShifts": {"mon": ["am"]},
        "appointments": {"a1": {"patientId": "1"}}
    }));
    store
}

const COLLECTIONS: [&str; 5] = [
    "patients",
    "consultations",
    "users",
    "billingItems",
    "patientPackages",
];

#[test]
fn round_trip_reproduces_every_collection() {
    let mut source = seeded_store();
    let outcome = Exporter::with_options(&mut source, export_options())
        .export()
        .unwrap();
    assert_eq!(outcome.stats.consultations, 5);
    assert_eq!(outcome.stats.consultation_pages, 3);

    let mut target = MemoryStore::new();
    target.insert("patients", "stale", json!({"name": "stale"}));
    import(&mut target, outcome.document).unwrap();

    for collection in COLLECTIONS {
        assert_eq!(
            target.collection(collection),
            source.collection(collection),
            "{collection} differs after round trip"
        );
    }
}

#[test]
fn round_trip_through_a_backup_file_and_sqlite() {
    let temp = TempDir::new().unwrap();
    let mut source = seeded_store();
    let (_, written) = Exporter::with_options(&mut source, export_options())
        .export_to_dir(temp.path())
        .unwrap();

    let doc = read_backup(&written.path).unwrap();
    let mut target = SqliteStore::open(&temp.path().join("clinic.db")).unwrap();
    import(&mut target, doc).unwrap();

    let mut ids = target.list_ids("patients").unwrap();
    ids.sort();
    assert_eq!(ids, ["1", "p-2"]);
    let patient = target.get("patients", "p-2").unwrap().unwrap();
    assert_eq!(patient.fields["address"]["district"], "灣仔");
    assert!(!patient.fields.contains_key("id"));
    assert_eq!(target.kv_read("herbInventory/h1/stock").unwrap(), Some(json!(10)));
    assert_eq!(target.kv_read("appointments").unwrap(), None);
}

#[test]
fn importing_twice_converges() {
    let doc = json!({
        "patients": [{"id": 1, "name": "A"}, {"id": "2", "name": "B"}],
        "consultations": [{"id": "c1", "patientId": "1"}],
        "users": [],
        "billingItems": [{"id": 4001, "name": "診金"}],
        "patientPackages": [],
        "rtdb": {"herbInventory": {"h1": 1}}
    });

    let mut store = MemoryStore::new();
    store.insert("patients", "9", json!({"name": "old"}));

    import(&mut store, document(&doc)).unwrap();
    let after_once: Vec<_> = COLLECTIONS.iter().map(|c| store.collection(c)).collect();
    let commits_once = store.commits().len();

    import(&mut store, document(&doc)).unwrap();
    let after_twice: Vec<_> = COLLECTIONS.iter().map(|c| store.collection(c)).collect();
    assert_eq!(after_once, after_twice);

    let second_run = &store.commits()[commits_once..];
    assert!(second_run.iter().all(|c| c.deletes == 0));
    assert_eq!(second_run.iter().map(|c| c.sets).sum::<usize>(), 4);
}

#[test]
fn denylisted_keys_are_never_touched() {
    let mut store = MemoryStore::new();
    let live = json!({"a1": {"patientId": "1", "status": "waiting"}});
    store.set_kv_tree(json!({"appointments": live.clone(), "consultation": {"current": "c9"}}));

    let doc = document(&json!({
        "patients": [],
        "rtdb": {
            "appointments": {"zzz": {"patientId": "evil"}},
            "consultations": {"x": 1},
            "onlineConsultations": {"y": 2},
            "herbInventory": {"h1": 5}
        }
    }));
    import(&mut store, doc).unwrap();

    assert_eq!(store.kv_read("appointments").unwrap(), Some(live));
    assert_eq!(store.kv_read("consultation/current").unwrap(), Some(json!("c9")));
    assert_eq!(store.kv_read("consultations").unwrap(), None);
    assert_eq!(store.kv_read("onlineConsultations").unwrap(), None);
    assert_eq!(store.kv_writes(), ["herbInventory"]);

    let outcome = Exporter::with_options(&mut store, export_options())
        .export()
        .unwrap();
    let rtdb = outcome.document.rtdb.unwrap();
    assert!(!rtdb.contains_key("appointments"));
    assert!(!rtdb.contains_key("consultation"));
    assert!(rtdb.contains_key("herbInventory"));
}

#[test]
fn path_form_keys_cannot_reach_denylisted_subtrees() {
    let mut store = MemoryStore::new();
    let live = json!({"a1": {"status": "waiting"}});
    store.set_kv_tree(json!({"appointments": live.clone()}));

    let doc = document(&json!({
        "rtdb": {
            "/appointments": {"evil": 1},
            "appointments/": {"evil": 2},
            "appointments/a1/status": "done",
            "consultations/x": {"evil": 3},
            "herbInventory/h1": 4
        }
    }));
    let mut cache = ApplicationCache::default();
    let catalog = Catalog::default();
    let report = Importer::new(&mut store, &mut cache, &catalog)
        .with_options(import_options())
        .import(doc)
        .unwrap();

    assert_eq!(store.kv_read("appointments").unwrap(), Some(live));
    assert_eq!(store.kv_read("consultations").unwrap(), None);
    assert_eq!(store.kv_read("herbInventory/h1").unwrap(), Some(json!(4)));
    assert_eq!(report.kv_denylisted.len(), 4);
    assert_eq!(report.kv_restored, ["herbInventory/h1"]);
}

#[test]
fn no_batch_exceeds_the_ceiling() {
    let mut store = MemoryStore::new();
    for i in 0..1200 {
        store.insert("patients", &format!("old-{i}"), json!({"n": i}));
    }
    let patients: Vec<Value> = (0..1200).map(|i| json!({"id": format!("new-{i}")})).collect();

    import(&mut store, document(&json!({ "patients": patients }))).unwrap();

    let patient_commits: Vec<_> = store
        .commits()
        .iter()
        .filter(|c| c.collection == "patients")
        .collect();
    assert!(store.commits().iter().all(|c| c.total() <= MAX_BATCH_OPS));
    assert_eq!(patient_commits.iter().map(|c| c.deletes).sum::<usize>(), 1200);
    assert_eq!(patient_commits.iter().map(|c| c.sets).sum::<usize>(), 1200);
    assert_eq!(patient_commits.len(), 5);
    assert_eq!(store.collection("patients").len(), 1200);
    assert!(store.collection("patients").contains_key("new-0"));
}

fn progress_calls(doc: BackupDocument) -> Vec<(usize, usize)> {
    let calls = RefCell::new(Vec::new());
    let mut store = MemoryStore::new();
    let mut cache = ApplicationCache::default();
    let catalog = Catalog::default();
    let options = import_options()
        .with_progress(|done: usize, total: usize| calls.borrow_mut().push((done, total)));

    Importer::new(&mut store, &mut cache, &catalog)
        .with_options(options)
        .import(doc)
        .unwrap();
    calls.into_inner()
}

#[test]
fn progress_counts_every_step_once() {
    let with_kv = progress_calls(document(&json!({"patients": [], "rtdb": {}})));
    assert_eq!(with_kv, (1..=6).map(|d| (d, 6)).collect::<Vec<_>>());

    let without_kv = progress_calls(document(&json!({"patients": []})));
    assert_eq!(without_kv, (1..=5).map(|d| (d, 5)).collect::<Vec<_>>());
}

#[test]
fn export_progress_reports_six_steps() {
    let calls = RefCell::new(Vec::new());
    let mut store = seeded_store();
    let options = export_options()
        .with_progress(|done: usize, total: usize| calls.borrow_mut().push((done, total)));
    Exporter::with_options(&mut store, options).export().unwrap();

    assert_eq!(calls.into_inner(), (1..=6).map(|d| (d, 6)).collect::<Vec<_>>());
}

#[test]
fn a_failed_step_leaves_the_others_applied() {
    let mut store = MemoryStore::new();
    store.insert("users", "u-old", json!({"name": "kept"}));
    store.fail_writes("users");

    let doc = document(&json!({
        "patients": [{"id": 1, "name": "A"}],
        "consultations": [{"id": "c1"}],
        "users": [{"id": "u1"}],
        "billingItems": [{"id": 4001}],
        "patientPackages": [{"id": "pk1"}]
    }));

    let err = import(&mut store, doc).unwrap_err();
    let SyncError::PartialRestore { failed, report } = err else {
        panic!("expected a partial restore, got {err:?}");
    };
    assert_eq!(failed, ["users"]);
    assert_eq!(report.steps.len(), 5);
    assert!(report.cache_rebuilt);

    assert!(store.collection("patients").contains_key("1"));
    assert!(store.collection("consultations").contains_key("c1"));
    assert!(store.collection("users").contains_key("u-old"));
    assert!(store.collection("billingItems").contains_key("4001"));
    assert!(store.collection("patientPackages").contains_key("pk1"));
}

#[test]
fn restore_replaces_and_prunes() {
    let mut source = MemoryStore::new();
    source.insert("patients", "1", json!({"name": "A"}));
    let outcome = Exporter::with_options(&mut source, export_options())
        .export()
        .unwrap();

    let mut target = MemoryStore::new();
    target.insert("patients", "1", json!({"name": "OLD"}));
    target.insert("patients", "2", json!({"name": "B"}));
    import(&mut target, outcome.document).unwrap();

    let patients = target.collection("patients");
    assert_eq!(patients.len(), 1);
    assert_eq!(patients["1"]["name"], "A");
    assert!(!patients.contains_key("2"));
}

mod common;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::thread;

use sheet_crud::{
    config::Settings,
    data::{RecordData, ScalarKind},
    error::{AppError, Result},
    generate::{GenerateRequest, Generator},
    model::{FieldMode, FieldModel, FieldSpec},
    store::{JsonStore, ListQuery, Record, RecordPage, RecordStore, Scope, SpecStatus, SpecStore},
};

use common::record;

/// Delegates to a store but rejects one specific `create_batch` call.
struct FlakyRecords<'a> {
    inner: &'a JsonStore,
    fail_on_batch: usize,
    batches: AtomicUsize,
}

impl RecordStore for FlakyRecords<'_> {
    fn list(&self, scope: &Scope, query: &ListQuery) -> Result<RecordPage> {
        self.inner.list(scope, query)
    }

    fn create(&self, scope: &Scope, data: RecordData) -> Result<Record> {
        self.inner.create(scope, data)
    }

    fn create_batch(&self, scope: &Scope, rows: Vec<RecordData>) -> Result<usize> {
        let call = self.batches.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on_batch {
            return Err(AppError::storage("simulated outage"));
        }
        self.inner.create_batch(scope, rows)
    }

    fn fetch(&self, scope: &Scope, id: &str) -> Result<Record> {
        self.inner.fetch(scope, id)
    }

    fn update(&self, scope: &Scope, id: &str, data: RecordData) -> Result<Record> {
        self.inner.update(scope, id, data)
    }

    fn soft_delete(&self, scope: &Scope, id: &str) -> Result<()> {
        self.inner.soft_delete(scope, id)
    }
}

fn model() -> FieldModel {
    let mut status = FieldSpec::new("Status", FieldMode::Fixed, ScalarKind::String);
    status.fixed_options = Some(vec!["Open".into(), "Closed".into()]);
    FieldModel {
        app_name: "Tickets".into(),
        primary_field_key: "Title".into(),
        fields: vec![
            FieldSpec::new("Title", FieldMode::Primary, ScalarKind::String),
            status,
        ],
        updated_at: None,
    }
}

fn rows(count: usize) -> Vec<RecordData> {
    (0..count)
        .map(|i| {
            let status = if i % 2 == 0 { "Open" } else { "Closed" };
            let title = format!("Ticket {i}");
            record(&[("Title", title.as_str()), ("Status", status)])
        })
        .collect()
}

fn request(model: &FieldModel, rows: Vec<RecordData>, activate: bool) -> GenerateRequest<'_> {
    GenerateRequest {
        app_slug: "tickets",
        app_name: "Tickets",
        model,
        rows,
        activate,
    }
}

#[test]
fn partial_import_still_activates_the_spec() {
    let store = JsonStore::in_memory();
    let flaky = FlakyRecords {
        inner: &store,
        fail_on_batch: 3,
        batches: AtomicUsize::new(0),
    };
    let model = model();
    let report = Generator::new(&store, &flaky, &Settings::default())
        .with_chunk_size(200)
        .generate(request(&model, rows(1000), true))
        .expect("generation succeeds despite a lost chunk");

    assert_eq!(report.spec.version, 1);
    assert_eq!(report.spec.status, SpecStatus::Active);
    assert_eq!(report.import.attempted, 1000);
    assert_eq!(report.import.imported, 800);
    assert_eq!(report.import.failed_chunks, 1);
    assert!(matches!(
        report.import.as_warning(),
        Some(AppError::ImportPartialFailure {
            imported: 800,
            attempted: 1000,
            failed_chunks: 1
        })
    ));

    let page = store
        .list(&Scope::new("tickets", 1), &ListQuery::default())
        .unwrap();
    assert_eq!(page.total, 800);
    assert_eq!(store.active("tickets").unwrap().version, 1);
}

#[test]
fn regeneration_creates_a_fresh_scope_and_archives_the_old_spec() {
    let store = JsonStore::in_memory();
    let model = model();
    let generator = Generator::new(&store, &store, &Settings::default());
    generator.generate(request(&model, rows(5), true)).unwrap();
    let second = generator.generate(request(&model, rows(3), true)).unwrap();

    assert_eq!(second.spec.version, 2);
    let statuses = store
        .versions("tickets")
        .unwrap()
        .iter()
        .map(|s| (s.version, s.status))
        .collect::<Vec<_>>();
    assert_eq!(statuses, vec![(1, SpecStatus::Archived), (2, SpecStatus::Active)]);

    let v1 = store.list(&Scope::new("tickets", 1), &ListQuery::default()).unwrap();
    let v2 = store.list(&Scope::new("tickets", 2), &ListQuery::default()).unwrap();
    assert_eq!((v1.total, v2.total), (5, 3));
}

#[test]
fn activating_twice_is_idempotent() {
    let store = JsonStore::in_memory();
    let model = model();
    Generator::new(&store, &store, &Settings::default())
        .generate(request(&model, rows(2), false))
        .unwrap();
    let first = store.activate("tickets", 1).unwrap();
    let again = store.activate("tickets", 1).unwrap();
    assert_eq!(first.status, SpecStatus::Active);
    assert_eq!(again.status, SpecStatus::Active);
    assert_eq!(
        store
            .versions("tickets")
            .unwrap()
            .iter()
            .filter(|s| s.status == SpecStatus::Active)
            .count(),
        1
    );
}

#[test]
fn activating_a_missing_version_fails() {
    let store = JsonStore::in_memory();
    let err = store.activate("tickets", 7).unwrap_err();
    assert!(matches!(err, AppError::SpecNotFound(_)));
}

#[test]
fn concurrent_generations_receive_distinct_versions() {
    let store = Arc::new(JsonStore::in_memory());
    let handles = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let model = model();
                Generator::new(store.as_ref(), store.as_ref(), &Settings::default())
                    .generate(request(&model, rows(10), false))
                    .map(|report| report.spec.version)
            })
        })
        .collect::<Vec<_>>();

    let mut versions = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread").expect("generate"))
        .collect::<Vec<_>>();
    versions.sort_unstable();
    assert_eq!(versions, (1..=8).collect::<Vec<u32>>());

    for version in 1..=8 {
        let page = store
            .list(&Scope::new("tickets", version), &ListQuery::default())
            .unwrap();
        assert_eq!(page.total, 10);
    }
}

#[test]
fn file_backed_workspace_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let model = model();
    {
        let store = JsonStore::open(dir.path()).unwrap();
        Generator::new(&store, &store, &Settings::default())
            .generate(request(&model, rows(4), true))
            .unwrap();
    }
    let reopened = JsonStore::open(dir.path()).unwrap();
    let active = reopened.active("tickets").unwrap();
    assert_eq!(active.version, 1);
    assert_eq!(active.spec.model.primary_field_key, "Title");
    let page = reopened
        .list(&Scope::new("tickets", 1), &ListQuery::default())
        .unwrap();
    assert_eq!(page.total, 4);
}

#[test]
fn separate_stores_on_one_workspace_assign_distinct_versions() {
    let dir = tempfile::tempdir().unwrap();
    let model = model();
    let first = JsonStore::open(dir.path()).unwrap();
    let second = JsonStore::open(dir.path()).unwrap();

    let a = Generator::new(&first, &first, &Settings::default())
        .generate(request(&model, rows(3), true))
        .unwrap();
    let b = Generator::new(&second, &second, &Settings::default())
        .generate(request(&model, rows(2), true))
        .unwrap();
    assert_eq!((a.spec.version, b.spec.version), (1, 2));

    let reopened = JsonStore::open(dir.path()).unwrap();
    let versions = reopened
        .versions("tickets")
        .unwrap()
        .iter()
        .map(|s| (s.version, s.status))
        .collect::<Vec<_>>();
    assert_eq!(versions, vec![(1, SpecStatus::Archived), (2, SpecStatus::Active)]);
    let v1 = reopened.list(&Scope::new("tickets", 1), &ListQuery::default()).unwrap();
    let v2 = reopened.list(&Scope::new("tickets", 2), &ListQuery::default()).unwrap();
    assert_eq!((v1.total, v2.total), (3, 2));
    // The stale first handle sees the second store's writes too.
    assert_eq!(first.active("tickets").unwrap().version, 2);
}

#[test]
fn threads_with_their_own_store_handles_never_share_a_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();
    let handles = (0..4)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let store = JsonStore::open(&path).expect("open workspace");
                let model = model();
                Generator::new(&store, &store, &Settings::default())
                    .generate(request(&model, rows(5), false))
                    .map(|report| report.spec.version)
            })
        })
        .collect::<Vec<_>>();

    let mut versions = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread").expect("generate"))
        .collect::<Vec<_>>();
    versions.sort_unstable();
    assert_eq!(versions, vec![1, 2, 3, 4]);

    let store = JsonStore::open(&path).unwrap();
    assert_eq!(store.versions("tickets").unwrap().len(), 4);
    for version in 1..=4 {
        let page = store
            .list(&Scope::new("tickets", version), &ListQuery::default())
            .unwrap();
        assert_eq!(page.total, 5);
    }
}

#[test]
fn ignored_columns_are_not_imported() {
    let store = JsonStore::in_memory();
    let mut model = model();
    model
        .fields
        .push(FieldSpec::new("Secret", FieldMode::Ignore, ScalarKind::String));
    let rows = vec![record(&[("Title", "Leak"), ("Status", "Open"), ("Secret", "ssn-123")])];
    Generator::new(&store, &store, &Settings::default())
        .generate(request(&model, rows, true))
        .unwrap();

    let page = store
        .list(&Scope::new("tickets", 1), &ListQuery::default())
        .unwrap();
    assert_eq!(page.total, 1);
    assert!(!page.records[0].data.contains_key("Secret"));
    assert_eq!(page.records[0].data["Title"], "Leak");
}

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use serde_json::json;
use sheet_crud::classify::Classifier;
use sheet_crud::data::RecordData;
use sheet_crud::layout::LayoutBuilder;
use sheet_crud::store::{JsonStore, ListQuery, RecordStore, Scope};

fn generate_rows(rows: usize) -> (Vec<String>, Vec<RecordData>) {
    let headers = ["Name", "Status", "Major", "Notes", "Joined"].map(String::from).to_vec();
    let data = (0..rows)
        .map(|i| {
            let mut row = RecordData::new();
            row.insert("Name".into(), json!(format!("Student {i}")));
            row.insert("Status".into(), json!(["Active", "Alumni", "Paused"][i % 3]));
            row.insert("Major".into(), json!(format!("Major {}", i % 25)));
            row.insert("Notes".into(), json!(format!("note {}", i * 7)));
            row.insert("Joined".into(), json!(format!("2024-01-{:02}", i % 28 + 1)));
            row
        })
        .collect();
    (headers, data)
}

fn bench_classify(c: &mut Criterion) {
    let (headers, rows) = generate_rows(5_000);
    let classifier = Classifier::default();
    let mut group = c.benchmark_group("classify");
    group.bench_function("sample_and_classify", |b| {
        b.iter(|| classifier.classify(&headers, &rows))
    });
    let model = classifier.classify(&headers, &rows);
    group.bench_function("build_layout", |b| {
        b.iter(|| LayoutBuilder::default().build("students", "Students", &model, 1))
    });
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let (_, rows) = generate_rows(5_000);
    let scope = Scope::new("students", 1);
    c.bench_function("search_primary", |b| {
        b.iter_batched(
            || {
                let store = JsonStore::in_memory();
                store.create_batch(&scope, rows.clone()).expect("seed rows");
                store
            },
            |store| {
                store
                    .list(&scope, &ListQuery::search("Name", "student 42"))
                    .expect("list")
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_classify, bench_search);
criterion_main!(benches);

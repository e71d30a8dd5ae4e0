mod support;

use exchange_repository::{
    AggregationConfig, AggregationRecord, AggregationRepository, AggregationStore,
    InMemoryBackend, Value,
};
#[cfg(feature = "json-file")]
use exchange_repository::{IdempotentConfig, IdempotentRepository, IdempotentStore, JsonFileBackend};

fn text_config() -> AggregationConfig {
    AggregationConfig::default()
        .with_store_body_as_text(true)
        .with_text_header_names(["companyName"])
}

#[test]
fn remove_then_confirm_logs_the_completed_group() {
    let repo = AggregationStore::new(InMemoryBackend::new(), text_config()).unwrap();
    let done = AggregationRecord::new("ABCDE").with_header("companyName", "Acme");
    repo.add("123", &done).unwrap();

    assert!(repo.remove("123").unwrap());
    assert!(repo.confirm("123", Some(&done)).unwrap());

    assert!(repo.get("123").unwrap().is_none());
    assert_eq!(repo.recover("123").unwrap(), Some(done));
}

#[test]
fn confirm_after_remove_without_record_is_harmless() {
    let repo = AggregationStore::new(InMemoryBackend::new(), text_config()).unwrap();
    repo.add("123", &AggregationRecord::new("A")).unwrap();
    repo.remove("123").unwrap();

    assert!(!repo.confirm("123", None).unwrap());
    assert!(repo.recover("123").unwrap().is_none());
}

#[test]
fn repeated_identical_rounds_each_reach_the_log() {
    let aggregator = support::aggregator::ConcatAggregator::new(
        AggregationStore::new(InMemoryBackend::new(), AggregationConfig::default()).unwrap(),
        5,
    );
    for _ in 0..2 {
        for body in ["A", "B", "C", "D", "E"] {
            aggregator.process("123", AggregationRecord::new(body)).unwrap();
        }
    }

    assert_eq!(aggregator.emitted().len(), 2);
    let history = aggregator.repo().completed("123").unwrap();
    assert_eq!(history.len(), 2);
    assert!(history
        .iter()
        .all(|entry| entry.record.body == Value::from("ABCDE")));
}

#[test]
fn recover_returns_the_latest_completion() {
    let repo = AggregationStore::new(InMemoryBackend::new(), AggregationConfig::default()).unwrap();
    repo.complete("k", &AggregationRecord::new("first")).unwrap();
    repo.complete("other", &AggregationRecord::new("noise")).unwrap();
    repo.complete("k", &AggregationRecord::new("second")).unwrap();

    assert_eq!(
        repo.recover("k").unwrap().map(|record| record.body),
        Some(Value::from("second"))
    );
    assert_eq!(repo.scan().unwrap(), vec!["k".to_string(), "other".to_string()]);
    assert_eq!(repo.completed("k").unwrap().len(), 2);
}

#[cfg(feature = "json-file")]
#[test]
fn state_survives_reopening_the_file() {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    {
        let backend = JsonFileBackend::open(&path).unwrap();
        let repo = AggregationStore::new(backend.clone(), text_config()).unwrap();
        let seen = IdempotentStore::new(backend, IdempotentConfig::default());

        repo.add("open", &AggregationRecord::new("AB").with_header("companyName", "Acme"))
            .unwrap();
        repo.add("done", &AggregationRecord::new("ABCDE")).unwrap();
        repo.complete("done", &AggregationRecord::new("ABCDE")).unwrap();
        assert!(seen.add("/inbox/report.txt").unwrap());
    }

    let backend = JsonFileBackend::open(&path).unwrap();
    let repo = AggregationStore::new(backend.clone(), text_config()).unwrap();
    let seen = IdempotentStore::new(backend, IdempotentConfig::default());

    assert_eq!(
        repo.get("open").unwrap(),
        Some(AggregationRecord::new("AB").with_header("companyName", "Acme"))
    );
    assert_eq!(repo.keys().unwrap(), vec!["open".to_string()]);
    assert_eq!(
        repo.recover("done").unwrap(),
        Some(AggregationRecord::new("ABCDE"))
    );
    assert!(!seen.add("/inbox/report.txt").unwrap());

    // Versioning continues where it left off.
    assert!(repo
        .add("open", &AggregationRecord::new("ABC"))
        .unwrap()
        .is_some());
}

#[cfg(feature = "json-file")]
#[test]
fn corrupt_file_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    std::fs::write(&path, b"not json").unwrap();

    assert!(matches!(
        JsonFileBackend::open(&path),
        Err(exchange_repository::RepositoryError::Storage(_))
    ));
}

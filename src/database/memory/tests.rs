use super::*;
use crate::documents::{ChunkType, EntityType};
use serde_json::json;

const DIM: usize = 3;

fn embedded(id: &str, abbreviation: &str) -> Document {
    let mut doc = Document::new(
        id.to_string(),
        EntityType::Team,
        id.to_string(),
        ChunkType::Profile,
        json!({"abbreviation": abbreviation}),
        format!("Team {}", abbreviation),
    );
    doc.embedding = Some(vec![0.5; DIM]);
    doc
}

#[tokio::test]
async fn inserts_new_and_skips_unchanged() {
    let store = MemoryVectorStore::new(DIM);

    let first = store
        .upsert_documents(&[embedded("a", "AAA"), embedded("b", "BBB")])
        .await
        .expect("insert succeeds");
    assert_eq!(first, UpsertSummary { submitted: 2, written: 2 });

    let second = store
        .upsert_documents(&[embedded("a", "AAA")])
        .await
        .expect("noop upsert succeeds");
    assert_eq!(second.written, 0);
    assert_eq!(store.revision("a"), Some(1));
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn updates_only_when_hash_differs() {
    let store = MemoryVectorStore::new(DIM);
    store
        .upsert_documents(&[embedded("a", "AAA")])
        .await
        .expect("insert succeeds");
    let inserted_at = store.updated_at("a").expect("row exists");

    let summary = store
        .upsert_documents(&[embedded("a", "ZZZ")])
        .await
        .expect("update succeeds");

    assert_eq!(summary.written, 1);
    assert_eq!(store.revision("a"), Some(2));
    assert!(store.updated_at("a").expect("row exists") >= inserted_at);
    assert_eq!(
        store.get("a").map(|d| d.content_json["abbreviation"].clone()),
        Some(json!("ZZZ"))
    );
}

#[tokio::test]
async fn invalid_document_rejects_whole_call() {
    let store = MemoryVectorStore::new(DIM);
    let mut missing_embedding = embedded("c", "CCC");
    missing_embedding.embedding = None;

    let result = store
        .upsert_documents(&[embedded("a", "AAA"), missing_embedding])
        .await;

    assert!(matches!(result, Err(PipelineError::Document(_))));
    assert!(store.is_empty());
}

#[tokio::test]
async fn wrong_dimension_is_never_stored() {
    let store = MemoryVectorStore::new(DIM);
    let mut short = embedded("a", "AAA");
    short.embedding = Some(vec![1.0]);

    assert!(store.upsert_documents(&[short]).await.is_err());
    assert!(store.get("a").is_none());
}

#[tokio::test]
async fn duplicate_ids_are_rejected() {
    let store = MemoryVectorStore::new(DIM);

    let result = store
        .upsert_documents(&[embedded("a", "AAA"), embedded("a", "BBB")])
        .await;

    assert!(result.is_err());
    assert!(store.is_empty());
}

#[tokio::test]
async fn seeded_hashes_are_reported() {
    let doc = embedded("a", "AAA");
    let hashes = HashMap::from([("a".to_string(), doc.content_hash.clone())]);
    let store = MemoryVectorStore::with_hashes(DIM, hashes.clone());

    assert_eq!(store.get_existing_hashes().await.expect("hashes"), hashes);
    assert!(store.get("a").is_none());

    let summary = store.upsert_documents(&[doc]).await.expect("upsert");
    assert_eq!(summary.written, 0);
}

#[tokio::test]
async fn simulated_failure_applies_nothing() {
    let store = MemoryVectorStore::new(DIM);
    store.fail_next_upsert();

    assert!(store.upsert_documents(&[embedded("a", "AAA")]).await.is_err());
    assert!(store.is_empty());
    assert_eq!(store.upsert_calls(), 1);

    store
        .upsert_documents(&[embedded("a", "AAA")])
        .await
        .expect("next upsert succeeds");
    assert_eq!(store.len(), 1);
}

use super::*;
use serde_json::json;

fn sample_document() -> Document {
    Document::new(
        "team_1_profile".to_string(),
        EntityType::Team,
        "1".to_string(),
        ChunkType::Profile,
        json!({"name": "Boston Celtics", "abbreviation": "BOS"}),
        "The Boston Celtics (BOS)".to_string(),
    )
}

#[test]
fn canonical_json_sorts_nested_keys() {
    let value = json!({
        "zeta": 1,
        "alpha": {"d": true, "b": [{"y": 1, "x": 2}]},
    });

    assert_eq!(
        canonical_json(&value),
        r#"{"alpha":{"b":[{"x":2,"y":1}],"d":true},"zeta":1}"#
    );
}

#[test]
fn hash_ignores_key_insertion_order() {
    let mut first = Map::new();
    first.insert("b".to_string(), json!(2));
    first.insert("a".to_string(), json!(1));

    let mut second = Map::new();
    second.insert("a".to_string(), json!(1));
    second.insert("b".to_string(), json!(2));

    assert_eq!(
        hash_content(&canonical_json(&Value::Object(first))),
        hash_content(&canonical_json(&Value::Object(second)))
    );
}

#[test]
fn hash_changes_with_content() {
    let original = sample_document();
    let mut changed_json = original.content_json.clone();
    changed_json["abbreviation"] = json!("BSN");

    let changed = Document::new(
        original.id.clone(),
        original.entity_type,
        original.entity_id.clone(),
        original.chunk_type,
        changed_json,
        original.content_text.clone(),
    );

    assert_ne!(original.content_hash, changed.content_hash);
    assert_eq!(original.content_hash.len(), 64);
}

#[test]
fn stale_hash_is_detected() {
    let mut document = sample_document();
    assert!(document.hash_is_current());

    document.content_json["abbreviation"] = json!("XXX");
    assert!(!document.hash_is_current());
}

#[test]
fn writable_requires_embedding_of_exact_dimension() {
    let mut document = sample_document();
    assert!(document.check_writable(3).is_err());
    assert!(!document.is_embedded(3));

    document.embedding = Some(vec![0.1, 0.2]);
    let err = document.check_writable(3).expect_err("wrong dimension must be rejected");
    assert!(err.contains("dimension 2"));

    document.embedding = Some(vec![0.1, 0.2, 0.3]);
    assert!(document.check_writable(3).is_ok());
    assert!(document.is_embedded(3));
}

#[test]
fn entity_type_labels() {
    assert_eq!(EntityType::Boxscore.as_str(), "boxscore");
    assert_eq!(EntityType::Team.to_string(), "teams");
    assert_eq!(EntityType::parse("game"), Some(EntityType::Game));
    assert_eq!(EntityType::parse("games"), None);
    assert_eq!(
        EntityType::ALL,
        [
            EntityType::Team,
            EntityType::Player,
            EntityType::Game,
            EntityType::Boxscore
        ]
    );
}

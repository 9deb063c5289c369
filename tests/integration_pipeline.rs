#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end runs against a mocked embedding service and the in-memory store
// Run with: cargo test --test integration_pipeline

use async_trait::async_trait;
use nba_embeddings::Result;
use nba_embeddings::config::Config;
use nba_embeddings::database::{DataSource, MemoryVectorStore, VectorStore};
use nba_embeddings::documents::{EntityType, Record};
use nba_embeddings::embeddings::OllamaClient;
use nba_embeddings::indexer::EmbeddingPipeline;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIMENSION: u32 = 8;
const FAILING_TEAM_NAME: &str = "Unreachables";

#[derive(Default)]
struct FixtureSource {
    records: Mutex<HashMap<EntityType, Vec<Record>>>,
}

impl FixtureSource {
    fn set(&self, entity: EntityType, values: Vec<Value>) {
        let records = values
            .into_iter()
            .filter_map(|value| value.as_object().cloned())
            .collect();
        self.records
            .lock()
            .expect("fixture lock")
            .insert(entity, records);
    }
}

#[async_trait]
impl DataSource for FixtureSource {
    async fn fetch_records(&self, entity: EntityType) -> Result<Vec<Record>> {
        Ok(self
            .records
            .lock()
            .expect("fixture lock")
            .get(&entity)
            .cloned()
            .unwrap_or_default())
    }
}

struct Fixture {
    server: MockServer,
    source: Arc<FixtureSource>,
    store: Arc<MemoryVectorStore>,
    pipeline: EmbeddingPipeline,
}

async fn fixture(batch_size: usize) -> Fixture {
    let server = MockServer::start().await;

    // Any prompt mentioning the failing team gets a persistent server error
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .and(body_string_contains(FAILING_TEAM_NAME))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "embedding": vec![0.25_f32; DIMENSION as usize] })),
        )
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.ollama.url = server.uri();
    config.ollama.embedding_dimension = DIMENSION;
    config.pipeline.max_workers = 3;
    config.pipeline.retry_delay_secs = 0.01;
    config.pipeline.batch_size = batch_size;

    let client = OllamaClient::new(&config).expect("client builds");
    let source = Arc::new(FixtureSource::default());
    let store = Arc::new(MemoryVectorStore::new(config.embedding_dimension()));
    let pipeline = EmbeddingPipeline::new(
        Arc::clone(&source) as Arc<dyn DataSource>,
        Arc::new(client),
        Arc::clone(&store) as Arc<dyn VectorStore>,
    )
    .with_batch_size(config.pipeline.batch_size);

    Fixture {
        server,
        source,
        store,
        pipeline,
    }
}

async fn embedding_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/api/embeddings")
        .count()
}

fn teams(second_abbreviation: &str) -> Vec<Value> {
    [
        (1, "Boston", "Celtics", "BOS"),
        (2, "Denver", "Nuggets", second_abbreviation),
        (3, "Miami", "Heat", "MIA"),
    ]
    .into_iter()
    .map(|(id, city, name, abbreviation)| {
        json!({
            "team_id": id,
            "city": city,
            "name": name,
            "abbreviation": abbreviation,
            "conference": if id == 2 { "West" } else { "East" },
            "division": "Northwest",
        })
    })
    .collect()
}

fn players() -> Vec<Value> {
    vec![
        json!({
            "player_id": 201,
            "first_name": "Jayson",
            "last_name": "Tatum",
            "team_id": 1,
            "team_name": "Celtics",
            "position": "F",
            "height": 80,
            "weight": 210,
            "draft_year": 2017,
            "season_exp": 7,
        }),
        json!({
            "player_id": 202,
            "first_name": "Nikola",
            "last_name": "Jokic",
            "team_id": 2,
            "team_name": "Nuggets",
            "position": "C",
            "height": null,
            "weight": null,
            "draft_year": null,
            "season_exp": null,
        }),
    ]
}

fn game(id: i64, home_team_name: &str) -> Value {
    json!({
        "game_id": id,
        "season": 2024,
        "game_date": "2024-12-25T00:00:00",
        "home_team_id": 1,
        "away_team_id": 3,
        "home_team_name": home_team_name,
        "away_team_name": "Heat",
        "home_points": 110,
        "away_points": 104,
        "winning_team_id": 1,
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn second_run_embeds_only_the_changed_team() {
    let f = fixture(128).await;
    f.source.set(EntityType::Team, teams("DEN"));

    let first = f.pipeline.run(&[EntityType::Team]).await;
    assert_eq!(first.count(EntityType::Team), 3);
    assert_eq!(embedding_requests(&f.server).await, 3);

    f.source.set(EntityType::Team, teams("DNV"));
    let second = f.pipeline.run(&[EntityType::Team]).await;

    assert!(second.is_success());
    assert_eq!(second.count(EntityType::Team), 1);
    assert_eq!(embedding_requests(&f.server).await, 4);

    let updated = f.store.get("team_2_profile").expect("team 2 stored");
    assert!(updated.content_text.contains("(DNV)"));
    assert_eq!(f.store.revision("team_2_profile"), Some(2));
    assert_eq!(f.store.revision("team_1_profile"), Some(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn unchanged_data_makes_no_embedding_calls() {
    let f = fixture(128).await;
    f.source.set(EntityType::Team, teams("DEN"));
    f.source.set(EntityType::Player, players());

    let first = f.pipeline.run(&EntityType::ALL).await;
    assert_eq!(first.total_processed(), 5);
    let requests_after_first = embedding_requests(&f.server).await;

    let second = f.pipeline.run(&EntityType::ALL).await;

    assert!(second.is_success());
    assert_eq!(second.total_processed(), 0);
    assert_eq!(embedding_requests(&f.server).await, requests_after_first);
    assert_eq!(f.store.upsert_calls(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_game_batch_leaves_other_entity_types_committed() {
    let f = fixture(2).await;
    f.source.set(EntityType::Team, teams("DEN"));
    f.source.set(EntityType::Player, players());
    f.source.set(
        EntityType::Game,
        vec![game(1, "Celtics"), game(2, "Celtics"), game(3, FAILING_TEAM_NAME)],
    );

    let report = f.pipeline.run(&EntityType::ALL).await;

    assert!(!report.is_success());
    assert!(report.count(EntityType::Team) > 0);
    assert!(report.count(EntityType::Player) > 0);
    assert_eq!(report.count(EntityType::Game), 0);
    assert_eq!(report.failures.len(), 1);
    assert!(
        report.failures[0]
            .error
            .contains("Embedding batch 2/2 for games failed")
    );
    assert_eq!(report.skipped, [EntityType::Boxscore]);

    let hashes = f.store.get_existing_hashes().await.expect("hashes");
    assert_eq!(hashes.len(), 5);
    assert!(!hashes.keys().any(|id| id.starts_with("game_")));
}

#[tokio::test(flavor = "multi_thread")]
async fn stored_vectors_have_configured_dimension() {
    let f = fixture(128).await;
    f.source.set(EntityType::Player, players());

    f.pipeline.run(&[EntityType::Player]).await;

    for id in ["player_201_profile", "player_202_profile"] {
        let document = f.store.get(id).expect("player stored");
        assert!(document.is_embedded(DIMENSION as usize));
        assert!(document.hash_is_current());
    }
}

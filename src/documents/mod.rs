// Documents module
// Canonical document model shared by the builders, the change detector and the stores

#[cfg(test)]
mod tests;

pub mod builder;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub use builder::DocumentBuilder;

/// A flat source row: column name to value
pub type Record = Map<String, Value>;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Team,
    Player,
    Game,
    Boxscore,
}

impl EntityType {
    /// Processing order for a full run
    pub const ALL: [EntityType; 4] = [
        EntityType::Team,
        EntityType::Player,
        EntityType::Game,
        EntityType::Boxscore,
    ];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Team => "team",
            EntityType::Player => "player",
            EntityType::Game => "game",
            EntityType::Boxscore => "boxscore",
        }
    }

    /// Label used in run reports, e.g. `teams: 3`
    #[inline]
    pub fn plural(self) -> &'static str {
        match self {
            EntityType::Team => "teams",
            EntityType::Player => "players",
            EntityType::Game => "games",
            EntityType::Boxscore => "boxscores",
        }
    }

    #[inline]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "team" => Some(EntityType::Team),
            "player" => Some(EntityType::Player),
            "game" => Some(EntityType::Game),
            "boxscore" => Some(EntityType::Boxscore),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Profile,
    Summary,
    Performance,
}

impl ChunkType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkType::Profile => "profile",
            ChunkType::Summary => "summary",
            ChunkType::Performance => "performance",
        }
    }
}

/// One embeddable unit built from a single source record.
///
/// `content_hash` is derived from [`canonical_json`] at construction time and
/// the same canonical string is what the stores persist, so the hash always
/// describes the stored content.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub game_id: Option<i64>,
    pub team_id: Option<i64>,
    pub player_id: Option<i64>,
    pub chunk_type: ChunkType,
    pub content_json: Value,
    pub content_text: String,
    pub content_hash: String,
    pub season: Option<i32>,
    pub game_date: Option<NaiveDate>,
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    #[inline]
    pub fn new(
        id: String,
        entity_type: EntityType,
        entity_id: String,
        chunk_type: ChunkType,
        content_json: Value,
        content_text: String,
    ) -> Self {
        let content_hash = hash_content(&canonical_json(&content_json));
        Self {
            id,
            entity_type,
            entity_id,
            game_id: None,
            team_id: None,
            player_id: None,
            chunk_type,
            content_json,
            content_text,
            content_hash,
            season: None,
            game_date: None,
            embedding: None,
        }
    }

    #[inline]
    pub fn with_keys(
        mut self,
        game_id: Option<i64>,
        team_id: Option<i64>,
        player_id: Option<i64>,
    ) -> Self {
        self.game_id = game_id;
        self.team_id = team_id;
        self.player_id = player_id;
        self
    }

    #[inline]
    pub fn with_schedule(mut self, season: Option<i32>, game_date: Option<NaiveDate>) -> Self {
        self.season = season;
        self.game_date = game_date;
        self
    }

    /// Canonical serialization of `content_json`, the exact text that gets persisted
    #[inline]
    pub fn canonical_content(&self) -> String {
        canonical_json(&self.content_json)
    }

    /// True when `content_hash` still matches the canonical content
    #[inline]
    pub fn hash_is_current(&self) -> bool {
        hash_content(&self.canonical_content()) == self.content_hash
    }

    /// True when an embedding of exactly `dimension` values is attached
    #[inline]
    pub fn is_embedded(&self, dimension: usize) -> bool {
        self.embedding
            .as_ref()
            .is_some_and(|embedding| embedding.len() == dimension)
    }

    /// Reject documents that must never reach a store
    #[inline]
    pub fn check_writable(&self, dimension: usize) -> Result<(), String> {
        if !self.hash_is_current() {
            return Err(format!(
                "Document {} has a content hash that does not match its content",
                self.id
            ));
        }

        match &self.embedding {
            None => Err(format!("Document {} has no embedding", self.id)),
            Some(embedding) if embedding.len() != dimension => Err(format!(
                "Document {} has embedding of dimension {} (expected {})",
                self.id,
                embedding.len(),
                dimension
            )),
            Some(_) => Ok(()),
        }
    }
}

/// Serialize a JSON value with object keys sorted at every level
#[inline]
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(map.len());
            for key in keys {
                out.insert(key.clone(), sorted(&map[key.as_str()]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Change-detection hash, hex encoded. Not used for anything security related.
#[inline]
pub fn hash_content(canonical: &str) -> String {
    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

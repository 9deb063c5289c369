use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::debug;

use crate::{PipelineError, Result};
use crate::database::DataSource;
use crate::documents::{EntityType, Record};

// Each query wraps its row in to_jsonb so every entity comes back as a flat
// column -> value map regardless of the source column types.

const TEAMS_QUERY: &str = r#"
SELECT to_jsonb(r) FROM (
    SELECT team_id, city, name, abbreviation, conference, division
    FROM teams
) r
ORDER BY r.team_id
"#;

const PLAYERS_QUERY: &str = r#"
SELECT to_jsonb(r) FROM (
    SELECT
        p.player_id, p.team_id, p.first_name, p.last_name,
        p.position, p.height, p.weight, p.birth_date,
        p.draft_year, p.season_exp,
        t.name AS team_name, t.abbreviation AS team_abbr
    FROM players p
    LEFT JOIN teams t ON p.team_id = t.team_id
) r
ORDER BY r.player_id
"#;

const GAMES_QUERY: &str = r#"
SELECT to_jsonb(r) FROM (
    SELECT
        g.game_id, g.season, g.game_timestamp, g.game_timestamp::date AS game_date,
        g.home_team_id, g.away_team_id,
        g.home_points, g.away_points, g.winning_team_id,
        ht.name AS home_team_name, ht.abbreviation AS home_team_abbr,
        at.name AS away_team_name, at.abbreviation AS away_team_abbr
    FROM games g
    JOIN teams ht ON g.home_team_id = ht.team_id
    JOIN teams at ON g.away_team_id = at.team_id
) r
ORDER BY r.game_timestamp DESC, r.game_id
"#;

const BOXSCORES_QUERY: &str = r#"
SELECT to_jsonb(r) FROM (
    SELECT
        b.game_id, b.person_id AS player_id, b.team_id,
        b.starter, b.seconds, b.points,
        b.fg2_made, b.fg2_attempted,
        b.fg3_made, b.fg3_attempted,
        b.ft_made, b.ft_attempted,
        b.offensive_reb, b.defensive_reb,
        b.assists, b.steals, b.blocks, b.turnovers,
        b.defensive_fouls, b.offensive_fouls,
        p.first_name, p.last_name, p.position,
        t.name AS team_name, t.abbreviation AS team_abbr,
        g.season, g.game_timestamp, g.game_timestamp::date AS game_date
    FROM player_box_scores b
    JOIN players p ON b.person_id = p.player_id
    JOIN teams t ON b.team_id = t.team_id
    JOIN games g ON b.game_id = g.game_id
) r
ORDER BY r.game_timestamp DESC, r.points DESC NULLS LAST, r.game_id, r.player_id
"#;

/// Reads source rows from the relational NBA tables
#[derive(Debug, Clone)]
pub struct PgDataSource {
    pool: PgPool,
}

impl PgDataSource {
    #[inline]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) fn query_for(entity: EntityType) -> &'static str {
        match entity {
            EntityType::Team => TEAMS_QUERY,
            EntityType::Player => PLAYERS_QUERY,
            EntityType::Game => GAMES_QUERY,
            EntityType::Boxscore => BOXSCORES_QUERY,
        }
    }
}

#[async_trait]
impl DataSource for PgDataSource {
    async fn fetch_records(&self, entity: EntityType) -> Result<Vec<Record>> {
        let rows: Vec<Json<Record>> = sqlx::query_scalar(Self::query_for(entity))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::Database(format!("Failed to extract {}: {}", entity, e)))?;

        debug!("Extracted {} {} records", rows.len(), entity.as_str());
        Ok(rows.into_iter().map(|Json(record)| record).collect())
    }
}


use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde_json::{Value, json};

use super::{ChunkType, Document, EntityType, Record};

/// Renders source records into documents.
///
/// Every builder is deterministic: the same record always produces the same
/// id, text and content hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentBuilder;

impl DocumentBuilder {
    #[inline]
    pub fn new() -> Self {
        Self
    }

    #[inline]
    pub fn build(&self, entity: EntityType, record: &Record) -> Result<Document> {
        match entity {
            EntityType::Team => self.build_team_document(record),
            EntityType::Player => self.build_player_document(record),
            EntityType::Game => self.build_game_document(record),
            EntityType::Boxscore => self.build_boxscore_document(record),
        }
    }

    #[inline]
    pub fn build_team_document(&self, team: &Record) -> Result<Document> {
        let team_id = required_i64(team, "team_id")?;
        let city = required_str(team, "city")?;
        let name = required_str(team, "name")?;
        let abbreviation = required_str(team, "abbreviation")?;
        let conference = required_str(team, "conference")?;
        let division = required_str(team, "division")?;

        let full_name = format!("{} {}", city, name);
        let structured = json!({
            "entity_type": "team",
            "team_id": team_id,
            "name": full_name,
            "abbreviation": abbreviation,
            "conference": conference,
            "division": division,
        });

        let content_text = [
            format!("The {} ({})", full_name, abbreviation),
            format!("plays in the {} Conference", conference),
            format!("and the {} Division.", division),
            format!(
                "Team info: {} - {} - {} {}",
                abbreviation, full_name, conference, division
            ),
        ]
        .join(" ");

        Ok(Document::new(
            format!("team_{}_profile", team_id),
            EntityType::Team,
            team_id.to_string(),
            ChunkType::Profile,
            structured,
            content_text,
        )
        .with_keys(None, Some(team_id), None))
    }

    #[inline]
    pub fn build_player_document(&self, player: &Record) -> Result<Document> {
        let player_id = required_i64(player, "player_id")?;
        let full_name = format!(
            "{} {}",
            required_str(player, "first_name")?,
            required_str(player, "last_name")?
        );
        let team_id = optional_i64(player, "team_id");
        let team_name = optional_str(player, "team_name");
        let position = optional_str(player, "position");
        let height = optional_i64(player, "height");
        let weight = optional_i64(player, "weight");
        let draft_year = optional_i64(player, "draft_year");
        let season_exp = optional_i64(player, "season_exp");

        let structured = json!({
            "entity_type": "player",
            "player_id": player_id,
            "name": full_name,
            "team_id": team_id,
            "team_name": team_name,
            "position": position,
            "height_inches": height,
            "weight_lbs": weight,
            "draft_year": draft_year,
            "experience_years": season_exp,
        });

        let mut text_parts = vec![full_name.clone()];
        if let Some(position) = position.filter(|p| !p.is_empty()) {
            text_parts.push(format!("plays {}", position));
        }
        if let Some(team_name) = team_name.filter(|t| !t.is_empty()) {
            text_parts.push(format!("for the {}", team_name));
        }
        if let (Some(height), Some(weight)) = (height.filter(|h| *h != 0), weight.filter(|w| *w != 0))
        {
            text_parts.push(format!(
                "Height: {} inches, Weight: {} lbs",
                height, weight
            ));
        }
        if let Some(year) = draft_year.filter(|y| *y != 0) {
            text_parts.push(format!("Drafted in {}", year));
        }
        if let Some(exp) = season_exp.filter(|e| *e != 0) {
            text_parts.push(format!("Experience: {} seasons", exp));
        }
        let content_text = format!("{}.", text_parts.join(". "));

        Ok(Document::new(
            format!("player_{}_profile", player_id),
            EntityType::Player,
            player_id.to_string(),
            ChunkType::Profile,
            structured,
            content_text,
        )
        .with_keys(None, team_id, Some(player_id)))
    }

    #[inline]
    pub fn build_game_document(&self, game: &Record) -> Result<Document> {
        let game_id = required_i64(game, "game_id")?;
        let season = required_i64(game, "season")?;
        let game_date = required_date(game, "game_date")?;
        let home_id = required_i64(game, "home_team_id")?;
        let away_id = required_i64(game, "away_team_id")?;
        let home_name = required_str(game, "home_team_name")?;
        let away_name = required_str(game, "away_team_name")?;
        let home_points = optional_i64(game, "home_points");
        let away_points = optional_i64(game, "away_points");
        let winner_id = optional_i64(game, "winning_team_id");

        let structured = json!({
            "entity_type": "game",
            "game_id": game_id,
            "season": season,
            "date": game_date.to_string(),
            "home_team": {
                "id": home_id,
                "name": home_name,
                "points": home_points,
            },
            "away_team": {
                "id": away_id,
                "name": away_name,
                "points": away_points,
            },
            "winner_id": winner_id,
        });

        let winner_name = match winner_id {
            Some(id) if id == home_id => Some(home_name),
            Some(_) => Some(away_name),
            None => match (home_points, away_points) {
                (Some(home), Some(away)) if home > away => Some(home_name),
                (Some(home), Some(away)) if away > home => Some(away_name),
                _ => None,
            },
        };

        let mut text_parts = vec![
            format!("Game on {}:", game_date),
            format!("{} at {}.", away_name, home_name),
            format!(
                "Final score: {} {},",
                home_name,
                render_points(home_points)
            ),
            format!("{} {}.", away_name, render_points(away_points)),
        ];
        if let Some(winner) = winner_name {
            text_parts.push(format!("{} won the game.", winner));
        }
        text_parts.push(format!("Season: {}", season));
        let content_text = text_parts.join(" ");

        Ok(Document::new(
            format!("game_{}_summary", game_id),
            EntityType::Game,
            game_id.to_string(),
            ChunkType::Summary,
            structured,
            content_text,
        )
        .with_keys(Some(game_id), None, None)
        .with_schedule(Some(to_season(season)?), Some(game_date)))
    }

    #[inline]
    pub fn build_boxscore_document(&self, boxscore: &Record) -> Result<Document> {
        let game_id = required_i64(boxscore, "game_id")?;
        let player_id = required_i64(boxscore, "player_id")?;
        let team_id = required_i64(boxscore, "team_id")?;
        let player_name = format!(
            "{} {}",
            required_str(boxscore, "first_name")?,
            required_str(boxscore, "last_name")?
        );
        let team_name = required_str(boxscore, "team_name")?;
        let team_abbr = required_str(boxscore, "team_abbr")?;
        let game_date = required_date(boxscore, "game_date")?;
        let season = required_i64(boxscore, "season")?;
        let starter = flag(boxscore, "starter");

        // Raw counts stay null in the JSON when missing; derived values treat missing as zero
        let raw = |key: &str| optional_i64(boxscore, key);
        let stat = |key: &str| raw(key).unwrap_or(0);
        let total_rebounds = stat("offensive_reb") + stat("defensive_reb");
        let minutes = round_tenth(stat("seconds") as f64 / 60.0);
        let (points, assists, steals, blocks) =
            (stat("points"), stat("assists"), stat("steals"), stat("blocks"));
        let (fg2_made, fg2_attempted) = (stat("fg2_made"), stat("fg2_attempted"));
        let (fg3_made, fg3_attempted) = (stat("fg3_made"), stat("fg3_attempted"));
        let (ft_made, ft_attempted) = (stat("ft_made"), stat("ft_attempted"));

        let structured = json!({
            "entity_type": "boxscore",
            "game_id": game_id,
            "player_id": player_id,
            "team_id": team_id,
            "player_name": player_name,
            "team_name": team_name,
            "date": game_date.to_string(),
            "season": season,
            "starter": starter,
            "minutes": minutes,
            "points": raw("points"),
            "rebounds": total_rebounds,
            "assists": raw("assists"),
            "steals": raw("steals"),
            "blocks": raw("blocks"),
            "turnovers": raw("turnovers"),
            "fg2": {"made": raw("fg2_made"), "attempted": raw("fg2_attempted")},
            "fg3": {"made": raw("fg3_made"), "attempted": raw("fg3_attempted")},
            "ft": {"made": raw("ft_made"), "attempted": raw("ft_attempted")},
        });

        let starter_text = if starter { "Started" } else { "Off the bench" };
        let mut text_parts = vec![
            format!("{} ({}) on {}:", player_name, team_abbr, game_date),
            format!("{}, played {:.1} minutes.", starter_text, minutes),
            format!(
                "Stats: {} points, {} rebounds,",
                points, total_rebounds
            ),
            format!(
                "{} assists, {} steals, {} blocks.",
                assists, steals, blocks
            ),
        ];
        for (label, made, attempted) in [
            ("2PT", fg2_made, fg2_attempted),
            ("3PT", fg3_made, fg3_attempted),
            ("FT", ft_made, ft_attempted),
        ] {
            if attempted > 0 {
                let pct = round_tenth(100.0 * made as f64 / attempted as f64);
                text_parts.push(format!("{}: {}/{} ({:.1}%)", label, made, attempted, pct));
            }
        }
        let content_text = text_parts.join(" ");

        Ok(Document::new(
            format!("boxscore_{}_{}", game_id, player_id),
            EntityType::Boxscore,
            format!("{}_{}", game_id, player_id),
            ChunkType::Performance,
            structured,
            content_text,
        )
        .with_keys(Some(game_id), Some(team_id), Some(player_id))
        .with_schedule(Some(to_season(season)?), Some(game_date)))
    }
}

fn required_i64(record: &Record, key: &str) -> Result<i64> {
    optional_i64(record, key).ok_or_else(|| anyhow!("Record is missing integer field '{}'", key))
}

fn optional_i64(record: &Record, key: &str) -> Option<i64> {
    match record.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn required_str<'a>(record: &'a Record, key: &str) -> Result<&'a str> {
    optional_str(record, key).ok_or_else(|| anyhow!("Record is missing text field '{}'", key))
}

fn optional_str<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

fn required_date(record: &Record, key: &str) -> Result<NaiveDate> {
    let raw = required_str(record, key)?;
    // Timestamps are accepted too; only the calendar date is kept
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .with_context(|| format!("Field '{}' is not a date: {}", key, raw))
}

fn flag(record: &Record, key: &str) -> bool {
    match record.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
        Some(Value::String(s)) => matches!(s.as_str(), "true" | "t" | "1"),
        _ => false,
    }
}

fn to_season(season: i64) -> Result<i32> {
    i32::try_from(season).with_context(|| format!("Season out of range: {}", season))
}

fn render_points(points: Option<i64>) -> String {
    points.map_or_else(|| "N/A".to_string(), |p| p.to_string())
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

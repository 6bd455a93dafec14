//! Operator-maintained configuration: games, bet types, odds and draws
//!
//! A catalog is a TOML document. Seeding inserts whatever is missing and
//! leaves existing rows alone, so a catalog can be re-applied.

use crate::common::types::{DrawId, GameId};
use crate::errors::{ConfigurationError, LottoError, LottoResult, StorageError};
use crate::games::types::{BetTypeDefinition, Draw, GameDefinition, OddsEntry};
use crate::storage::Store;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Draw to schedule when seeding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrawSeed {
    pub id: DrawId,
    pub draw_number: String,
    pub game_id: GameId,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Catalog {
    pub games: Vec<GameDefinition>,
    pub bet_types: Vec<BetTypeDefinition>,
    pub odds: Vec<OddsEntry>,
    pub draws: Vec<DrawSeed>,
}

/// Rows created by a seed run
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SeedReport {
    pub games: usize,
    pub bet_types: usize,
    pub odds: usize,
    pub draws: usize,
}

impl Catalog {
    pub fn load(path: impl AsRef<Path>) -> LottoResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::LoadFailed(format!("{}: {}", path.display(), e))
        })?;
        let catalog: Catalog = toml::from_str(&text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// The 5/90 game with every bet type of the matching table and the
    /// full-match odds used in production.
    pub fn standard() -> Self {
        let game = GameDefinition {
            id: 1,
            code: "NLA590".to_string(),
            name: "NLA 5/90".to_string(),
            number_range_start: 1,
            number_range_end: 90,
            min_numbers: 1,
            max_numbers: 5,
            min_stake: dec!(1.00),
            max_stake: dec!(100.00),
            draw_cadence: "daily 19:00".to_string(),
            is_active: true,
        };

        let bet_types = [
            (1, "direct_one", "Direct One", 1, 1, dec!(40.00)),
            (2, "direct_two", "Direct Two", 2, 2, dec!(240.00)),
            (3, "direct_three", "Direct Three", 3, 3, dec!(2100.00)),
            (4, "direct_four", "Direct Four", 4, 4, dec!(6000.00)),
            (5, "direct_five", "Direct Five", 5, 5, dec!(44000.00)),
            (6, "perm_two", "Perm Two", 2, 5, dec!(240.00)),
            (7, "perm_three", "Perm Three", 3, 5, dec!(2100.00)),
            (8, "against", "Against", 1, 5, dec!(10.00)),
            (9, "banker", "Banker", 1, 5, dec!(100.00)),
        ]
        .into_iter()
        .map(|(id, key, display_name, min, max, base)| BetTypeDefinition {
            id,
            key: key.to_string(),
            display_name: display_name.to_string(),
            min_numbers_required: min,
            max_numbers_allowed: max,
            base_odds: Some(base),
            is_active: true,
        })
        .collect();

        let odds = [
            (1, 1, dec!(40.00)),
            (2, 2, dec!(240.00)),
            (3, 3, dec!(2100.00)),
            (4, 4, dec!(6000.00)),
            (5, 5, dec!(44000.00)),
            (6, 2, dec!(240.00)),
            (7, 3, dec!(2100.00)),
        ]
        .into_iter()
        .map(|(bet_type_id, picked, multiplier)| OddsEntry {
            game_id: game.id,
            bet_type_id,
            numbers_picked: picked,
            numbers_matched: picked,
            payout_multiplier: multiplier,
        })
        .collect();

        Self {
            games: vec![game],
            bet_types,
            odds,
            draws: Vec::new(),
        }
    }

    /// Structural checks on definitions before anything is written.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for game in &self.games {
            if game.number_range_start >= game.number_range_end {
                return Err(invalid(format!("game {}", game.id), "number range is empty"));
            }
            if game.min_numbers > game.max_numbers {
                return Err(invalid(format!("game {}", game.id), "min_numbers exceeds max_numbers"));
            }
            if game.min_stake <= Decimal::ZERO || game.min_stake > game.max_stake {
                return Err(invalid(format!("game {}", game.id), "stake bounds are inconsistent"));
            }
        }
        for bet_type in &self.bet_types {
            if bet_type.min_numbers_required == 0 {
                return Err(invalid(format!("bet type {}", bet_type.key), "min_numbers_required must be at least 1"));
            }
            if bet_type.min_numbers_required > bet_type.max_numbers_allowed {
                return Err(invalid(
                    format!("bet type {}", bet_type.key),
                    "min_numbers_required exceeds max_numbers_allowed",
                ));
            }
            if bet_type.base_odds.is_some_and(|odds| odds < Decimal::ZERO) {
                return Err(invalid(format!("bet type {}", bet_type.key), "base odds are negative"));
            }
        }
        for entry in &self.odds {
            if entry.payout_multiplier < Decimal::ZERO {
                return Err(invalid("odds".to_string(), "payout multiplier is negative"));
            }
        }
        for draw in &self.draws {
            if draw.opens_at >= draw.closes_at {
                return Err(invalid(format!("draw {}", draw.draw_number), "window closes before it opens"));
            }
        }
        Ok(())
    }

    /// Insert missing rows; rows that already exist are skipped.
    pub async fn seed(&self, store: &dyn Store) -> LottoResult<SeedReport> {
        self.validate()?;
        let mut report = SeedReport::default();

        for game in &self.games {
            report.games += created(store.insert_game(game.clone()).await)?;
        }
        for bet_type in &self.bet_types {
            report.bet_types += created(store.insert_bet_type(bet_type.clone()).await)?;
        }
        for entry in &self.odds {
            report.odds += created(store.insert_odds(entry.clone()).await)?;
        }
        for seed in &self.draws {
            let draw = Draw::scheduled(seed.id, seed.draw_number.clone(), seed.game_id, seed.opens_at, seed.closes_at);
            report.draws += created(store.insert_draw(draw).await)?;
        }

        info!(
            games = report.games,
            bet_types = report.bet_types,
            odds = report.odds,
            draws = report.draws,
            "catalog seeded"
        );
        Ok(report)
    }
}

fn invalid(field: String, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

fn created(result: LottoResult<()>) -> LottoResult<usize> {
    match result {
        Ok(()) => Ok(1),
        Err(LottoError::Storage(StorageError::AlreadyExists { entity, id })) => {
            debug!(entity, id = %id, "already present, skipped");
            Ok(0)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::io::Write;

    #[test]
    fn test_standard_catalog_is_valid() {
        let catalog = Catalog::standard();
        assert!(catalog.validate().is_ok());
        assert_eq!(catalog.bet_types.len(), 9);
        assert_eq!(catalog.odds.len(), 7);
    }

    #[tokio::test]
    async fn test_seed_is_repeatable() {
        let store = MemoryStore::new();
        let first = Catalog::standard().seed(&store).await.unwrap();
        assert_eq!(first.bet_types, 9);

        let second = Catalog::standard().seed(&store).await.unwrap();
        assert_eq!(second, SeedReport::default());
        assert_eq!(store.odds_for_game(1).await.unwrap().len(), 7);
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[[games]]
id = 1
code = "NLA590"
name = "NLA 5/90"
number_range_start = 1
number_range_end = 90
min_numbers = 1
max_numbers = 5
min_stake = "1.00"
max_stake = "100.00"
draw_cadence = "daily 19:00"

[[bet_types]]
id = 1
key = "direct_one"
display_name = "Direct One"
min_numbers_required = 1
max_numbers_allowed = 1
base_odds = "40.00"

[[draws]]
id = 1
draw_number = "NLA-0001"
game_id = 1
opens_at = "2024-05-01T08:00:00Z"
closes_at = "2024-05-01T18:00:00Z"
"#
        )
        .unwrap();

        let catalog = Catalog::load(file.path()).unwrap();
        assert_eq!(catalog.games[0].max_stake, dec!(100.00));
        assert_eq!(catalog.bet_types[0].base_odds, Some(dec!(40.00)));
        assert!(catalog.bet_types[0].is_active);
        assert_eq!(catalog.draws.len(), 1);
        assert!(catalog.odds.is_empty());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut catalog = Catalog::standard();
        let at = Utc::now();
        catalog.draws.push(DrawSeed {
            id: 1,
            draw_number: "NLA-0001".to_string(),
            game_id: 1,
            opens_at: at,
            closes_at: at,
        });
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_zero_minimum_rejected() {
        let mut catalog = Catalog::standard();
        catalog.bet_types[7].min_numbers_required = 0;
        let err = catalog.validate().unwrap_err();
        assert!(err.to_string().contains("min_numbers_required must be at least 1"));
    }
}

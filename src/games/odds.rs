//! Payout multiplier lookup
//!
//! Exact `(game, bet type, picked, matched)` entries win; otherwise the
//! bet type's base odds apply. Only a bet type without base odds and
//! without an exact entry is a configuration error.

use crate::common::types::GameId;
use crate::errors::ConfigurationError;
use crate::games::types::{BetTypeDefinition, OddsEntry, OddsKey};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// In-memory snapshot of the odds configuration
#[derive(Debug, Clone, Default)]
pub struct OddsTable {
    entries: HashMap<OddsKey, Decimal>,
}

impl OddsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = OddsEntry>,
    {
        let entries = entries
            .into_iter()
            .map(|entry| (entry.key(), entry.payout_multiplier))
            .collect();
        Self { entries }
    }

    pub fn insert(&mut self, entry: OddsEntry) {
        self.entries.insert(entry.key(), entry.payout_multiplier);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact entry only, no fallback.
    pub fn exact(
        &self,
        game: GameId,
        bet_type: &BetTypeDefinition,
        numbers_picked: u32,
        numbers_matched: u32,
    ) -> Option<Decimal> {
        let key = OddsKey {
            game_id: game,
            bet_type_id: bet_type.id,
            numbers_picked,
            numbers_matched,
        };
        self.entries.get(&key).copied()
    }

    /// Exact entry, falling back to the bet type's base odds.
    pub fn lookup(
        &self,
        game: GameId,
        bet_type: &BetTypeDefinition,
        numbers_picked: u32,
        numbers_matched: u32,
    ) -> Result<Decimal, ConfigurationError> {
        self.exact(game, bet_type, numbers_picked, numbers_matched)
            .or(bet_type.base_odds)
            .ok_or_else(|| ConfigurationError::MissingMultiplier {
                game,
                bet_type: bet_type.key.clone(),
                picked: numbers_picked,
                matched: numbers_matched,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bet_type(base_odds: Option<Decimal>) -> BetTypeDefinition {
        BetTypeDefinition {
            id: 2,
            key: "direct_two".to_string(),
            display_name: "Direct Two".to_string(),
            min_numbers_required: 2,
            max_numbers_allowed: 2,
            base_odds,
            is_active: true,
        }
    }

    #[test]
    fn test_exact_entry_wins_over_base_odds() {
        let table = OddsTable::from_entries(vec![OddsEntry {
            game_id: 1,
            bet_type_id: 2,
            numbers_picked: 2,
            numbers_matched: 2,
            payout_multiplier: dec!(240.00),
        }]);

        let multiplier = table.lookup(1, &bet_type(Some(dec!(90))), 2, 2).unwrap();
        assert_eq!(multiplier, dec!(240.00));
    }

    #[test]
    fn test_falls_back_to_base_odds() {
        let table = OddsTable::new();
        let multiplier = table.lookup(1, &bet_type(Some(dec!(90))), 2, 2).unwrap();
        assert_eq!(multiplier, dec!(90));
    }

    #[test]
    fn test_other_game_entry_does_not_apply() {
        let table = OddsTable::from_entries(vec![OddsEntry {
            game_id: 9,
            bet_type_id: 2,
            numbers_picked: 2,
            numbers_matched: 2,
            payout_multiplier: dec!(240.00),
        }]);
        assert_eq!(table.lookup(1, &bet_type(Some(dec!(5))), 2, 2).unwrap(), dec!(5));
    }

    #[test]
    fn test_missing_everything_is_configuration_error() {
        let table = OddsTable::new();
        let err = table.lookup(1, &bet_type(None), 2, 2).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingMultiplier { picked: 2, matched: 2, .. }));
    }
}

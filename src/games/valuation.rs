//! Potential winnings at placement time

use crate::common::money::apply_multiplier;
use crate::common::types::LottoNumber;
use crate::errors::ConfigurationError;
use crate::games::odds::OddsTable;
use crate::games::types::{BetTypeDefinition, GameDefinition};
use rust_decimal::Decimal;

/// Payout assuming every selected number matches, rounded half-up to
/// currency precision.
pub fn potential_winnings(
    odds: &OddsTable,
    stake_amount: Decimal,
    game: &GameDefinition,
    bet_type: &BetTypeDefinition,
    selected_numbers: &[LottoNumber],
) -> Result<Decimal, ConfigurationError> {
    let picked = selected_numbers.len() as u32;
    let multiplier = odds.lookup(game.id, bet_type, picked, picked)?;
    Ok(apply_multiplier(stake_amount, multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::OddsEntry;
    use rust_decimal_macros::dec;

    fn game() -> GameDefinition {
        GameDefinition {
            id: 1,
            code: "NLA590".to_string(),
            name: "NLA 5/90".to_string(),
            number_range_start: 1,
            number_range_end: 90,
            min_numbers: 1,
            max_numbers: 5,
            min_stake: dec!(1.00),
            max_stake: dec!(1000.00),
            draw_cadence: "daily 19:00".to_string(),
            is_active: true,
        }
    }

    fn direct_two() -> BetTypeDefinition {
        BetTypeDefinition {
            id: 2,
            key: "direct_two".to_string(),
            display_name: "Direct Two".to_string(),
            min_numbers_required: 2,
            max_numbers_allowed: 2,
            base_odds: Some(dec!(90.00)),
            is_active: true,
        }
    }

    #[test]
    fn test_uses_full_match_odds_entry() {
        let odds = OddsTable::from_entries(vec![OddsEntry {
            game_id: 1,
            bet_type_id: 2,
            numbers_picked: 2,
            numbers_matched: 2,
            payout_multiplier: dec!(240.00),
        }]);

        let value = potential_winnings(&odds, dec!(10.00), &game(), &direct_two(), &[5, 12]).unwrap();
        assert_eq!(value, dec!(2400.00));
    }

    #[test]
    fn test_falls_back_to_base_odds() {
        let odds = OddsTable::new();
        let value = potential_winnings(&odds, dec!(10.00), &game(), &direct_two(), &[5, 12]).unwrap();
        assert_eq!(value, dec!(900.00));
    }

    #[test]
    fn test_rounds_to_minor_units() {
        let mut bet_type = direct_two();
        bet_type.base_odds = Some(dec!(1.255));
        let value = potential_winnings(&OddsTable::new(), dec!(1.00), &game(), &bet_type, &[5, 12]).unwrap();
        assert_eq!(value, dec!(1.26));
    }
}

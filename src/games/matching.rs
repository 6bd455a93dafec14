//! Matching engine
//!
//! Pure win/loss evaluation of a bet's selected numbers against a draw's
//! winning numbers. Every bet type key resolves to a [`BetKind`], and each
//! kind owns one evaluator function. Unknown keys fall through to the
//! generic intersection-count rule.
//!
//! Evaluation never fails: wrong arity or missing winning numbers produce a
//! loss with `numbers_matched = 0`, and the reason is reported in
//! [`MatchResult::malformed`] for logging.

use crate::common::money::apply_multiplier;
use crate::common::types::{GameId, LottoNumber};
use crate::errors::ConfigurationError;
use crate::games::odds::OddsTable;
use crate::games::types::BetTypeDefinition;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Closed set of wagering modes the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetKind {
    DirectOne,
    DirectTwo,
    DirectThree,
    DirectFour,
    DirectFive,
    PermTwo,
    PermThree,
    /// Any other `perm*` key; threshold comes from the bet type
    Perm,
    Against,
    Banker,
    /// Unrecognised key; intersection count against the bet type minimum
    Generic,
}

/// Canonical key table. Keys not listed here resolve through the `perm`
/// prefix rule or to [`BetKind::Generic`].
const KEY_TABLE: [(&str, BetKind); 9] = [
    ("direct_one", BetKind::DirectOne),
    ("direct_two", BetKind::DirectTwo),
    ("direct_three", BetKind::DirectThree),
    ("direct_four", BetKind::DirectFour),
    ("direct_five", BetKind::DirectFive),
    ("perm_two", BetKind::PermTwo),
    ("perm_three", BetKind::PermThree),
    ("against", BetKind::Against),
    ("banker", BetKind::Banker),
];

type Evaluator = fn(&MatchInput<'_>) -> MatchResult;

impl BetKind {
    pub const ALL: [BetKind; 11] = [
        BetKind::DirectOne,
        BetKind::DirectTwo,
        BetKind::DirectThree,
        BetKind::DirectFour,
        BetKind::DirectFive,
        BetKind::PermTwo,
        BetKind::PermThree,
        BetKind::Perm,
        BetKind::Against,
        BetKind::Banker,
        BetKind::Generic,
    ];

    pub fn from_key(key: &str) -> Self {
        let key = key.trim().to_ascii_lowercase();
        KEY_TABLE
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, kind)| *kind)
            .unwrap_or_else(|| {
                if key.starts_with("perm") {
                    BetKind::Perm
                } else {
                    BetKind::Generic
                }
            })
    }

    /// Multiplier the variant pays regardless of the odds table.
    pub fn fixed_multiplier(self) -> Option<Decimal> {
        match self {
            BetKind::DirectOne => Some(dec!(40.00)),
            BetKind::DirectTwo | BetKind::PermTwo => Some(dec!(240.00)),
            BetKind::DirectThree | BetKind::PermThree => Some(dec!(2100.00)),
            BetKind::DirectFour => Some(dec!(6000.00)),
            BetKind::DirectFive => Some(dec!(44000.00)),
            BetKind::Against => Some(dec!(10.00)),
            BetKind::Banker => Some(dec!(100.00)),
            BetKind::Perm | BetKind::Generic => None,
        }
    }

    fn evaluator(self) -> Evaluator {
        match self {
            BetKind::DirectOne => evaluate_direct_one,
            BetKind::DirectTwo
            | BetKind::DirectThree
            | BetKind::DirectFour
            | BetKind::DirectFive => evaluate_direct,
            BetKind::PermTwo | BetKind::PermThree | BetKind::Perm => evaluate_perm,
            BetKind::Against => evaluate_against,
            BetKind::Banker | BetKind::Generic => evaluate_threshold,
        }
    }

    /// Exact selection size for the direct variants.
    fn direct_arity(self) -> Option<usize> {
        match self {
            BetKind::DirectOne => Some(1),
            BetKind::DirectTwo => Some(2),
            BetKind::DirectThree => Some(3),
            BetKind::DirectFour => Some(4),
            BetKind::DirectFive => Some(5),
            _ => None,
        }
    }
}

impl fmt::Display for BetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = KEY_TABLE
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(name, _)| *name)
            .unwrap_or(match self {
                BetKind::Perm => "perm",
                _ => "generic",
            });
        write!(f, "{}", name)
    }
}

/// Per-bet-type parameters the evaluators need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRules {
    pub min_numbers_required: u32,
    /// `direct_five` needs five winning numbers when set; four otherwise
    pub strict_direct_five: bool,
}

impl MatchRules {
    pub fn for_bet_type(bet_type: &BetTypeDefinition, strict_direct_five: bool) -> Self {
        Self {
            min_numbers_required: bet_type.min_numbers_required,
            strict_direct_five,
        }
    }
}

/// Why a bet was resolved as a loss without evaluating its rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MalformedBet {
    MissingWinningNumbers,
    NoSelection,
    WrongArity { expected: String, actual: usize },
    InsufficientWinningNumbers { required: usize, actual: usize },
}

impl fmt::Display for MalformedBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedBet::MissingWinningNumbers => write!(f, "winning numbers missing"),
            MalformedBet::NoSelection => write!(f, "no numbers selected"),
            MalformedBet::WrongArity { expected, actual } => {
                write!(f, "expected {} selected numbers, got {}", expected, actual)
            }
            MalformedBet::InsufficientWinningNumbers { required, actual } => {
                write!(f, "needs {} winning numbers, draw has {}", required, actual)
            }
        }
    }
}

/// Result of evaluating one bet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub won: bool,
    pub numbers_matched: u32,
    /// Fixed multiplier of the variant when won; zero otherwise
    pub payout_multiplier: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malformed: Option<MalformedBet>,
}

impl MatchResult {
    fn malformed(reason: MalformedBet) -> Self {
        Self {
            won: false,
            numbers_matched: 0,
            payout_multiplier: Decimal::ZERO,
            malformed: Some(reason),
        }
    }

    fn decided(kind: BetKind, won: bool, numbers_matched: u32) -> Self {
        let payout_multiplier = if won {
            kind.fixed_multiplier().unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };

        Self {
            won,
            numbers_matched,
            payout_multiplier,
            malformed: None,
        }
    }
}

struct MatchInput<'a> {
    kind: BetKind,
    selected: &'a [LottoNumber],
    winning: &'a [LottoNumber],
    rules: MatchRules,
}

impl MatchInput<'_> {
    fn intersection_size(&self) -> u32 {
        let winning: HashSet<LottoNumber> = self.winning.iter().copied().collect();
        let selected: HashSet<LottoNumber> = self.selected.iter().copied().collect();
        selected.intersection(&winning).count() as u32
    }
}

/// Evaluate a bet. `winning` is `None` until the draw publishes results.
pub fn evaluate(
    kind: BetKind,
    selected: &[LottoNumber],
    winning: Option<&[LottoNumber]>,
    rules: MatchRules,
) -> MatchResult {
    let winning = match winning {
        Some(numbers) if !numbers.is_empty() => numbers,
        _ => return MatchResult::malformed(MalformedBet::MissingWinningNumbers),
    };
    if selected.is_empty() {
        return MatchResult::malformed(MalformedBet::NoSelection);
    }

    let input = MatchInput {
        kind,
        selected,
        winning,
        rules,
    };
    (kind.evaluator())(&input)
}

/// Evaluate using a bet type definition's key and minimum.
pub fn evaluate_for_bet_type(
    bet_type: &BetTypeDefinition,
    selected: &[LottoNumber],
    winning: Option<&[LottoNumber]>,
    strict_direct_five: bool,
) -> MatchResult {
    evaluate(
        BetKind::from_key(&bet_type.key),
        selected,
        winning,
        MatchRules::for_bet_type(bet_type, strict_direct_five),
    )
}

// Position-sensitive: only the first drawn number counts.
fn evaluate_direct_one(input: &MatchInput<'_>) -> MatchResult {
    if input.selected.len() != 1 {
        return MatchResult::malformed(MalformedBet::WrongArity {
            expected: "1".to_string(),
            actual: input.selected.len(),
        });
    }

    let hit = input.selected[0] == input.winning[0];
    MatchResult::decided(input.kind, hit, u32::from(hit))
}

fn evaluate_direct(input: &MatchInput<'_>) -> MatchResult {
    let arity = input.kind.direct_arity().unwrap_or(0);
    if input.selected.len() != arity {
        return MatchResult::malformed(MalformedBet::WrongArity {
            expected: arity.to_string(),
            actual: input.selected.len(),
        });
    }

    // Only direct_five gates on the draw's size; the others count the intersection.
    if input.kind == BetKind::DirectFive {
        let required = if input.rules.strict_direct_five { 5 } else { 4 };
        if input.winning.len() < required {
            return MatchResult::malformed(MalformedBet::InsufficientWinningNumbers {
                required,
                actual: input.winning.len(),
            });
        }
    }

    let matched = input.intersection_size();
    MatchResult::decided(input.kind, matched as usize == arity, matched)
}

fn evaluate_perm(input: &MatchInput<'_>) -> MatchResult {
    if input.selected.len() < 2 {
        return MatchResult::malformed(MalformedBet::WrongArity {
            expected: ">=2".to_string(),
            actual: input.selected.len(),
        });
    }

    let threshold = match input.kind {
        BetKind::PermTwo => 2,
        BetKind::PermThree => 3,
        _ => input.rules.min_numbers_required.max(1),
    };
    let matched = input.intersection_size();
    MatchResult::decided(input.kind, matched >= threshold, matched)
}

fn evaluate_against(input: &MatchInput<'_>) -> MatchResult {
    let matched = input.intersection_size();
    MatchResult::decided(input.kind, matched == 0, matched)
}

/// Wins when at least `min_numbers_required` selected numbers were drawn.
/// A zero minimum is treated as one so a bet with no hits never wins;
/// `Catalog::validate` refuses such bet types at seeding.
fn evaluate_threshold(input: &MatchInput<'_>) -> MatchResult {
    let threshold = input.rules.min_numbers_required.max(1);
    let matched = input.intersection_size();
    MatchResult::decided(input.kind, matched >= threshold, matched)
}

/// Multiplier a winning bet is paid at: the variant's fixed multiplier when
/// it has one, else the odds table keyed by the actual match count, else
/// the bet type's base odds.
pub fn resolve_multiplier(
    result: &MatchResult,
    odds: &OddsTable,
    game: GameId,
    bet_type: &BetTypeDefinition,
    numbers_picked: u32,
) -> Result<Decimal, ConfigurationError> {
    if result.payout_multiplier > Decimal::ZERO {
        return Ok(result.payout_multiplier);
    }
    odds.lookup(game, bet_type, numbers_picked, result.numbers_matched)
}

/// Actual winnings for an evaluated bet; zero for losses.
pub fn actual_winnings(
    result: &MatchResult,
    stake_amount: Decimal,
    odds: &OddsTable,
    game: GameId,
    bet_type: &BetTypeDefinition,
    numbers_picked: u32,
) -> Result<Decimal, ConfigurationError> {
    if !result.won {
        return Ok(Decimal::ZERO);
    }
    let multiplier = resolve_multiplier(result, odds, game, bet_type, numbers_picked)?;
    Ok(apply_multiplier(stake_amount, multiplier))
}

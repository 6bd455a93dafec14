//! Unique reference generation for bet numbers and ledger entries
//!
//! References look like `WIN20240501120000A1B2C3D4`: a prefix, the UTC
//! timestamp to the second and eight upper-case hex characters of
//! randomness. Collisions are possible but rare; the ledger's unique
//! index catches them and callers regenerate.

use chrono::{DateTime, Utc};
use rand::RngCore;
use uuid::Builder;

use crate::common::clock::Clock;
use std::sync::Mutex;

/// Kind of record a reference identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Bet,
    Stake,
    Win,
    Refund,
}

impl ReferenceKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ReferenceKind::Bet => "BET",
            ReferenceKind::Stake => "STK",
            ReferenceKind::Win => "WIN",
            ReferenceKind::Refund => "RFD",
        }
    }
}

/// Build a reference from an explicit instant and random source.
pub fn generate_reference<R: RngCore + ?Sized>(
    kind: ReferenceKind,
    now: DateTime<Utc>,
    rng: &mut R,
) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    let random = Builder::from_random_bytes(bytes).into_uuid().simple().to_string();

    format!(
        "{}{}{}",
        kind.prefix(),
        now.format("%Y%m%d%H%M%S"),
        random[..8].to_uppercase()
    )
}

/// Shared generator binding a clock and a seeded random source.
pub struct ReferenceGenerator {
    clock: std::sync::Arc<dyn Clock>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl ReferenceGenerator {
    pub fn new(clock: std::sync::Arc<dyn Clock>, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            clock,
            rng: Mutex::new(rng),
        }
    }

    /// Generator backed by the thread-local OS-seeded RNG.
    pub fn from_entropy(clock: std::sync::Arc<dyn Clock>) -> Self {
        use rand::SeedableRng;
        Self::new(clock, Box::new(rand::rngs::StdRng::from_entropy()))
    }

    pub fn next(&self, kind: ReferenceKind) -> String {
        let now = self.clock.now();
        match self.rng.lock() {
            Ok(mut rng) => generate_reference(kind, now, rng.as_mut()),
            Err(poisoned) => generate_reference(kind, now, poisoned.into_inner().as_mut()),
        }
    }
}

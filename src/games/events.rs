//! Settlement notifications for downstream delivery

use crate::common::types::{BetId, DrawId, UserId};
use crate::games::types::BetOutcome;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Emitted once per applied settlement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettlementEvent {
    pub bet_id: BetId,
    pub user_id: UserId,
    pub draw_id: DrawId,
    pub outcome: BetOutcome,
    /// Winnings credited; zero for losses
    pub amount: Decimal,
}

#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivery is best effort; a failed hand-off never undoes settlement.
    async fn publish(&self, event: SettlementEvent);
}

/// Discards events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn publish(&self, _event: SettlementEvent) {}
}

/// Forwards events to a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<SettlementEvent>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<SettlementEvent>) -> Self {
        Self { sender }
    }

    /// Sink plus the receiving end, buffering up to `capacity` events.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SettlementEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn publish(&self, event: SettlementEvent) {
        let bet_id = event.bet_id;
        if self.sender.send(event).await.is_err() {
            warn!(bet_id, "settlement event receiver dropped");
        }
    }
}

use std::sync::Arc;

use tracing::{debug, info, warn};

use common::{Execution, Order, OrderExecutor, Position, RejectionReason, Result, TradeProposal};
use risk::{PositionTracker, Rejected};

/// What happened to one proposal.
#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    Opened(Position),
    Declined(Rejected),
}

/// Bridges accepted proposals to the order executor.
///
/// This is the ONLY component that calls `OrderExecutor::submit`. A
/// position is recorded only after the executor reports a fill.
pub struct ProposalExecutor {
    client: Arc<dyn OrderExecutor>,
}

impl ProposalExecutor {
    pub fn new(client: Arc<dyn OrderExecutor>) -> Self {
        Self { client }
    }

    /// Try to turn `proposal` into an open position.
    ///
    /// Tracker rejections are checked before anything is submitted. An
    /// `Err` from the executor itself is returned to the caller. The
    /// position takes the fill's price and size; stop and target stay as
    /// proposed.
    pub async fn execute(
        &self,
        tracker: &mut PositionTracker,
        proposal: &TradeProposal,
    ) -> Result<OpenOutcome> {
        if let Err(rejected) = tracker.can_open(&proposal.pair) {
            debug!(pair = %proposal.pair, reason = %rejected.reason, "Proposal discarded");
            return Ok(OpenOutcome::Declined(rejected));
        }

        let order = Order::for_proposal(proposal);
        info!(
            pair = %order.pair,
            side = %order.side,
            price = order.price,
            size = order.size,
            "Submitting order"
        );

        match self.client.submit(&order).await? {
            Execution::Filled(fill) => {
                info!(pair = %fill.pair, price = fill.fill_price, size = fill.size, "Order filled");
                let filled = TradeProposal {
                    entry_price: fill.fill_price,
                    size: fill.size,
                    ..proposal.clone()
                };
                match tracker.open(&filled) {
                    Ok(position) => Ok(OpenOutcome::Opened(position.clone())),
                    Err(rejected) => Ok(OpenOutcome::Declined(rejected)),
                }
            }
            Execution::Rejected { reason } => {
                warn!(pair = %order.pair, %reason, "Order rejected by executor");
                Ok(OpenOutcome::Declined(Rejected {
                    pair: order.pair,
                    reason: RejectionReason::Execution(reason),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;
    use common::{Fill, ProposalDiagnostics, Side};

    use super::*;

    /// Fills half a point above the limit at half the requested size.
    struct SlippingExecutor;

    #[async_trait]
    impl OrderExecutor for SlippingExecutor {
        async fn submit(&self, order: &Order) -> Result<Execution> {
            Ok(Execution::Filled(Fill {
                order_id: order.id.clone(),
                pair: order.pair.clone(),
                side: order.side,
                fill_price: order.price + 0.5,
                size: order.size / 2.0,
                timestamp: Utc::now(),
            }))
        }
    }

    struct RefusingExecutor;

    #[async_trait]
    impl OrderExecutor for RefusingExecutor {
        async fn submit(&self, _order: &Order) -> Result<Execution> {
            Ok(Execution::Rejected {
                reason: "post-only would cross".into(),
            })
        }
    }

    fn proposal(pair: &str) -> TradeProposal {
        TradeProposal {
            pair: pair.into(),
            side: Side::Long,
            certainty: 88,
            entry_price: 100.0,
            stop_loss: 98.8,
            take_profit: 102.2,
            size: 1.0,
            risk_usd: 1.2,
            reward_usd: 2.2,
            diagnostics: ProposalDiagnostics::default(),
        }
    }

    #[tokio::test]
    async fn position_records_the_fill_price_and_size() {
        let executor = ProposalExecutor::new(Arc::new(SlippingExecutor));
        let mut tracker = PositionTracker::new(3);

        let outcome = executor.execute(&mut tracker, &proposal("SOL_USDC")).await.unwrap();

        let position = match outcome {
            OpenOutcome::Opened(position) => position,
            other => panic!("expected an open, got {other:?}"),
        };
        assert_eq!(position.entry_price, 100.5);
        assert_eq!(position.size, 0.5);
        assert_eq!(position.stop_loss, 98.8);
        assert_eq!(position.take_profit, 102.2);
        assert_eq!(tracker.open_count(), 1);
    }

    #[tokio::test]
    async fn rejected_orders_leave_the_tracker_untouched() {
        let executor = ProposalExecutor::new(Arc::new(RefusingExecutor));
        let mut tracker = PositionTracker::new(3);

        let outcome = executor.execute(&mut tracker, &proposal("SOL_USDC")).await.unwrap();

        assert!(matches!(
            outcome,
            OpenOutcome::Declined(Rejected {
                reason: RejectionReason::Execution(_),
                ..
            })
        ));
        assert_eq!(tracker.open_count(), 0);
    }
}

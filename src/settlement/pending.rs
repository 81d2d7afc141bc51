// Aggregations over executed bundles and the bundle still to be proposed.

use tracing::{info, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::ledger::models::RootBundle;
use crate::ledger::RefundLedger;
use crate::settlement::BundleDataClient;

impl BundleDataClient {
    /// Refunds still owed for the most recent `bundle_lookback` fully
    /// executed bundles, newest first.
    ///
    /// Stops early when the hub has no older executed bundle.
    #[instrument(skip(self))]
    pub async fn get_pending_refunds_from_valid_bundles(&self, bundle_lookback: usize) -> AppResult<Vec<RefundLedger>> {
        if !self.hub_pool.is_updated() {
            return Err(AppError::ClientNotUpdated("hub pool client".to_string()));
        }

        let mut refunds = Vec::with_capacity(bundle_lookback);
        let mut before_block = self.hub_pool.latest_block_searched().saturating_add(1);

        while refunds.len() < bundle_lookback {
            let Some(bundle) = self.hub_pool.latest_fully_executed_root_bundle(before_block) else {
                warn!(
                    "Only found {} of {} executed bundles before block {}",
                    refunds.len(),
                    bundle_lookback,
                    before_block
                );
                break;
            };

            refunds.push(self.get_pending_refunds_from_bundle(&bundle).await?);
            before_block = bundle.block_number;
        }

        info!("💰 Loaded pending refunds for {} executed bundles", refunds.len());
        Ok(refunds)
    }

    /// Refunds of `bundle` not yet paid out
    #[instrument(skip(self, bundle), fields(bundle_block = bundle.block_number))]
    pub async fn get_pending_refunds_from_bundle(&self, bundle: &RootBundle) -> AppResult<RefundLedger> {
        let block_ranges = self.block_range_provider.implied_bundle_block_ranges(bundle)?;
        let result = self.load_data(&block_ranges, self.spoke_clients(), false).await?;
        self.deduct_executed_refunds(result.fills_to_refund, bundle).await
    }

    /// Refunds the next proposal would owe if it covered every block the
    /// spoke clients have seen so far
    #[instrument(skip(self))]
    pub async fn get_next_bundle_refunds(&self) -> AppResult<RefundLedger> {
        if !self.hub_pool.is_updated() {
            return Err(AppError::ClientNotUpdated("hub pool client".to_string()));
        }

        let block_ranges = self
            .block_range_provider
            .widest_possible_expected_block_ranges(self.spoke_clients(), self.hub_pool.latest_block_searched())?;
        let result = self.load_data(&block_ranges, self.spoke_clients(), false).await?;
        Ok(result.fills_to_refund)
    }
}

#[cfg(test)]
mod tests {
    use crate::adapters::snapshot::{ProposedRootBundle, SpokePoolSnapshot};
    use crate::error::AppError;
    use crate::ledger::get_total_refund;
    use crate::ledger::models::fixtures::{deposit, fill};
    use crate::ledger::models::*;
    use crate::settlement::tests::{client_for, snapshot, spoke, CHAIN_B, CHAIN_C, HUB};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn root(byte: &str) -> String {
        format!("0x{}", byte.repeat(32))
    }

    fn proposal(block_number: u64, ends: Vec<u64>, root_byte: &str, fully_executed: bool) -> ProposedRootBundle {
        ProposedRootBundle {
            bundle: RootBundle {
                block_number,
                relayer_refund_root: root(root_byte),
                bundle_evaluation_block_numbers: ends,
            },
            fully_executed,
        }
    }

    fn relayer() -> Address {
        Address::new("0xRelayer")
    }

    fn token_b() -> Address {
        Address::new("0xTokenB")
    }

    fn zero_fee_fill(d: &Deposit, amount: Decimal, block: u64) -> Fill {
        let mut f = fill(d, amount, amount, block);
        f.realized_lp_fee_pct = Decimal::ZERO;
        f
    }

    fn chain_b(fills: Vec<Fill>, executed: Vec<(u32, &str, Decimal)>) -> SpokePoolSnapshot {
        let mut snapshot = spoke(CHAIN_B, vec![], fills);
        for (root_bundle_id, root_byte, amount) in executed {
            snapshot.root_bundle_relays.push(RootBundleRelay {
                root_bundle_id,
                relayer_refund_root: root(root_byte),
                position: EventPosition::default(),
            });
            snapshot.relayer_refund_executions.push(RelayerRefundExecution {
                root_bundle_id,
                leaf_id: 0,
                chain_id: CHAIN_B,
                l2_token_address: token_b(),
                refund_addresses: vec![relayer()],
                refund_amounts: vec![amount],
                position: EventPosition::default(),
            });
        }
        snapshot
    }

    #[tokio::test]
    async fn test_lookback_stops_when_history_runs_out() {
        let d1 = deposit(HUB, CHAIN_B, 1, dec!(100), 10);
        let snapshot = snapshot(
            vec![
                spoke(HUB, vec![d1.clone()], vec![]),
                chain_b(vec![zero_fee_fill(&d1, dec!(100), 15)], vec![(0, "aa", dec!(60))]),
                spoke(CHAIN_C, vec![], vec![]),
            ],
            vec![proposal(100, vec![20, 20, 20], "aa", true)],
        );
        let client = client_for(&snapshot);

        let pending = client.get_pending_refunds_from_valid_bundles(2).await.unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].refunds_for(&relayer(), CHAIN_B, &token_b()), dec!(40));
    }

    #[tokio::test]
    async fn test_lookback_walks_back_through_executed_bundles() {
        let d1 = deposit(HUB, CHAIN_B, 1, dec!(100), 10);
        let d2 = deposit(HUB, CHAIN_B, 2, dec!(50), 30);
        let snapshot = snapshot(
            vec![
                spoke(HUB, vec![d1.clone(), d2.clone()], vec![]),
                chain_b(
                    vec![zero_fee_fill(&d1, dec!(100), 15), zero_fee_fill(&d2, dec!(50), 35)],
                    vec![(0, "aa", dec!(100)), (1, "bb", dec!(20))],
                ),
                spoke(CHAIN_C, vec![], vec![]),
            ],
            vec![
                proposal(100, vec![20, 20, 20], "aa", true),
                proposal(200, vec![40, 40, 40], "bb", true),
                proposal(300, vec![60, 60, 60], "cc", false),
            ],
        );
        let client = client_for(&snapshot);

        let pending = client.get_pending_refunds_from_valid_bundles(5).await.unwrap();

        assert_eq!(pending.len(), 2);
        // Newest first: bundle at 200 covers blocks 21..=40
        assert_eq!(pending[0].refunds_for(&relayer(), CHAIN_B, &token_b()), dec!(30));
        assert_eq!(pending[1].refunds_for(&relayer(), CHAIN_B, &token_b()), dec!(0));
        assert_eq!(get_total_refund(&pending, &relayer(), CHAIN_B, &token_b()), dec!(30));
    }

    #[tokio::test]
    async fn test_zero_lookback_loads_nothing() {
        let snapshot = snapshot(vec![], vec![proposal(100, vec![20, 20, 20], "aa", true)]);
        let client = client_for(&snapshot);

        let pending = client.get_pending_refunds_from_valid_bundles(0).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_next_bundle_refunds_cover_unproposed_blocks() {
        let d1 = deposit(HUB, CHAIN_B, 1, dec!(100), 10);
        let d2 = deposit(HUB, CHAIN_B, 2, dec!(50), 30);
        let snapshot = snapshot(
            vec![
                spoke(HUB, vec![d1.clone(), d2.clone()], vec![]),
                chain_b(vec![zero_fee_fill(&d1, dec!(100), 15), zero_fee_fill(&d2, dec!(50), 35)], vec![]),
                spoke(CHAIN_C, vec![], vec![]),
            ],
            vec![proposal(100, vec![20, 20, 20], "aa", true)],
        );
        let client = client_for(&snapshot);

        let next = client.get_next_bundle_refunds().await.unwrap();

        // Only the fill after the last proposal's end block
        assert_eq!(next.refunds_for(&relayer(), CHAIN_B, &token_b()), dec!(50));
        assert_eq!(next.entry(CHAIN_B, &token_b()).unwrap().fills.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_hub_is_fatal() {
        let mut stale = snapshot(vec![], vec![]);
        stale.hub_pool.is_updated = false;
        let client = client_for(&stale);

        assert!(matches!(
            client.get_pending_refunds_from_valid_bundles(1).await,
            Err(AppError::ClientNotUpdated(_))
        ));
        assert!(matches!(client.get_next_bundle_refunds().await, Err(AppError::ClientNotUpdated(_))));
    }
}

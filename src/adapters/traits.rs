use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::warn;

use crate::adapters::registry::SpokeClientRegistry;
use crate::error::AppResult;
use crate::ledger::models::*;

/// Executed refunds for one bundle on one chain: token -> relayer -> amount
pub type ExecutedRefunds = BTreeMap<Address, BTreeMap<Address, Decimal>>;

/// Hub chain protocol state
pub trait HubPoolClient: Send + Sync {
    fn is_updated(&self) -> bool;

    fn latest_block_searched(&self) -> u64;

    fn chain_id(&self) -> ChainId;

    /// Most recent root bundle, proposed strictly before `before_block`,
    /// whose leaves have all been executed
    fn latest_fully_executed_root_bundle(&self, before_block: u64) -> Option<RootBundle>;
}

/// Protocol configuration store
pub trait ConfigStoreClient: Send + Sync {
    fn is_updated(&self) -> bool;

    fn enabled_chains(&self, at_block: u64) -> Vec<ChainId>;

    /// First origin block at which deposits on `chain_id` are priced by the
    /// current fee model. `None` means the fee model was always active.
    fn fee_model_activation_block(&self, chain_id: ChainId) -> Option<u64>;
}

/// Per-chain spoke pool event store
///
/// INVARIANTS:
/// - `deposit_for_fill` only returns deposits the fill matches exactly
/// - historical queries never retry; retries belong to the transport
#[async_trait]
pub trait SpokePoolClient: Send + Sync {
    fn chain_id(&self) -> ChainId;

    fn is_updated(&self) -> bool;

    fn latest_block_searched(&self) -> u64;

    fn deposits_for_destination_chain(&self, destination_chain_id: ChainId) -> Vec<Deposit>;

    fn deposit_for_fill(&self, fill: &Fill) -> Option<Deposit>;

    fn fills_for_origin_chain(&self, origin_chain_id: ChainId) -> Vec<Fill>;

    /// First and last deposit ids ever emitted on this chain, when known
    fn deposit_id_bounds(&self) -> Option<(DepositId, DepositId)>;

    /// Look up a deposit beyond the in-memory retention window
    async fn query_historical_deposit(&self, deposit_id: DepositId) -> AppResult<Option<Deposit>>;

    fn root_bundle_relays(&self) -> Vec<RootBundleRelay>;

    fn relayer_refund_executions(&self) -> Vec<RelayerRefundExecution>;

    /// Refunds already paid out on this chain under `relayer_refund_root`
    async fn executed_refunds(&self, relayer_refund_root: &str) -> AppResult<ExecutedRefunds> {
        let root = normalize_refund_root(relayer_refund_root)?;

        let mut relay = None;
        for candidate in self.root_bundle_relays() {
            match normalize_refund_root(&candidate.relayer_refund_root) {
                Ok(candidate_root) if candidate_root == root => {
                    relay = Some(candidate);
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!(
                    chain_id = self.chain_id(),
                    root_bundle_id = candidate.root_bundle_id,
                    "Skipping relayed root bundle with malformed refund root: {}",
                    e
                ),
            }
        }
        let Some(relay) = relay else {
            return Ok(ExecutedRefunds::new());
        };

        let mut executed = ExecutedRefunds::new();
        for leaf in self
            .relayer_refund_executions()
            .into_iter()
            .filter(|leaf| leaf.root_bundle_id == relay.root_bundle_id)
        {
            let by_relayer = executed.entry(leaf.l2_token_address.clone()).or_default();
            for (relayer, amount) in leaf.refund_addresses.iter().zip(leaf.refund_amounts.iter()) {
                let total = by_relayer.entry(relayer.clone()).or_insert(Decimal::ZERO);
                *total = total.saturating_add(*amount);
            }
        }

        Ok(executed)
    }
}

/// Where a relayer is repaid for a fill
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundInformation {
    pub repayment_chain_id: ChainId,
    pub repayment_token: Address,
}

/// Resolves repayment chain and token for a fill
pub trait RefundResolver: Send + Sync {
    fn refund_information(
        &self,
        fill: &Fill,
        deposit: &Deposit,
        block_ranges: &[BlockRange],
        chain_id_list: &[ChainId],
    ) -> AppResult<RefundInformation>;
}

/// Derives per-chain block ranges for proposed and future bundles
pub trait BlockRangeProvider: Send + Sync {
    /// Ranges a historical bundle covered
    fn implied_bundle_block_ranges(&self, bundle: &RootBundle) -> AppResult<Vec<BlockRange>>;

    /// Widest ranges a bundle proposed at `latest_hub_block` could cover
    fn widest_possible_expected_block_ranges(
        &self,
        spoke_clients: &SpokeClientRegistry,
        latest_hub_block: u64,
    ) -> AppResult<Vec<BlockRange>>;
}

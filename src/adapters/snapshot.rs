// In-memory collaborators backed by a JSON snapshot of chain state.
//
// Used by the binary to replay a captured state and by tests to drive the
// orchestrator without RPC access.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::adapters::registry::SpokeClientRegistry;
use crate::adapters::routes::TokenRoute;
use crate::adapters::traits::*;
use crate::error::{AppError, AppResult};
use crate::ledger::models::*;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpokePoolSnapshot {
    pub chain_id: ChainId,
    #[serde(default = "default_true")]
    pub is_updated: bool,
    #[serde(default)]
    pub latest_block_searched: u64,
    /// Deposits inside the client's retention window
    #[serde(default)]
    pub deposits: Vec<Deposit>,
    /// Deposits only reachable through a historical query
    #[serde(default)]
    pub historical_deposits: Vec<Deposit>,
    #[serde(default)]
    pub fills: Vec<Fill>,
    #[serde(default)]
    pub root_bundle_relays: Vec<RootBundleRelay>,
    #[serde(default)]
    pub relayer_refund_executions: Vec<RelayerRefundExecution>,
}

#[derive(Debug, Clone)]
pub struct InMemorySpokePoolClient {
    snapshot: SpokePoolSnapshot,
}

impl InMemorySpokePoolClient {
    pub fn new(snapshot: SpokePoolSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl SpokePoolClient for InMemorySpokePoolClient {
    fn chain_id(&self) -> ChainId {
        self.snapshot.chain_id
    }

    fn is_updated(&self) -> bool {
        self.snapshot.is_updated
    }

    fn latest_block_searched(&self) -> u64 {
        self.snapshot.latest_block_searched
    }

    fn deposits_for_destination_chain(&self, destination_chain_id: ChainId) -> Vec<Deposit> {
        self.snapshot
            .deposits
            .iter()
            .filter(|deposit| deposit.destination_chain_id == destination_chain_id)
            .cloned()
            .collect()
    }

    fn deposit_for_fill(&self, fill: &Fill) -> Option<Deposit> {
        if fill.origin_chain_id != self.snapshot.chain_id {
            return None;
        }
        self.snapshot
            .deposits
            .iter()
            .find(|deposit| deposit.deposit_id == fill.deposit_id && fill.matches_deposit(deposit))
            .cloned()
    }

    fn fills_for_origin_chain(&self, origin_chain_id: ChainId) -> Vec<Fill> {
        self.snapshot
            .fills
            .iter()
            .filter(|fill| fill.origin_chain_id == origin_chain_id)
            .cloned()
            .collect()
    }

    fn deposit_id_bounds(&self) -> Option<(DepositId, DepositId)> {
        let ids = self
            .snapshot
            .deposits
            .iter()
            .chain(self.snapshot.historical_deposits.iter())
            .map(|deposit| deposit.deposit_id);
        let (min, max) = ids.fold((None, None), |(min, max): (Option<DepositId>, Option<DepositId>), id| {
            (
                Some(min.map_or(id, |current| current.min(id))),
                Some(max.map_or(id, |current| current.max(id))),
            )
        });
        min.zip(max)
    }

    async fn query_historical_deposit(&self, deposit_id: DepositId) -> AppResult<Option<Deposit>> {
        debug!(
            "Historical deposit query on chain {} for deposit {}",
            self.snapshot.chain_id, deposit_id
        );
        Ok(self
            .snapshot
            .historical_deposits
            .iter()
            .chain(self.snapshot.deposits.iter())
            .find(|deposit| deposit.deposit_id == deposit_id)
            .cloned())
    }

    fn root_bundle_relays(&self) -> Vec<RootBundleRelay> {
        self.snapshot.root_bundle_relays.clone()
    }

    fn relayer_refund_executions(&self) -> Vec<RelayerRefundExecution> {
        self.snapshot.relayer_refund_executions.clone()
    }
}

/// A proposal on the hub chain and whether all its leaves were executed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedRootBundle {
    #[serde(flatten)]
    pub bundle: RootBundle,
    #[serde(default)]
    pub fully_executed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubPoolSnapshot {
    pub chain_id: ChainId,
    #[serde(default = "default_true")]
    pub is_updated: bool,
    pub latest_block_searched: u64,
    #[serde(default)]
    pub root_bundles: Vec<ProposedRootBundle>,
}

#[derive(Debug, Clone)]
pub struct InMemoryHubPoolClient {
    snapshot: HubPoolSnapshot,
}

impl InMemoryHubPoolClient {
    pub fn new(snapshot: HubPoolSnapshot) -> Self {
        Self { snapshot }
    }
}

impl HubPoolClient for InMemoryHubPoolClient {
    fn is_updated(&self) -> bool {
        self.snapshot.is_updated
    }

    fn latest_block_searched(&self) -> u64 {
        self.snapshot.latest_block_searched
    }

    fn chain_id(&self) -> ChainId {
        self.snapshot.chain_id
    }

    fn latest_fully_executed_root_bundle(&self, before_block: u64) -> Option<RootBundle> {
        self.snapshot
            .root_bundles
            .iter()
            .filter(|proposal| proposal.fully_executed && proposal.bundle.block_number < before_block)
            .max_by_key(|proposal| proposal.bundle.block_number)
            .map(|proposal| proposal.bundle.clone())
    }
}

/// Enabled chain set taking effect at `block`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnabledChainsUpdate {
    pub block: u64,
    pub chain_ids: Vec<ChainId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigStoreSnapshot {
    #[serde(default = "default_true")]
    pub is_updated: bool,
    #[serde(default)]
    pub enabled_chains: Vec<EnabledChainsUpdate>,
    #[serde(default)]
    pub fee_model_activation_blocks: BTreeMap<ChainId, u64>,
}

#[derive(Debug, Clone)]
pub struct InMemoryConfigStoreClient {
    snapshot: ConfigStoreSnapshot,
}

impl InMemoryConfigStoreClient {
    pub fn new(snapshot: ConfigStoreSnapshot) -> Self {
        Self { snapshot }
    }
}

impl ConfigStoreClient for InMemoryConfigStoreClient {
    fn is_updated(&self) -> bool {
        self.snapshot.is_updated
    }

    fn enabled_chains(&self, at_block: u64) -> Vec<ChainId> {
        self.snapshot
            .enabled_chains
            .iter()
            .filter(|update| update.block <= at_block)
            .max_by_key(|update| update.block)
            .map(|update| update.chain_ids.clone())
            .unwrap_or_default()
    }

    fn fee_model_activation_block(&self, chain_id: ChainId) -> Option<u64> {
        self.snapshot.fee_model_activation_blocks.get(&chain_id).copied()
    }
}

/// Derives bundle ranges from the proposal history: each chain's range
/// starts one block after the previous proposal's end block for it.
pub struct SnapshotBlockRangeProvider {
    chain_id_list: Vec<ChainId>,
    proposals: Vec<RootBundle>,
    config_store: Arc<dyn ConfigStoreClient>,
}

impl SnapshotBlockRangeProvider {
    pub fn new(
        chain_id_list: Vec<ChainId>,
        proposals: Vec<RootBundle>,
        config_store: Arc<dyn ConfigStoreClient>,
    ) -> Self {
        Self {
            chain_id_list,
            proposals,
            config_store,
        }
    }

    fn previous_proposal(&self, before_block: u64) -> Option<&RootBundle> {
        self.proposals
            .iter()
            .filter(|proposal| proposal.block_number < before_block)
            .max_by_key(|proposal| proposal.block_number)
    }

    fn start_block(previous: Option<&RootBundle>, index: usize) -> u64 {
        previous
            .and_then(|proposal| proposal.bundle_evaluation_block_numbers.get(index))
            .map(|end| end + 1)
            .unwrap_or(0)
    }
}

impl BlockRangeProvider for SnapshotBlockRangeProvider {
    fn implied_bundle_block_ranges(&self, bundle: &RootBundle) -> AppResult<Vec<BlockRange>> {
        if bundle.bundle_evaluation_block_numbers.len() > self.chain_id_list.len() {
            return Err(AppError::TooManyBlockRanges {
                ranges: bundle.bundle_evaluation_block_numbers.len(),
                chains: self.chain_id_list.len(),
            });
        }

        let previous = self.previous_proposal(bundle.block_number);
        let enabled = self.config_store.enabled_chains(bundle.block_number);

        Ok(bundle
            .bundle_evaluation_block_numbers
            .iter()
            .enumerate()
            .map(|(index, end)| {
                let start = Self::start_block(previous, index);
                let chain_id = self.chain_id_list[index];
                if !enabled.contains(&chain_id) || start > *end {
                    BlockRange::new(*end, *end)
                } else {
                    BlockRange::new(start, *end)
                }
            })
            .collect())
    }

    fn widest_possible_expected_block_ranges(
        &self,
        spoke_clients: &SpokeClientRegistry,
        latest_hub_block: u64,
    ) -> AppResult<Vec<BlockRange>> {
        let previous = self.previous_proposal(latest_hub_block + 1);
        let enabled = self.config_store.enabled_chains(latest_hub_block);

        let mut ranges = Vec::with_capacity(self.chain_id_list.len());
        for (index, chain_id) in self.chain_id_list.iter().enumerate() {
            let start = Self::start_block(previous, index);
            if !enabled.contains(chain_id) {
                let frozen = start.saturating_sub(1);
                ranges.push(BlockRange::new(frozen, frozen));
                continue;
            }

            let end = spoke_clients.require(*chain_id)?.latest_block_searched();
            ranges.push(BlockRange::new(start.min(end), end));
        }

        Ok(ranges)
    }
}

/// Complete captured state fed to the binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub hub_pool: HubPoolSnapshot,
    #[serde(default)]
    pub config_store: ConfigStoreSnapshot,
    #[serde(default)]
    pub spoke_pools: Vec<SpokePoolSnapshot>,
    #[serde(default)]
    pub token_routes: Vec<TokenRoute>,
}

impl ChainSnapshot {
    pub fn from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        debug!("Reading chain snapshot from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Every proposal on the hub chain, executed or not
    pub fn proposals(&self) -> Vec<RootBundle> {
        self.hub_pool
            .root_bundles
            .iter()
            .map(|proposal| proposal.bundle.clone())
            .collect()
    }

    pub fn spoke_client_registry(&self) -> SpokeClientRegistry {
        let mut registry = SpokeClientRegistry::new();
        for spoke in &self.spoke_pools {
            registry.register(Arc::new(InMemorySpokePoolClient::new(spoke.clone())));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::fixtures::{deposit, fill};
    use rust_decimal_macros::dec;

    fn root(byte: &str) -> String {
        format!("0x{}", byte.repeat(32))
    }

    fn bundle(block_number: u64, ends: Vec<u64>) -> RootBundle {
        RootBundle {
            block_number,
            relayer_refund_root: root("aa"),
            bundle_evaluation_block_numbers: ends,
        }
    }

    fn config_store(chains: Vec<ChainId>) -> Arc<dyn ConfigStoreClient> {
        Arc::new(InMemoryConfigStoreClient::new(ConfigStoreSnapshot {
            is_updated: true,
            enabled_chains: vec![EnabledChainsUpdate {
                block: 0,
                chain_ids: chains,
            }],
            fee_model_activation_blocks: BTreeMap::new(),
        }))
    }

    #[test]
    fn test_deposit_for_fill_requires_match() {
        let d = deposit(1, 10, 3, dec!(100), 5);
        let client = InMemorySpokePoolClient::new(SpokePoolSnapshot {
            chain_id: 1,
            is_updated: true,
            deposits: vec![d.clone()],
            ..Default::default()
        });

        let good = fill(&d, dec!(40), dec!(40), 12);
        assert_eq!(client.deposit_for_fill(&good), Some(d.clone()));

        let mut forged = good.clone();
        forged.amount = dec!(1000);
        assert_eq!(client.deposit_for_fill(&forged), None);
        assert_eq!(client.deposit_id_bounds(), Some((3, 3)));
    }

    #[tokio::test]
    async fn test_executed_refunds_for_matching_root() {
        let relayer = Address::new("0xRelayer");
        let token = Address::new("0xToken");
        let client = InMemorySpokePoolClient::new(SpokePoolSnapshot {
            chain_id: 10,
            is_updated: true,
            root_bundle_relays: vec![
                RootBundleRelay {
                    root_bundle_id: 4,
                    relayer_refund_root: root("AA"),
                    position: EventPosition::default(),
                },
                RootBundleRelay {
                    root_bundle_id: 5,
                    relayer_refund_root: root("bb"),
                    position: EventPosition::default(),
                },
            ],
            relayer_refund_executions: vec![
                RelayerRefundExecution {
                    root_bundle_id: 4,
                    leaf_id: 0,
                    chain_id: 10,
                    l2_token_address: token.clone(),
                    refund_addresses: vec![relayer.clone()],
                    refund_amounts: vec![dec!(70)],
                    position: EventPosition::default(),
                },
                RelayerRefundExecution {
                    root_bundle_id: 4,
                    leaf_id: 1,
                    chain_id: 10,
                    l2_token_address: token.clone(),
                    refund_addresses: vec![relayer.clone()],
                    refund_amounts: vec![dec!(30)],
                    position: EventPosition::default(),
                },
                RelayerRefundExecution {
                    root_bundle_id: 5,
                    leaf_id: 0,
                    chain_id: 10,
                    l2_token_address: token.clone(),
                    refund_addresses: vec![relayer.clone()],
                    refund_amounts: vec![dec!(999)],
                    position: EventPosition::default(),
                },
            ],
            ..Default::default()
        });

        let executed = client.executed_refunds(&root("aa")).await.unwrap();
        assert_eq!(executed[&token][&relayer], dec!(100));

        let unknown = client.executed_refunds(&root("cc")).await.unwrap();
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_relayed_root_is_skipped() {
        let relayer = Address::new("0xRelayer");
        let token = Address::new("0xToken");
        let client = InMemorySpokePoolClient::new(SpokePoolSnapshot {
            chain_id: 10,
            is_updated: true,
            root_bundle_relays: vec![
                RootBundleRelay {
                    root_bundle_id: 3,
                    relayer_refund_root: "0xnot-hex".to_string(),
                    position: EventPosition::default(),
                },
                RootBundleRelay {
                    root_bundle_id: 4,
                    relayer_refund_root: root("aa"),
                    position: EventPosition::default(),
                },
            ],
            relayer_refund_executions: vec![RelayerRefundExecution {
                root_bundle_id: 4,
                leaf_id: 0,
                chain_id: 10,
                l2_token_address: token.clone(),
                refund_addresses: vec![relayer.clone()],
                refund_amounts: vec![dec!(25)],
                position: EventPosition::default(),
            }],
            ..Default::default()
        });

        let executed = client.executed_refunds(&root("aa")).await.unwrap();
        assert_eq!(executed[&token][&relayer], dec!(25));

        // The bundle's own root must still be well formed
        assert!(matches!(
            client.executed_refunds("0x1234").await,
            Err(AppError::InvalidRefundRoot(_))
        ));
    }

    #[test]
    fn test_missing_snapshot_file_is_io_error() {
        let result = ChainSnapshot::from_path("/nonexistent/reconciler-snapshot.json");
        assert!(matches!(result, Err(AppError::Io(_))));
    }

    #[test]
    fn test_latest_fully_executed_bundle() {
        let hub = InMemoryHubPoolClient::new(HubPoolSnapshot {
            chain_id: 1,
            is_updated: true,
            latest_block_searched: 500,
            root_bundles: vec![
                ProposedRootBundle { bundle: bundle(100, vec![90]), fully_executed: true },
                ProposedRootBundle { bundle: bundle(200, vec![190]), fully_executed: true },
                ProposedRootBundle { bundle: bundle(300, vec![290]), fully_executed: false },
            ],
        });

        assert_eq!(hub.latest_fully_executed_root_bundle(500).map(|b| b.block_number), Some(200));
        assert_eq!(hub.latest_fully_executed_root_bundle(200).map(|b| b.block_number), Some(100));
        assert_eq!(hub.latest_fully_executed_root_bundle(100), None);
    }

    #[test]
    fn test_implied_block_ranges() {
        let provider = SnapshotBlockRangeProvider::new(
            vec![1, 10, 137],
            vec![bundle(100, vec![90, 900, 5000]), bundle(200, vec![190, 1900, 5000])],
            config_store(vec![1, 10]),
        );

        let ranges = provider
            .implied_bundle_block_ranges(&bundle(200, vec![190, 1900, 5000]))
            .unwrap();
        assert_eq!(
            ranges,
            vec![BlockRange::new(91, 190), BlockRange::new(901, 1900), BlockRange::new(5000, 5000)]
        );

        let first = provider.implied_bundle_block_ranges(&bundle(100, vec![90, 900, 5000])).unwrap();
        assert_eq!(first[0], BlockRange::new(0, 90));
    }

    #[test]
    fn test_widest_possible_ranges() {
        let snapshot = ChainSnapshot {
            spoke_pools: vec![
                SpokePoolSnapshot { chain_id: 1, is_updated: true, latest_block_searched: 250, ..Default::default() },
                SpokePoolSnapshot { chain_id: 10, is_updated: true, latest_block_searched: 2500, ..Default::default() },
            ],
            ..Default::default()
        };
        let provider = SnapshotBlockRangeProvider::new(
            vec![1, 10, 137],
            vec![bundle(200, vec![190, 1900, 5000])],
            config_store(vec![1, 10]),
        );

        let ranges = provider
            .widest_possible_expected_block_ranges(&snapshot.spoke_client_registry(), 260)
            .unwrap();
        assert_eq!(
            ranges,
            vec![BlockRange::new(191, 250), BlockRange::new(1901, 2500), BlockRange::new(5000, 5000)]
        );
    }
}

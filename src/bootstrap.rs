use std::sync::Arc;
use tracing::{info, warn};

use crate::adapters::registry::SpokeClientRegistry;
use crate::adapters::routes::TokenRouteRefundResolver;
use crate::adapters::snapshot::{
    ChainSnapshot, InMemoryConfigStoreClient, InMemoryHubPoolClient, SnapshotBlockRangeProvider,
};
use crate::adapters::traits::{BlockRangeProvider, ConfigStoreClient, HubPoolClient, RefundResolver};
use crate::config::Config;
use crate::error::AppResult;
use crate::ledger::models::ChainId;
use crate::settlement::BundleDataClient;

/// Load the configured snapshot and wire every collaborator around it
pub fn initialize_bundle_data_client(config: &Config) -> AppResult<BundleDataClient> {
    info!("Initializing reconciliation components ...");

    let snapshot = ChainSnapshot::from_path(&config.snapshot_path)?;
    info!(
        "📂 Loaded snapshot {} ({} spoke pools, {} proposals)",
        config.snapshot_path,
        snapshot.spoke_pools.len(),
        snapshot.hub_pool.root_bundles.len()
    );

    let hub_chain_id = config.hub_chain_id()?;
    if snapshot.hub_pool.chain_id != hub_chain_id {
        warn!(
            "⚠️  Snapshot hub chain {} differs from first configured chain {}",
            snapshot.hub_pool.chain_id, hub_chain_id
        );
    }

    let client = build_bundle_data_client(&snapshot, config.chain_id_list.clone());

    let missing: Vec<ChainId> = config
        .chain_id_list
        .iter()
        .copied()
        .filter(|chain_id| client.spoke_clients().get(*chain_id).is_none())
        .collect();
    if !missing.is_empty() {
        warn!("⚠️  No spoke pool state for chains {:?}", missing);
    }

    info!("✅ Bundle data client ready for chains {:?}", client.chain_id_list());
    Ok(client)
}

pub fn build_bundle_data_client(snapshot: &ChainSnapshot, chain_id_list: Vec<ChainId>) -> BundleDataClient {
    let hub_pool: Arc<dyn HubPoolClient> = Arc::new(InMemoryHubPoolClient::new(snapshot.hub_pool.clone()));
    let config_store: Arc<dyn ConfigStoreClient> =
        Arc::new(InMemoryConfigStoreClient::new(snapshot.config_store.clone()));
    let spoke_clients: SpokeClientRegistry = snapshot.spoke_client_registry();

    let refund_resolver: Arc<dyn RefundResolver> = Arc::new(TokenRouteRefundResolver::new(
        hub_pool.chain_id(),
        snapshot.token_routes.clone(),
    ));
    let block_range_provider: Arc<dyn BlockRangeProvider> = Arc::new(SnapshotBlockRangeProvider::new(
        chain_id_list.clone(),
        snapshot.proposals(),
        config_store.clone(),
    ));

    BundleDataClient::new(
        hub_pool,
        config_store,
        spoke_clients,
        refund_resolver,
        block_range_provider,
        chain_id_list,
    )
}

// Bundle reconciliation: matches fills to deposits across every chain pair
// and builds the refund ledger for a set of block ranges.
pub mod cache;
pub mod executed;
pub mod fallback;
pub mod matcher;
pub mod pending;
pub mod ranges;
pub mod summary;

use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::adapters::registry::SpokeClientRegistry;
use crate::adapters::traits::{BlockRangeProvider, ConfigStoreClient, HubPoolClient, RefundResolver};
use crate::error::{AppError, AppResult};
use crate::ledger::models::{BlockRange, ChainId, ReconciliationResult};
use crate::settlement::cache::ResultCache;
use crate::settlement::matcher::{DepositFillMatcher, ReconciliationContext};
use crate::settlement::ranges::{block_ranges_fingerprint, is_chain_disabled};

/// Entry point of the reconciliation core.
///
/// Owns the result cache. Every other component is a collaborator handed in
/// at construction.
pub struct BundleDataClient {
    hub_pool: Arc<dyn HubPoolClient>,
    config_store: Arc<dyn ConfigStoreClient>,
    spoke_clients: SpokeClientRegistry,
    refund_resolver: Arc<dyn RefundResolver>,
    block_range_provider: Arc<dyn BlockRangeProvider>,
    chain_id_list: Vec<ChainId>,
    cache: ResultCache,
}

impl BundleDataClient {
    pub fn new(
        hub_pool: Arc<dyn HubPoolClient>,
        config_store: Arc<dyn ConfigStoreClient>,
        spoke_clients: SpokeClientRegistry,
        refund_resolver: Arc<dyn RefundResolver>,
        block_range_provider: Arc<dyn BlockRangeProvider>,
        chain_id_list: Vec<ChainId>,
    ) -> Self {
        Self {
            hub_pool,
            config_store,
            spoke_clients,
            refund_resolver,
            block_range_provider,
            chain_id_list,
            cache: ResultCache::new(),
        }
    }

    pub fn chain_id_list(&self) -> &[ChainId] {
        &self.chain_id_list
    }

    pub fn spoke_clients(&self) -> &SpokeClientRegistry {
        &self.spoke_clients
    }

    /// Drop every cached result. Call after upstream clients advance.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    fn check_preconditions(&self, block_ranges: &[BlockRange], spoke_clients: &SpokeClientRegistry) -> AppResult<()> {
        if !self.config_store.is_updated() {
            return Err(AppError::ClientNotUpdated("config store client".to_string()));
        }
        if !self.hub_pool.is_updated() {
            return Err(AppError::ClientNotUpdated("hub pool client".to_string()));
        }
        if block_ranges.len() > self.chain_id_list.len() {
            return Err(AppError::TooManyBlockRanges {
                ranges: block_ranges.len(),
                chains: self.chain_id_list.len(),
            });
        }

        for (chain_id, range) in self.chain_id_list.iter().zip(block_ranges) {
            if is_chain_disabled(range) {
                continue;
            }
            if !spoke_clients.require(*chain_id)?.is_updated() {
                return Err(AppError::ClientNotUpdated(format!("spoke pool client for chain {}", chain_id)));
            }
        }

        Ok(())
    }

    /// Reconcile deposits and fills for `block_ranges`, one range per chain
    /// in chain-list order.
    ///
    /// Results are cached by the exact serialization of `block_ranges`; a
    /// hit returns a copy without touching any collaborator.
    #[instrument(skip(self, block_ranges, spoke_clients), fields(chains = block_ranges.len()))]
    pub async fn load_data(
        &self,
        block_ranges: &[BlockRange],
        spoke_clients: &SpokeClientRegistry,
        emit_diagnostics: bool,
    ) -> AppResult<ReconciliationResult> {
        self.check_preconditions(block_ranges, spoke_clients)?;

        let fingerprint = block_ranges_fingerprint(block_ranges)?;
        if let Some(cached) = self.cache.get(&fingerprint).await {
            return Ok(cached);
        }

        let context = ReconciliationContext::new();
        {
            let matcher = DepositFillMatcher::new(
                block_ranges,
                &self.chain_id_list,
                self.refund_resolver.as_ref(),
                &context,
            );
            let chain_ids = &self.chain_id_list[..block_ranges.len()];

            for (origin_chain_id, origin_range) in chain_ids.iter().zip(block_ranges) {
                if is_chain_disabled(origin_range) {
                    continue;
                }
                let origin = spoke_clients.require(*origin_chain_id)?;
                let activation_block = self.config_store.fee_model_activation_block(*origin_chain_id);

                for (destination_chain_id, destination_range) in chain_ids.iter().zip(block_ranges) {
                    if destination_chain_id == origin_chain_id || is_chain_disabled(destination_range) {
                        continue;
                    }
                    let destination = spoke_clients.require(*destination_chain_id)?;
                    matcher
                        .match_chain_pair(origin.as_ref(), destination.as_ref(), activation_block)
                        .await?;
                }
            }
        }

        let output = context.into_output();
        let result = output.result;

        if emit_diagnostics {
            debug!(
                deposits = result.deposits.len(),
                pre_activation_deposits = result.pre_activation_deposits.len(),
                valid_fills = result.all_valid_fills.len(),
                refunds = result.fills_to_refund.refund_count(),
                unfilled_deposits = result.unfilled_deposits.len(),
                duplicate_fills = output.duplicate_fills,
                invalid_fills = output.invalid_fills.len(),
                summary = %summary::summarize_result(&result, block_ranges, &self.chain_id_list),
                "Finished loading bundle data"
            );

            if !output.invalid_fills.is_empty() {
                debug!(
                    invalid_fills = %summary::summarize_invalid_fills(&output.invalid_fills),
                    "Fills with no matching deposit"
                );
            }
        }

        info!(
            "📊 Reconciled {} deposits and {} valid fills for {}",
            result.deposits.len(),
            result.all_valid_fills.len(),
            fingerprint
        );

        self.cache.insert(fingerprint, result.clone()).await;
        Ok(result)
    }
}

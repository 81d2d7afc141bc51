use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::adapters::traits::{RefundInformation, RefundResolver};
use crate::error::{AppError, AppResult};
use crate::ledger::models::*;

/// One L1 token and its counterpart on every chain it is bridged to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRoute {
    pub l1_token: Address,
    /// Hub block from which this mapping applies
    #[serde(default)]
    pub active_from_block: u64,
    pub tokens: BTreeMap<ChainId, Address>,
}

/// Resolves repayment tokens by walking L1 token routes as of the
/// hub chain's range end
#[derive(Debug, Clone)]
pub struct TokenRouteRefundResolver {
    hub_chain_id: ChainId,
    routes: Vec<TokenRoute>,
}

impl TokenRouteRefundResolver {
    pub fn new(hub_chain_id: ChainId, routes: Vec<TokenRoute>) -> Self {
        Self {
            hub_chain_id,
            routes,
        }
    }

    fn hub_block(&self, block_ranges: &[BlockRange], chain_id_list: &[ChainId]) -> AppResult<u64> {
        chain_id_list
            .iter()
            .position(|chain_id| *chain_id == self.hub_chain_id)
            .and_then(|index| block_ranges.get(index))
            .map(|range| range.end)
            .ok_or_else(|| {
                AppError::RefundResolution(format!(
                    "no block range for hub chain {}",
                    self.hub_chain_id
                ))
            })
    }

    /// Route containing `token` on `chain_id`, latest activation first
    fn route_for(&self, chain_id: ChainId, token: &Address, hub_block: u64) -> Option<&TokenRoute> {
        self.routes
            .iter()
            .filter(|route| route.active_from_block <= hub_block)
            .filter(|route| route.tokens.get(&chain_id) == Some(token))
            .max_by_key(|route| route.active_from_block)
    }
}

impl RefundResolver for TokenRouteRefundResolver {
    fn refund_information(
        &self,
        fill: &Fill,
        deposit: &Deposit,
        block_ranges: &[BlockRange],
        chain_id_list: &[ChainId],
    ) -> AppResult<RefundInformation> {
        // Slow relays are settled where they were filled
        let repayment_chain_id = if fill.is_slow_relay {
            fill.destination_chain_id
        } else {
            fill.repayment_chain_id
        };

        let hub_block = self.hub_block(block_ranges, chain_id_list)?;
        let route = self
            .route_for(deposit.origin_chain_id, &deposit.origin_token, hub_block)
            .ok_or_else(|| {
                AppError::RefundResolution(format!(
                    "no L1 route for token {} on chain {} at hub block {}",
                    deposit.origin_token, deposit.origin_chain_id, hub_block
                ))
            })?;

        let repayment_token = route.tokens.get(&repayment_chain_id).cloned().ok_or_else(|| {
            AppError::RefundResolution(format!(
                "L1 token {} has no counterpart on chain {}",
                route.l1_token, repayment_chain_id
            ))
        })?;

        Ok(RefundInformation {
            repayment_chain_id,
            repayment_token,
        })
    }
}

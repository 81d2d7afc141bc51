use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::adapters::traits::SpokePoolClient;
use crate::error::{AppError, AppResult};
use crate::ledger::models::ChainId;

/// Spoke pool event-store handles keyed by chain
#[derive(Clone, Default)]
pub struct SpokeClientRegistry {
    clients: HashMap<ChainId, Arc<dyn SpokePoolClient>>,
}

impl SpokeClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    pub fn register(&mut self, client: Arc<dyn SpokePoolClient>) {
        info!("Registering spoke pool client for chain: {}", client.chain_id());
        self.clients.insert(client.chain_id(), client);
    }

    pub fn get(&self, chain_id: ChainId) -> Option<Arc<dyn SpokePoolClient>> {
        self.clients.get(&chain_id).cloned()
    }

    /// Like `get`, but a missing client is an error
    pub fn require(&self, chain_id: ChainId) -> AppResult<Arc<dyn SpokePoolClient>> {
        self.get(chain_id).ok_or(AppError::MissingSpokeClient(chain_id))
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        let mut chain_ids: Vec<ChainId> = self.clients.keys().copied().collect();
        chain_ids.sort_unstable();
        chain_ids
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

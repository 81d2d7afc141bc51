use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::ledger::models::ReconciliationResult;

/// Reconciliation results keyed by block-range fingerprint.
///
/// No TTL and no eviction: entries live until `clear`, which the owner must
/// call whenever upstream chain state may have moved. Reads hand out clones,
/// so a caller mutating its copy never touches the cached value.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    cache: Arc<RwLock<HashMap<String, ReconciliationResult>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, fingerprint: &str) -> Option<ReconciliationResult> {
        let cache = self.cache.read().await;
        let hit = cache.get(fingerprint).cloned();
        if hit.is_some() {
            debug!("Reconciliation cache hit: {}", fingerprint);
        }
        hit
    }

    pub async fn insert(&self, fingerprint: String, result: ReconciliationResult) {
        let mut cache = self.cache.write().await;
        debug!("Caching reconciliation result: {}", fingerprint);
        cache.insert(fingerprint, result);
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
        info!("🔄 Reconciliation cache cleared");
    }

    #[cfg(test)]
    pub async fn size(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::fixtures::deposit;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_result_cache() {
        let cache = ResultCache::new();
        let result = ReconciliationResult {
            deposits: vec![deposit(1, 10, 1, dec!(100), 5)],
            ..Default::default()
        };

        cache.insert("[[0,10]]".to_string(), result.clone()).await;
        assert_eq!(cache.get("[[0,10]]").await, Some(result.clone()));
        assert_eq!(cache.get("[[0,11]]").await, None);
        assert_eq!(cache.size().await, 1);

        cache.clear().await;
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn test_returned_copy_is_independent() {
        let cache = ResultCache::new();
        let result = ReconciliationResult {
            deposits: vec![deposit(1, 10, 1, dec!(100), 5)],
            ..Default::default()
        };
        cache.insert("key".to_string(), result.clone()).await;

        let mut copy = cache.get("key").await.unwrap();
        copy.deposits.clear();

        assert_eq!(cache.get("key").await, Some(result));
    }
}

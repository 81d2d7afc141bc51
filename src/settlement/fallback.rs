use tracing::debug;

use crate::adapters::traits::SpokePoolClient;
use crate::error::AppResult;
use crate::ledger::models::{Deposit, Fill};

/// Resolves a fill's deposit when the origin client's retention window no
/// longer holds it. `None` is final; nothing is retried here.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoricalDepositResolver;

impl HistoricalDepositResolver {
    pub fn new() -> Self {
        Self
    }

    pub async fn resolve(&self, origin: &dyn SpokePoolClient, fill: &Fill) -> AppResult<Option<Deposit>> {
        if let Some((first, last)) = origin.deposit_id_bounds() {
            if fill.deposit_id < first || fill.deposit_id > last {
                debug!(
                    "Deposit {} outside known ids [{}, {}] on chain {}",
                    fill.deposit_key(),
                    first,
                    last,
                    origin.chain_id()
                );
                return Ok(None);
            }
        }

        let deposit = origin.query_historical_deposit(fill.deposit_id).await?;
        Ok(deposit.filter(|deposit| fill.matches_deposit(deposit)))
    }
}

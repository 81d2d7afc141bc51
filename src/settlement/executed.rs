use rust_decimal::Decimal;
use tracing::{debug, instrument};

use crate::adapters::registry::SpokeClientRegistry;
use crate::error::AppResult;
use crate::ledger::models::RootBundle;
use crate::ledger::RefundLedger;
use crate::settlement::BundleDataClient;

/// Subtract refunds already executed on each repayment chain under
/// `bundle`'s refund root, flooring every remaining refund at zero.
///
/// Only per-relayer refunds change; entry totals and fee aggregates keep
/// describing the bundle as proposed.
pub async fn deduct_executed_refunds(
    ledger: &mut RefundLedger,
    bundle: &RootBundle,
    spoke_clients: &SpokeClientRegistry,
) -> AppResult<()> {
    for chain_id in ledger.chain_ids() {
        let client = spoke_clients.require(chain_id)?;
        let executed = client.executed_refunds(&bundle.relayer_refund_root).await?;
        if executed.is_empty() {
            continue;
        }

        let Some(tokens) = ledger.tokens_mut(chain_id) else {
            continue;
        };
        for (token, entry) in tokens.iter_mut() {
            let Some(executed_by_relayer) = executed.get(token) else {
                continue;
            };
            for (relayer, refund) in entry.refunds.iter_mut() {
                if let Some(paid) = executed_by_relayer.get(relayer) {
                    debug!(
                        chain_id,
                        token = %token,
                        relayer = %relayer,
                        computed = %refund,
                        executed = %paid,
                        "Deducting executed refund"
                    );
                    *refund = refund.saturating_sub(*paid).max(Decimal::ZERO);
                }
            }
        }
    }

    Ok(())
}

impl BundleDataClient {
    /// Ledger of `bundle` less what has already been paid out
    #[instrument(skip(self, ledger, bundle), fields(bundle_block = bundle.block_number))]
    pub async fn deduct_executed_refunds(&self, mut ledger: RefundLedger, bundle: &RootBundle) -> AppResult<RefundLedger> {
        deduct_executed_refunds(&mut ledger, bundle, self.spoke_clients()).await?;
        Ok(ledger)
    }
}

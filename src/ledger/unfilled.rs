use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::ledger::models::{ChainId, Deposit, DepositKey, Fill, UnfilledDeposit};

#[derive(Debug, Clone)]
struct TrackedDeposit {
    deposit: Deposit,
    unfilled_amount: Decimal,
    has_first_partial_fill: bool,
}

/// Tracks, per origin chain, every deposit that received an in-range fill
#[derive(Debug, Clone, Default)]
pub struct UnfilledDepositTracker {
    by_origin: BTreeMap<ChainId, BTreeMap<DepositKey, TrackedDeposit>>,
}

impl UnfilledDepositTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an in-range fill against its matched deposit.
    ///
    /// Later fills leave less outstanding, so the smallest remaining
    /// amount seen for a deposit is kept.
    pub fn record_fill(&mut self, fill: &Fill, deposit: &Deposit) {
        let remaining = fill.remaining_amount().max(Decimal::ZERO);
        let is_first = fill.is_first_fill();

        self.by_origin
            .entry(deposit.origin_chain_id)
            .or_default()
            .entry(deposit.key())
            .and_modify(|tracked| {
                tracked.unfilled_amount = tracked.unfilled_amount.min(remaining);
                tracked.has_first_partial_fill |= is_first;
            })
            .or_insert_with(|| TrackedDeposit {
                deposit: deposit.clone(),
                unfilled_amount: remaining,
                has_first_partial_fill: is_first,
            });
    }

    #[cfg(test)]
    pub fn tracked_count(&self) -> usize {
        self.by_origin.values().map(BTreeMap::len).sum()
    }

    /// Flatten into the final list, dropping fully filled deposits
    pub fn into_unfilled_deposits(self) -> Vec<UnfilledDeposit> {
        self.by_origin
            .into_values()
            .flat_map(BTreeMap::into_values)
            .filter(|tracked| tracked.unfilled_amount > Decimal::ZERO)
            .map(|tracked| UnfilledDeposit {
                deposit: tracked.deposit,
                unfilled_amount: tracked.unfilled_amount,
                has_first_partial_fill: tracked.has_first_partial_fill,
            })
            .collect()
    }
}

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult};
use crate::ledger::models::{Address, ChainId, Fill};

/// Refunds owed on one (repayment chain, repayment token)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundEntry {
    /// Fills assigned to this entry, positional metadata stripped
    pub fills: Vec<Fill>,
    /// Relayer -> refund owed
    pub refunds: BTreeMap<Address, Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_refund_amount: Decimal,
    /// Absolute LP fees charged across all fills, slow relays included
    #[serde(with = "rust_decimal::serde::str")]
    pub realized_lp_fees: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub filled_volume: Decimal,
    /// Sum of fill_amount * realized_lp_fee_pct, kept exact
    #[serde(with = "rust_decimal::serde::str")]
    pub weighted_fee_sum: Decimal,
}

impl RefundEntry {
    /// Size-weighted realized LP fee percentage over every fill in this entry
    pub fn realized_lp_fee_pct(&self) -> Decimal {
        if self.filled_volume.is_zero() {
            return Decimal::ZERO;
        }
        self.weighted_fee_sum
            .checked_div(self.filled_volume)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn refund_for(&self, relayer: &Address) -> Decimal {
        self.refunds.get(relayer).copied().unwrap_or(Decimal::ZERO)
    }

    fn add_fill(&mut self, fill: &Fill) -> AppResult<()> {
        if fill.fill_amount.is_sign_negative() {
            return Err(AppError::InvalidAmount(format!(
                "negative fill amount {} for deposit {}",
                fill.fill_amount,
                fill.deposit_key()
            )));
        }
        if fill.realized_lp_fee_pct.is_sign_negative() || fill.realized_lp_fee_pct > dec!(1) {
            return Err(AppError::InvalidAmount(format!(
                "realized LP fee pct {} out of range for deposit {}",
                fill.realized_lp_fee_pct,
                fill.deposit_key()
            )));
        }

        let weighted_fee = checked_mul(fill.fill_amount, fill.realized_lp_fee_pct)?;
        let lp_fee = weighted_fee.trunc();

        self.realized_lp_fees = checked_add(self.realized_lp_fees, lp_fee)?;
        self.weighted_fee_sum = checked_add(self.weighted_fee_sum, weighted_fee)?;
        self.filled_volume = checked_add(self.filled_volume, fill.fill_amount)?;
        self.fills.push(fill.without_position());

        // Slow relays are paid out of the spoke pool, nobody is owed a refund
        if fill.is_slow_relay {
            return Ok(());
        }

        let refund = fill.fill_amount - lp_fee;
        self.total_refund_amount = checked_add(self.total_refund_amount, refund)?;
        let owed = self.refunds.entry(fill.relayer.clone()).or_insert(Decimal::ZERO);
        *owed = checked_add(*owed, refund)?;

        Ok(())
    }
}

/// Refund ledger: repayment chain -> repayment token -> entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefundLedger {
    entries: BTreeMap<ChainId, BTreeMap<Address, RefundEntry>>,
}

impl RefundLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a valid fill's refund to (repayment chain, repayment token)
    pub fn add_valid_fill(
        &mut self,
        fill: &Fill,
        repayment_chain_id: ChainId,
        repayment_token: &Address,
    ) -> AppResult<()> {
        self.entries
            .entry(repayment_chain_id)
            .or_default()
            .entry(repayment_token.clone())
            .or_default()
            .add_fill(fill)
    }

    pub fn entry(&self, chain_id: ChainId, token: &Address) -> Option<&RefundEntry> {
        self.entries.get(&chain_id).and_then(|tokens| tokens.get(token))
    }

    pub fn tokens_mut(&mut self, chain_id: ChainId) -> Option<&mut BTreeMap<Address, RefundEntry>> {
        self.entries.get_mut(&chain_id)
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChainId, &Address, &RefundEntry)> {
        self.entries
            .iter()
            .flat_map(|(chain_id, tokens)| tokens.iter().map(move |(token, entry)| (*chain_id, token, entry)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of (chain, token, relayer) refunds in the ledger
    pub fn refund_count(&self) -> usize {
        self.iter().map(|(_, _, entry)| entry.refunds.len()).sum()
    }

    pub fn refunds_for(&self, relayer: &Address, chain_id: ChainId, token: &Address) -> Decimal {
        self.entry(chain_id, token)
            .map(|entry| entry.refund_for(relayer))
            .unwrap_or(Decimal::ZERO)
    }
}

/// Refund owed to `relayer` on (chain, token); zero when any key is absent
pub fn get_refunds_for(
    ledger: &RefundLedger,
    relayer: &Address,
    chain_id: ChainId,
    token: &Address,
) -> Decimal {
    ledger.refunds_for(relayer, chain_id, token)
}

/// Sum of one relayer's refund on (chain, token) across several ledgers
pub fn get_total_refund(
    ledgers: &[RefundLedger],
    relayer: &Address,
    chain_id: ChainId,
    token: &Address,
) -> Decimal {
    ledgers.iter().fold(Decimal::ZERO, |total, ledger| {
        total.saturating_add(ledger.refunds_for(relayer, chain_id, token))
    })
}

fn checked_add(a: Decimal, b: Decimal) -> AppResult<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| AppError::AmountOverflow(format!("{} + {}", a, b)))
}

fn checked_mul(a: Decimal, b: Decimal) -> AppResult<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| AppError::AmountOverflow(format!("{} * {}", a, b)))
}

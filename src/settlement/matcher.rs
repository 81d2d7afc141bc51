use futures::future::try_join_all;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::adapters::traits::{RefundInformation, RefundResolver, SpokePoolClient};
use crate::error::AppResult;
use crate::ledger::models::*;
use crate::ledger::{RefundLedger, UnfilledDepositTracker};
use crate::settlement::fallback::HistoricalDepositResolver;
use crate::settlement::ranges::{block_range_for_chain, split_pre_activation, unique_deposits_in_range};

#[derive(Debug, Default)]
struct ContextState {
    ledger: RefundLedger,
    tracker: UnfilledDepositTracker,
    deposits: Vec<Deposit>,
    pre_activation_deposits: Vec<Deposit>,
    seen_deposits: HashSet<DepositKey>,
    seen_fills: HashSet<FillKey>,
    all_valid_fills: Vec<Fill>,
    invalid_fills: Vec<Fill>,
    duplicate_fills: usize,
}

/// What one `load_data` run accumulated, before the tracker is flattened
#[derive(Debug)]
pub struct ReconciliationOutput {
    pub result: ReconciliationResult,
    pub invalid_fills: Vec<Fill>,
    pub duplicate_fills: usize,
}

/// Accumulators shared by every matching step of one run.
///
/// All mutation goes through these methods, each of which holds the lock
/// only for its own body and never across an await point. A fill validation
/// therefore sees a consistent state at the moment it inserts.
#[derive(Debug, Default)]
pub struct ReconciliationContext {
    state: Mutex<ContextState>,
}

impl ReconciliationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add in-range deposits for one chain pair, skipping any already collected
    pub fn collect_deposits(
        &self,
        block_ranges: &[BlockRange],
        origin_chain_id: ChainId,
        destination_chain_id: ChainId,
        chain_id_list: &[ChainId],
        candidates: Vec<Deposit>,
        activation_block: Option<u64>,
    ) -> AppResult<()> {
        let mut state = self.state.lock();
        let unique = unique_deposits_in_range(
            block_ranges,
            origin_chain_id,
            destination_chain_id,
            chain_id_list,
            candidates,
            &state.seen_deposits,
        )?;
        state.seen_deposits.extend(unique.iter().map(Deposit::key));

        let (activated, pre_activation) = split_pre_activation(unique, activation_block);
        state.deposits.extend(activated);
        state.pre_activation_deposits.extend(pre_activation);
        Ok(())
    }

    /// Accept a fill unless an identical one was accepted already.
    /// Returns `false` for duplicates.
    pub fn try_add_valid_fill(&self, fill: &Fill) -> bool {
        let mut state = self.state.lock();
        if !state.seen_fills.insert(fill.dedup_key()) {
            state.duplicate_fills += 1;
            return false;
        }
        state.all_valid_fills.push(fill.clone());
        true
    }

    pub fn record_invalid_fill(&self, fill: Fill) {
        self.state.lock().invalid_fills.push(fill);
    }

    /// Credit the fill's refund and track its deposit as partially filled
    pub fn credit_refund(&self, fill: &Fill, deposit: &Deposit, refund: &RefundInformation) -> AppResult<()> {
        let mut state = self.state.lock();
        state
            .ledger
            .add_valid_fill(fill, refund.repayment_chain_id, &refund.repayment_token)?;
        state.tracker.record_fill(fill, deposit);
        Ok(())
    }

    pub fn into_output(self) -> ReconciliationOutput {
        let state = self.state.into_inner();
        ReconciliationOutput {
            result: ReconciliationResult {
                fills_to_refund: state.ledger,
                deposits: state.deposits,
                all_valid_fills: state.all_valid_fills,
                unfilled_deposits: state.tracker.into_unfilled_deposits(),
                pre_activation_deposits: state.pre_activation_deposits,
            },
            invalid_fills: state.invalid_fills,
            duplicate_fills: state.duplicate_fills,
        }
    }
}

/// Matches fills against deposits for one run's block ranges
pub struct DepositFillMatcher<'a> {
    block_ranges: &'a [BlockRange],
    chain_id_list: &'a [ChainId],
    refund_resolver: &'a dyn RefundResolver,
    fallback: HistoricalDepositResolver,
    context: &'a ReconciliationContext,
}

impl<'a> DepositFillMatcher<'a> {
    pub fn new(
        block_ranges: &'a [BlockRange],
        chain_id_list: &'a [ChainId],
        refund_resolver: &'a dyn RefundResolver,
        context: &'a ReconciliationContext,
    ) -> Self {
        Self {
            block_ranges,
            chain_id_list,
            refund_resolver,
            fallback: HistoricalDepositResolver::new(),
            context,
        }
    }

    /// Match every fill on `destination` for deposits from `origin`.
    ///
    /// Fills are only bounded above by the destination range end: older
    /// fills still have to be seen so duplicates of them are rejected.
    pub async fn match_chain_pair(
        &self,
        origin: &dyn SpokePoolClient,
        destination: &dyn SpokePoolClient,
        activation_block: Option<u64>,
    ) -> AppResult<()> {
        let origin_chain_id = origin.chain_id();
        let destination_chain_id = destination.chain_id();
        let destination_range =
            block_range_for_chain(self.block_ranges, destination_chain_id, self.chain_id_list)?;

        self.context.collect_deposits(
            self.block_ranges,
            origin_chain_id,
            destination_chain_id,
            self.chain_id_list,
            origin.deposits_for_destination_chain(destination_chain_id),
            activation_block,
        )?;

        let fills: Vec<Fill> = destination
            .fills_for_origin_chain(origin_chain_id)
            .into_iter()
            .filter(|fill| fill.destination_block_number() <= destination_range.end)
            .collect();

        debug!(
            "Matching {} fills for {} -> {}",
            fills.len(),
            origin_chain_id,
            destination_chain_id
        );

        try_join_all(
            fills
                .into_iter()
                .map(|fill| self.resolve_and_validate(origin, fill, destination_range)),
        )
        .await?;

        Ok(())
    }

    async fn resolve_and_validate(
        &self,
        origin: &dyn SpokePoolClient,
        fill: Fill,
        destination_range: BlockRange,
    ) -> AppResult<()> {
        let deposit = match origin.deposit_for_fill(&fill) {
            Some(deposit) => Some(deposit),
            None => self.fallback.resolve(origin, &fill).await?,
        };

        match deposit {
            Some(deposit) => self.validate_fill_and_save(&fill, &deposit, destination_range),
            None => {
                self.context.record_invalid_fill(fill);
                Ok(())
            }
        }
    }

    fn validate_fill_and_save(&self, fill: &Fill, deposit: &Deposit, destination_range: BlockRange) -> AppResult<()> {
        if !self.context.try_add_valid_fill(fill) {
            warn!(
                origin_chain_id = fill.origin_chain_id,
                deposit_id = fill.deposit_id,
                total_filled_amount = %fill.total_filled_amount,
                block_number = fill.destination_block_number(),
                "Discarding duplicate fill"
            );
            return Ok(());
        }

        // Older fills only count toward duplicate and first-fill detection
        if fill.destination_block_number() < destination_range.start {
            return Ok(());
        }

        let refund = self.refund_resolver.refund_information(
            fill,
            deposit,
            self.block_ranges,
            self.chain_id_list,
        )?;
        self.context.credit_refund(&fill.without_position(), deposit, &refund)
    }
}

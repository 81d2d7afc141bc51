use std::collections::HashSet;

use crate::error::{AppError, AppResult};
use crate::ledger::models::{BlockRange, ChainId, Deposit, DepositKey};

/// A chain is disabled for a bundle when its range is frozen on a single block
pub fn is_chain_disabled(range: &BlockRange) -> bool {
    range.start == range.end
}

/// Range assigned to `chain_id`, located by its position in the fixed chain list
pub fn block_range_for_chain(
    block_ranges: &[BlockRange],
    chain_id: ChainId,
    chain_id_list: &[ChainId],
) -> AppResult<BlockRange> {
    chain_id_list
        .iter()
        .position(|candidate| *candidate == chain_id)
        .and_then(|index| block_ranges.get(index))
        .copied()
        .ok_or(AppError::MissingBlockRange(chain_id))
}

/// Exact, order-sensitive fingerprint of a range set
pub fn block_ranges_fingerprint(block_ranges: &[BlockRange]) -> AppResult<String> {
    Ok(serde_json::to_string(block_ranges)?)
}

/// Deposits from `candidates` emitted inside the origin chain's range and
/// headed to `destination_chain_id`, skipping keys already in `seen`
pub fn unique_deposits_in_range(
    block_ranges: &[BlockRange],
    origin_chain_id: ChainId,
    destination_chain_id: ChainId,
    chain_id_list: &[ChainId],
    candidates: Vec<Deposit>,
    seen: &HashSet<DepositKey>,
) -> AppResult<Vec<Deposit>> {
    let origin_range = block_range_for_chain(block_ranges, origin_chain_id, chain_id_list)?;

    let mut picked: HashSet<DepositKey> = HashSet::new();
    Ok(candidates
        .into_iter()
        .filter(|deposit| {
            deposit.origin_chain_id == origin_chain_id
                && deposit.destination_chain_id == destination_chain_id
                && origin_range.contains(deposit.origin_block_number())
        })
        .filter(|deposit| !seen.contains(&deposit.key()) && picked.insert(deposit.key()))
        .collect())
}

/// Split deposits into (activated, pre-activation) around the fee model's
/// activation block
pub fn split_pre_activation(
    deposits: Vec<Deposit>,
    activation_block: Option<u64>,
) -> (Vec<Deposit>, Vec<Deposit>) {
    match activation_block {
        None => (deposits, Vec::new()),
        Some(activation_block) => deposits
            .into_iter()
            .partition(|deposit| deposit.origin_block_number() >= activation_block),
    }
}

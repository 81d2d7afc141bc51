// Human-readable summaries of a reconciliation run, for diagnostics only.

use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::ledger::models::*;

fn route_counts(routes: impl Iterator<Item = (ChainId, ChainId)>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for (from, to) in routes {
        *counts.entry(format!("{}->{}", from, to)).or_insert(0) += 1;
    }
    counts
}

/// Per-route event counts and per-entry refund totals for one run
pub fn summarize_result(
    result: &ReconciliationResult,
    block_ranges: &[BlockRange],
    chain_id_list: &[ChainId],
) -> Value {
    let ranges: BTreeMap<String, [u64; 2]> = chain_id_list
        .iter()
        .zip(block_ranges)
        .map(|(chain_id, range)| (chain_id.to_string(), [range.start, range.end]))
        .collect();

    let refunds: BTreeMap<String, Value> = result
        .fills_to_refund
        .iter()
        .map(|(chain_id, token, entry)| {
            (
                format!("{}:{}", chain_id, token),
                json!({
                    "fills": entry.fills.len(),
                    "relayers": entry.refunds.len(),
                    "total_refund_amount": entry.total_refund_amount.to_string(),
                    "realized_lp_fee_pct": entry.realized_lp_fee_pct().to_string(),
                }),
            )
        })
        .collect();

    json!({
        "block_ranges": ranges,
        "deposits": route_counts(result.deposits.iter().map(|d| (d.origin_chain_id, d.destination_chain_id))),
        "pre_activation_deposits": result.pre_activation_deposits.len(),
        "fills": route_counts(result.all_valid_fills.iter().map(|f| (f.origin_chain_id, f.destination_chain_id))),
        "refunds": refunds,
        "unfilled_deposits": route_counts(
            result
                .unfilled_deposits
                .iter()
                .map(|u| (u.deposit.origin_chain_id, u.deposit.destination_chain_id))
        ),
    })
}

/// Fills that could not be matched to any deposit, grouped by route
pub fn summarize_invalid_fills(fills: &[Fill]) -> Value {
    let mut by_route: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for fill in fills {
        by_route
            .entry(format!("{}->{}", fill.origin_chain_id, fill.destination_chain_id))
            .or_default()
            .push(json!({
                "deposit_id": fill.deposit_id,
                "relayer": fill.relayer,
                "fill_amount": fill.fill_amount.to_string(),
                "block_number": fill.destination_block_number(),
                "transaction_hash": fill.position.transaction_hash,
            }));
    }
    json!(by_route)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::fixtures::{deposit, fill};
    use rust_decimal_macros::dec;

    #[test]
    fn test_summarize_result_counts_routes() {
        let d1 = deposit(1, 10, 1, dec!(100), 5);
        let d2 = deposit(1, 10, 2, dec!(100), 6);
        let d3 = deposit(10, 1, 1, dec!(100), 6);
        let result = ReconciliationResult {
            deposits: vec![d1.clone(), d2, d3],
            all_valid_fills: vec![fill(&d1, dec!(40), dec!(40), 12)],
            ..Default::default()
        };

        let summary = summarize_result(&result, &[BlockRange::new(0, 10), BlockRange::new(0, 20)], &[1, 10]);
        assert_eq!(summary["deposits"]["1->10"], 2);
        assert_eq!(summary["deposits"]["10->1"], 1);
        assert_eq!(summary["fills"]["1->10"], 1);
        assert_eq!(summary["block_ranges"]["10"], json!([0, 20]));
    }

    #[test]
    fn test_summarize_invalid_fills() {
        let d = deposit(1, 10, 5, dec!(100), 5);
        let summary = summarize_invalid_fills(&[fill(&d, dec!(40), dec!(40), 12)]);
        assert_eq!(summary["1->10"][0]["deposit_id"], 5);
        assert_eq!(summary["1->10"][0]["fill_amount"], "40");
    }
}

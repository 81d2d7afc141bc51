use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, AppResult};
use crate::ledger::refunds::RefundLedger;

/// Numeric chain identifier, normalized across every map in the crate
pub type ChainId = u64;

/// Deposit counter assigned by the origin spoke pool
pub type DepositId = u32;

/// (origin chain, deposit id, total filled amount) identifying one fill event
pub type FillKey = (ChainId, DepositId, Decimal);

/// Account or token address.
///
/// Always stored lowercased so that the same address read from two
/// different chains' event stores lands on the same ledger key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Address::new(value)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Address::new(value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive block range assigned to one chain in a bundle.
///
/// Serialized as `[start, end]`, which is also the shape the cache
/// fingerprint is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u64; 2]", into = "[u64; 2]")]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, block_number: u64) -> bool {
        block_number >= self.start && block_number <= self.end
    }
}

impl From<[u64; 2]> for BlockRange {
    fn from(value: [u64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<BlockRange> for [u64; 2] {
    fn from(value: BlockRange) -> Self {
        [value.start, value.end]
    }
}

/// Where an event was emitted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPosition {
    pub block_number: u64,
    #[serde(default)]
    pub transaction_index: u32,
    #[serde(default)]
    pub log_index: u32,
    #[serde(default)]
    pub transaction_hash: String,
}

/// Identity of a deposit across every chain: (origin chain, deposit id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepositKey {
    pub origin_chain_id: ChainId,
    pub deposit_id: DepositId,
}

impl fmt::Display for DepositKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.origin_chain_id, self.deposit_id)
    }
}

/// A user-initiated transfer request recorded on its origin chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub origin_chain_id: ChainId,
    pub destination_chain_id: ChainId,
    pub deposit_id: DepositId,
    pub depositor: Address,
    pub recipient: Address,
    pub origin_token: Address,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub quote_timestamp: u32,
    #[serde(flatten)]
    pub position: EventPosition,
}

impl Deposit {
    pub fn key(&self) -> DepositKey {
        DepositKey {
            origin_chain_id: self.origin_chain_id,
            deposit_id: self.deposit_id,
        }
    }

    pub fn origin_block_number(&self) -> u64 {
        self.position.block_number
    }
}

/// A relayer's action on the destination chain completing some or all of a deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub origin_chain_id: ChainId,
    pub destination_chain_id: ChainId,
    pub deposit_id: DepositId,
    pub depositor: Address,
    pub recipient: Address,
    pub relayer: Address,
    /// Deposit amount as seen by the relayer
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    /// Cumulative amount filled for the deposit after this fill
    #[serde(with = "rust_decimal::serde::str")]
    pub total_filled_amount: Decimal,
    /// Amount this fill added
    #[serde(with = "rust_decimal::serde::str")]
    pub fill_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub realized_lp_fee_pct: Decimal,
    pub repayment_chain_id: ChainId,
    pub destination_token: Address,
    #[serde(default)]
    pub is_slow_relay: bool,
    #[serde(flatten)]
    pub position: EventPosition,
}

impl Fill {
    pub fn deposit_key(&self) -> DepositKey {
        DepositKey {
            origin_chain_id: self.origin_chain_id,
            deposit_id: self.deposit_id,
        }
    }

    pub fn destination_block_number(&self) -> u64 {
        self.position.block_number
    }

    /// Two fills are the same economic event when they share this key,
    /// wherever they were logged.
    pub fn dedup_key(&self) -> FillKey {
        (self.origin_chain_id, self.deposit_id, self.total_filled_amount)
    }

    /// The first fill for a deposit is the one that filled everything filled
    /// so far. A zero-amount fill filled nothing and never counts.
    pub fn is_first_fill(&self) -> bool {
        self.fill_amount > Decimal::ZERO && self.fill_amount == self.total_filled_amount
    }

    pub fn remaining_amount(&self) -> Decimal {
        self.amount.saturating_sub(self.total_filled_amount)
    }

    /// Copy of this fill with block/transaction/log position cleared
    pub fn without_position(&self) -> Fill {
        Fill {
            position: EventPosition::default(),
            ..self.clone()
        }
    }

    /// Check that this fill was made against exactly this deposit's terms
    pub fn matches_deposit(&self, deposit: &Deposit) -> bool {
        self.origin_chain_id == deposit.origin_chain_id
            && self.destination_chain_id == deposit.destination_chain_id
            && self.deposit_id == deposit.deposit_id
            && self.depositor == deposit.depositor
            && self.recipient == deposit.recipient
            && self.amount == deposit.amount
    }
}

/// A deposit with an in-range fill that left part of it outstanding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnfilledDeposit {
    pub deposit: Deposit,
    #[serde(with = "rust_decimal::serde::str")]
    pub unfilled_amount: Decimal,
    /// Whether the deposit's first fill fell inside the range. Slow relays
    /// are only owed for deposits where this holds.
    pub has_first_partial_fill: bool,
}

/// A historical root bundle proposal on the hub chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootBundle {
    pub block_number: u64,
    pub relayer_refund_root: String,
    pub bundle_evaluation_block_numbers: Vec<u64>,
}

/// A root bundle relayed to a spoke pool, making its leaves executable there
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootBundleRelay {
    pub root_bundle_id: u32,
    pub relayer_refund_root: String,
    #[serde(flatten)]
    pub position: EventPosition,
}

/// An executed relayer refund leaf on a spoke pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerRefundExecution {
    pub root_bundle_id: u32,
    pub leaf_id: u32,
    pub chain_id: ChainId,
    pub l2_token_address: Address,
    pub refund_addresses: Vec<Address>,
    pub refund_amounts: Vec<Decimal>,
    #[serde(flatten)]
    pub position: EventPosition,
}

/// Everything `load_data` computes for one set of block ranges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub fills_to_refund: RefundLedger,
    pub deposits: Vec<Deposit>,
    /// Every valid fill seen, including fills older than the ranges
    pub all_valid_fills: Vec<Fill>,
    pub unfilled_deposits: Vec<UnfilledDeposit>,
    pub pre_activation_deposits: Vec<Deposit>,
}

/// Normalize a refund root to `0x`-prefixed lowercase hex, rejecting
/// anything that is not exactly 32 bytes.
pub fn normalize_refund_root(root: &str) -> AppResult<String> {
    let trimmed = root.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(stripped)?;
    if bytes.len() != 32 {
        return Err(AppError::InvalidRefundRoot(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(format!("0x{}", hex::encode(bytes)))
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_address_normalization() {
        assert_eq!(Address::new(" 0xAbC "), Address::new("0xabc"));
        let parsed: Address = serde_json::from_str("\"0xDEAD\"").unwrap();
        assert_eq!(parsed.as_str(), "0xdead");
    }

    #[test]
    fn test_block_range_serializes_as_pair() {
        let ranges = vec![BlockRange::new(1, 2), BlockRange::new(3, 4)];
        assert_eq!(serde_json::to_string(&ranges).unwrap(), "[[1,2],[3,4]]");
        assert!(BlockRange::new(10, 20).contains(20));
        assert!(!BlockRange::new(10, 20).contains(9));
    }

    #[test]
    fn test_duplicate_ignores_position() {
        let d = deposit(1, 10, 7, dec!(100), 5);
        let first = fill(&d, dec!(40), dec!(40), 12);
        let mut replay = fill(&d, dec!(40), dec!(40), 15);
        replay.position.log_index = 3;
        assert_eq!(first.dedup_key(), replay.dedup_key());

        let later = fill(&d, dec!(20), dec!(60), 13);
        assert_ne!(first.dedup_key(), later.dedup_key());
        assert!(first.is_first_fill());
        assert!(!later.is_first_fill());
    }

    #[test]
    fn test_zero_amount_fill_is_not_first_fill() {
        let d = deposit(1, 10, 7, dec!(100), 5);
        let empty = fill(&d, dec!(0), dec!(0), 12);
        assert!(!empty.is_first_fill());
        assert_eq!(empty.remaining_amount(), dec!(100));
    }

    #[test]
    fn test_fill_matches_deposit() {
        let d = deposit(1, 10, 7, dec!(100), 5);
        let mut f = fill(&d, dec!(40), dec!(40), 12);
        assert!(f.matches_deposit(&d));

        f.amount = dec!(99);
        assert!(!f.matches_deposit(&d));
    }

    #[test]
    fn test_normalize_refund_root() {
        let root = format!("0x{}", "AB".repeat(32));
        assert_eq!(normalize_refund_root(&root).unwrap(), format!("0x{}", "ab".repeat(32)));
        assert!(normalize_refund_root("0x1234").is_err());
        assert!(normalize_refund_root("not hex").is_err());
    }
}

pub mod models;
pub mod refunds;
pub mod unfilled;

pub use refunds::{get_refunds_for, get_total_refund, RefundEntry, RefundLedger};
pub use unfilled::UnfilledDepositTracker;

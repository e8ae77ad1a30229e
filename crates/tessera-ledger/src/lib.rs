//! # Tessera Ledger
//!
//! The wallet ledger for the Tessera billing engine: the single writer
//! path for every balance in the system.
//!
//! ## Components
//!
//! - **Ledger**: wallet registry plus atomic, idempotent transfers
//! - **TransactionRecord**: immutable append-only commit log entries
//! - **TransferLeg**: one credit leg of a batch; batches commit all-or-nothing
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                       Ledger                         │
//! ├──────────────────────────────────────────────────────┤
//! │  wallets          committed           log            │
//! │  (per-wallet  ──  (idempotency   ──  (append-only,   │
//! │   mutexes)         key -> record)     commit order)  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Callers retry after network ambiguity, so every operation takes an
//! idempotency key and replays its committed result instead of
//! re-applying.

pub mod ledger;
pub mod transaction;

pub use ledger::{ConservationReport, Ledger, LedgerConfig, LedgerMetrics};
pub use transaction::{TransactionRecord, TransferKind, TransferLeg};

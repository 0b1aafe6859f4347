pub mod error;
pub mod ledger;
pub mod store;

pub use error::{LedgerError, StoreError};
pub use ledger::{validate_snapshot, AppendOutcome, ClaimLedger, RejectedDraft};
pub use store::{SessionStore, SessionSummary, SESSION_STORE_DDL};

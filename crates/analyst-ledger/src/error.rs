use analyst_models::{ClaimId, ClaimStatus};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Round {requested} is before the current round {current}")]
    RoundRegression { current: u32, requested: u32 },

    #[error("Round {round} has not started (current round {current})")]
    FutureRound { round: u32, current: u32 },

    #[error("Claim text is empty")]
    EmptyText,

    #[error("Confidence {0} is outside [0, 1]")]
    InvalidConfidence(Decimal),

    #[error("Unknown claim: {0}")]
    UnknownClaim(ClaimId),

    #[error("Reference to {claim} from round {claim_round} is not strictly earlier than round {round}")]
    ForwardReference {
        claim: ClaimId,
        claim_round: u32,
        round: u32,
    },

    #[error("Gathered evidence #{0} does not exist")]
    UnknownEvidence(usize),

    #[error("Gathered evidence #{0} is a failed tool call")]
    FailedEvidence(usize),

    #[error("Gathered evidence #{0} already backs another claim")]
    EvidenceReused(usize),

    #[error("{claim} belongs to '{owner}' and cannot be superseded by '{expert}'")]
    ForeignSupersede {
        claim: ClaimId,
        owner: String,
        expert: String,
    },

    #[error("{claim} is {from} and cannot change status")]
    InvalidTransition { claim: ClaimId, from: ClaimStatus },

    #[error("Invalid ledger snapshot: {0}")]
    Snapshot(String),

    #[error("Ledger not available: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt session record: {0}")]
    Corrupt(String),

    #[error("Stored ledger failed validation: {0}")]
    Ledger(#[from] LedgerError),
}

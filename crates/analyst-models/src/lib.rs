pub mod claim;
pub mod config;
pub mod conflict;
pub mod expert_message;
pub mod question;
pub mod report;
pub mod snapshot;
pub mod tool;

pub use claim::{
    Claim, ClaimDraft, ClaimId, ClaimStatus, DraftEvidence, EvidenceId, EvidenceRecord,
    EvidenceRef,
};
pub use config::{
    AnalystConfig, DetectorConfig, LlmConfig, MarketDataConfig, OrchestratorConfig,
    PersonaConfig, PluginConfig, StoreConfig, ToolsConfig,
};
pub use conflict::{Conflict, ConflictKind, ConflictSide, Resolution};
pub use expert_message::{
    ClaimProposal, EvidenceItem, ExpertOpinion, ExpertRequest, ExpertResponse, OpinionStatus,
    ToolEvidence, ToolOutcome,
};
pub use question::Question;
pub use report::{
    ClaimRow, DegradedNote, ErrorKind, ExpertGroup, FinalReport, ReportClaim, SessionStatus,
    REPORT_SCHEMA_VERSION,
};
pub use snapshot::{ChangeReason, LedgerSnapshot, RoundRecord, SessionSnapshot, StatusChange};
pub use tool::ToolKind;

pub mod arbiter;
pub mod backend;
pub mod conflict;
pub mod error;
pub mod evidence;
pub mod expert;
pub mod orchestrator;
pub mod parser;
pub mod persona;
pub mod prompts;
pub mod synthesizer;
pub mod topic;

pub mod test_support;

pub use arbiter::{Arbiter, LlmArbiter};
pub use backend::{check_cli_available, CommandBackend, LlmBackend};
pub use conflict::ConflictDetector;
pub use error::{AgentError, FailedSession, SessionError};
pub use expert::{Expert, ExpertContext, PersonaExpert};
pub use orchestrator::{next_status, Orchestrator, SessionOutcome};
pub use persona::Persona;
pub use synthesizer::{synthesize, SynthesisInput};
pub use topic::{KeywordNormalizer, SubjectNormalizer};

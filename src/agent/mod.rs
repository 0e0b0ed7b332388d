pub mod machine;
pub mod orchestrator;
pub mod questions;
pub mod registry;

pub use machine::{AdvanceResult, FinalizeRefusal, InterviewMachine, InterviewPhase};
pub use orchestrator::{Orchestrator, SessionOutcome};
pub use questions::{analyze_documents, fallback_questions, generate_questions};
pub use registry::{RoomClaim, RoomRegistry};

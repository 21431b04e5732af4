// Screening pipeline: prompt templates, the three-stage LLM orchestration,
// and the report data model it produces.
// All LLM calls go through llm_client; nothing here talks HTTP directly.

pub mod models;
pub mod orchestrator;
pub mod prompts;

pub use models::Report;
pub use orchestrator::{generate_report, CandidateDocument, ScreeningInput};

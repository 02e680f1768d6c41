use agentflow_llm::provider::LlmError;

use crate::action::ActionError;
use crate::interpreter::{InterpretError, InterpretFailure};
use crate::store::StoreError;

/// Failure taxonomy of one agent run. Every variant ends up as
/// `{ok:false, error:<Display>}` at the orchestrator boundary.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error("model unavailable: {0}")]
    ModelUnavailable(#[from] LlmError),
    #[error("interpretation failed: {0}")]
    InterpretationFailure(#[from] InterpretError),
    #[error("unknown_function")]
    UnknownFunction(String),
    #[error("invalid arguments for {action}: {reason}")]
    InvalidArguments { action: &'static str, reason: String },
    #[error("{action} failed: {source}")]
    HandlerFailure {
        action: &'static str,
        #[source]
        source: ActionError,
    },
}

impl From<InterpretFailure> for AgentError {
    fn from(failure: InterpretFailure) -> Self {
        match failure {
            InterpretFailure::Model(e) => Self::ModelUnavailable(e),
            InterpretFailure::Parse(e) => Self::InterpretationFailure(e),
        }
    }
}

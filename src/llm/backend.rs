use crate::error::Result;
use crate::llm::client::{ChatTurn, LlmClient};

/// Opaque text-completion boundary. Anything that turns an ordered list of
/// role-tagged turns into one completion can drive a session, which keeps
/// the pipeline testable without network access.
pub trait CompletionService {
    fn complete(&self, turns: &[ChatTurn]) -> Result<String>;
}

impl CompletionService for LlmClient {
    fn complete(&self, turns: &[ChatTurn]) -> Result<String> {
        LlmClient::complete(self, turns)
    }
}

//! llm/orchestrator.rs
//!
//! Drives the conversational part of one generation session: replays the
//! prompt chain as successive user turns, retains every response, and
//! records the final code block as the candidate test.

use regex::Regex;

use crate::error::Result;
use crate::extractor::SourceFunction;
use crate::llm::backend::CompletionService;
use crate::llm::client::{ChatTurn, Role};
use crate::llm::prompt::{self, PromptState};

const SYSTEM_PROMPT: &str = "\
You are a professional tester of C and C++ programs. When asked to write \
a test, answer only with compilable test code, without any explanatory \
text. The response must not reproduce the tested code.";

/// Binds one extracted function to its evolving prompt chain, the ordered
/// conversation, the current candidate test source, and the attempt
/// counter. Owned by the retry loop; never shared across functions.
#[derive(Debug, Clone)]
pub struct Session {
    pub function: SourceFunction,
    pub chain: Vec<PromptState>,
    pub turns: Vec<ChatTurn>,
    pub candidate: String,
    pub attempts: u32,
}

impl Session {
    pub fn new(function: SourceFunction, doc: Option<&str>, example: Option<&str>) -> Self {
        let body = if function.body.is_empty() {
            None
        } else {
            Some(function.body.as_str())
        };
        let chain = prompt::build_chain(&function.signature, body, doc, example);

        Self {
            function,
            chain,
            turns: vec![ChatTurn::system(SYSTEM_PROMPT)],
            candidate: String::new(),
            attempts: 0,
        }
    }
}

/// Send every not-yet-sent snapshot of the chain as a user turn. Each
/// response is appended as an assistant turn before the next snapshot goes
/// out, so the model always sees the full refinement history. The final
/// response's code block becomes the candidate test.
pub fn advance(session: &mut Session, service: &dyn CompletionService) -> Result<()> {
    let sent = session
        .turns
        .iter()
        .filter(|t| t.role == Role::User)
        .count();
    let pending: Vec<PromptState> = session.chain[sent..].to_vec();

    for state in &pending {
        session.turns.push(ChatTurn::user(prompt::render(state)));
        let response = service.complete(&session.turns)?;
        session.turns.push(ChatTurn::assistant(response));
    }

    if let Some(last) = session
        .turns
        .iter()
        .rev()
        .find(|t| t.role == Role::Assistant)
    {
        session.candidate = extract_code_block(&last.content);
    }

    Ok(())
}

/// First fenced code block tagged for C or C++; bare fences are accepted
/// too. When the model omits fencing entirely the raw response is used
/// verbatim, so stray prose surfaces as a compile failure instead of
/// stalling the pipeline.
pub fn extract_code_block(response: &str) -> String {
    let fence = Regex::new(r"(?s)```(?:c\+\+|cpp|c)?[ \t]*\n(.*?)```")
        .expect("fence pattern is valid");

    match fence.captures(response) {
        Some(caps) => caps[1].trim().to_string(),
        None => response.trim().to_string(),
    }
}

/* ============================================================
   Tests
   ============================================================ */

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct ScriptedService {
        responses: RefCell<Vec<String>>,
        turn_counts: RefCell<Vec<usize>>,
    }

    impl ScriptedService {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: RefCell::new(responses.iter().map(|s| s.to_string()).collect()),
                turn_counts: RefCell::new(Vec::new()),
            }
        }
    }

    impl CompletionService for ScriptedService {
        fn complete(&self, turns: &[ChatTurn]) -> Result<String> {
            self.turn_counts.borrow_mut().push(turns.len());
            Ok(self.responses.borrow_mut().remove(0))
        }
    }

    fn sample_function() -> SourceFunction {
        SourceFunction {
            signature: "int add(int a, int b)".into(),
            body: "int add(int a, int b) { return a + b; }".into(),
        }
    }

    #[test]
    fn session_replays_the_whole_chain_as_growing_conversation() {
        let service = ScriptedService::new(&[
            "```c\nint main(void) { return 0; }\n```",
            "```c\nint main(void) { assert(add(1, 2) == 3); return 0; }\n```",
        ]);

        // signature + body snapshots
        let mut session = Session::new(sample_function(), None, None);
        assert_eq!(session.chain.len(), 2);

        advance(&mut session, &service).expect("session runs");

        // system + 2 * (user + assistant)
        assert_eq!(session.turns.len(), 5);
        assert_eq!(*service.turn_counts.borrow(), vec![2, 4]);
        assert!(session.candidate.contains("assert(add(1, 2) == 3)"));
    }

    #[test]
    fn advance_sends_only_snapshots_added_since_the_last_call() {
        let service = ScriptedService::new(&["```c\nint main(void) { return 0; }\n```"]);
        let mut session = Session::new(sample_function(), None, None);
        // Pretend the base chain was already replayed.
        session.turns.push(ChatTurn::user("first"));
        session.turns.push(ChatTurn::assistant("```c\nold\n```"));
        session.turns.push(ChatTurn::user("second"));
        session.turns.push(ChatTurn::assistant("```c\nold\n```"));

        let tip = session.chain[session.chain.len() - 1].clone();
        session.chain.push(tip.with_error("error: use of undeclared identifier"));

        advance(&mut session, &service).expect("session runs");

        assert_eq!(service.turn_counts.borrow().len(), 1);
        assert_eq!(session.candidate, "int main(void) { return 0; }");
    }

    #[test]
    fn cpp_tagged_fence_is_extracted() {
        let text = "Here you go:\n```cpp\nint main() { return 0; }\n```\nDone.";
        assert_eq!(extract_code_block(text), "int main() { return 0; }");
    }

    #[test]
    fn c_tagged_fence_is_extracted() {
        let text = "```c\nint main(void) { return 0; }\n```";
        assert_eq!(extract_code_block(text), "int main(void) { return 0; }");
    }

    #[test]
    fn untagged_fence_is_extracted() {
        let text = "```\nint main() { return 0; }\n```";
        assert_eq!(extract_code_block(text), "int main() { return 0; }");
    }

    #[test]
    fn first_of_multiple_blocks_wins() {
        let text = "```c\nfirst();\n```\nand then\n```c\nsecond();\n```";
        assert_eq!(extract_code_block(text), "first();");
    }

    #[test]
    fn unfenced_response_falls_back_to_raw_text() {
        let text = "int main() { return 0; }";
        assert_eq!(extract_code_block(text), text);
    }
}

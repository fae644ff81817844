//! llm/prompt.rs
//!
//! Escalating-context prompt snapshots. A chain starts from a bare
//! signature and each refinement produces a new snapshot carrying strictly
//! more information; earlier snapshots stay valid for replay.

/// One refinement stage of a single function's test-generation attempt.
///
/// Snapshots are value types: every `with_*` call returns a fresh snapshot
/// and never touches the original, so a session can replay or branch its
/// history without corrupting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptState {
    pub signature: String,
    pub example: Option<String>,
    pub doc: Option<String>,
    pub body: Option<String>,
    /// Compiler diagnostic from the previous attempt, if any.
    pub error: Option<String>,
}

impl PromptState {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            example: None,
            doc: None,
            body: None,
            error: None,
        }
    }

    pub fn with_example(&self, example: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.example = Some(example.into());
        next
    }

    pub fn with_doc(&self, doc: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.doc = Some(doc.into());
        next
    }

    pub fn with_body(&self, body: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.body = Some(body.into());
        next
    }

    pub fn with_error(&self, error: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.error = Some(error.into());
        next
    }
}

/* ============================================================
   Chain construction
   ============================================================ */

/// Base chain for one function: the bare signature first, then one
/// snapshot per available optional input, strictly example, doc, body.
/// The whole chain is returned because the orchestrator replays it as
/// successive conversation turns.
pub fn build_chain(
    signature: &str,
    body: Option<&str>,
    doc: Option<&str>,
    example: Option<&str>,
) -> Vec<PromptState> {
    let mut current = PromptState::new(signature);
    let mut chain = vec![current.clone()];

    if let Some(example) = example {
        current = current.with_example(example);
        chain.push(current.clone());
    }
    if let Some(doc) = doc {
        current = current.with_doc(doc);
        chain.push(current.clone());
    }
    if let Some(body) = body {
        current = current.with_body(body);
        chain.push(current.clone());
    }

    chain
}

/// One more snapshot carrying the accumulated fields plus the compile
/// diagnostic. Used by the retry loop only.
pub fn refine_from_error(state: &PromptState, error: impl Into<String>) -> PromptState {
    state.with_error(error)
}

/* ============================================================
   Rendering
   ============================================================ */

const PREAMBLE: &str = "\
Your task is to generate a runnable test case for the provided code. \
Ensure that the test case covers the possible scenarios and edge cases, \
and that the code is easy to read and understand. Your response must \
contain only runnable code, without any of the original code, and follow \
common practices for testing.";

/// Deterministic template in fixed section order. Absent fields produce no
/// section at all, and identical snapshots always render identically.
pub fn render(state: &PromptState) -> String {
    let mut out = String::new();

    out.push_str(PREAMBLE);
    out.push_str("\n\nFunction for test:\n");
    out.push_str(&state.signature);
    out.push('\n');

    if state.body.is_some() {
        if let Some(doc) = &state.doc {
            out.push('\n');
            out.push_str(doc);
            out.push('\n');
        }
    }

    if let Some(example) = &state.example {
        out.push_str("\nExample of usage:\n");
        out.push_str(example);
        out.push('\n');
    }

    if let Some(doc) = &state.doc {
        out.push_str("\nDoc comment:\n");
        out.push_str(doc);
        out.push('\n');
    }

    if let Some(error) = &state.error {
        out.push('\n');
        out.push_str(error);
        out.push_str("\nFixed test:\n");
    }

    out
}

/* ============================================================
   Tests
   ============================================================ */

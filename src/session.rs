//! session.rs
//!
//! Per-function generate / compile / retry lifecycle.

use std::fmt;
use std::path::PathBuf;

use crate::compiler::{self, CompileInvocation, CompileResult, Toolchain};
use crate::config::RunConfig;
use crate::error::Result;
use crate::extractor::SourceFunction;
use crate::llm::backend::CompletionService;
use crate::llm::orchestrator::{self, Session};
use crate::llm::prompt;

/* ============================================================
   Lifecycle
   ============================================================ */

/// Retry state machine. Terminal phases are final; `Exhausted` is always
/// reported with the last diagnostic attached, never dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Building,
    Compiling,
    Retrying,
    Succeeded,
    Exhausted,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Exhausted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Building => "building",
            Phase::Compiling => "compiling",
            Phase::Retrying => "retrying",
            Phase::Succeeded => "succeeded",
            Phase::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub signature: String,
    pub phase: Phase,
    pub attempts: u32,
    pub result: CompileResult,
    pub artifact: Option<PathBuf>,
    /// Normalized source as written to the artifact.
    pub source: String,
}

/* ============================================================
   Retry controller
   ============================================================ */

pub struct RetryController<'a> {
    pub service: &'a dyn CompletionService,
    pub toolchain: &'a dyn Toolchain,
    pub config: &'a RunConfig,
    /// Optional doc text folded into every chain.
    pub doc: Option<String>,
    /// Optional usage example folded into every chain.
    pub example: Option<String>,
}

impl RetryController<'_> {
    pub fn run(&self, function: SourceFunction) -> Result<SessionOutcome> {
        let mut session = Session::new(function, self.doc.as_deref(), self.example.as_deref());
        self.drive(&mut session)
    }

    /// Building -> Compiling -> { Succeeded, Retrying -> Building, Exhausted }.
    /// Each retry appends a single error-refined snapshot to the existing
    /// chain, so conversation history from prior attempts is preserved.
    pub fn drive(&self, session: &mut Session) -> Result<SessionOutcome> {
        let artifact =
            compiler::session_artifact_path(&self.config.build_dir, self.config.language);

        let mut phase = Phase::Building;
        let mut last = CompileResult::empty();
        let mut source = String::new();

        while !phase.is_terminal() {
            match phase {
                Phase::Building => {
                    tracing::info!(
                        signature = %session.function.signature,
                        attempt = session.attempts + 1,
                        "generating candidate test"
                    );
                    orchestrator::advance(session, self.service)?;
                    phase = Phase::Compiling;
                }

                Phase::Compiling => {
                    source = compiler::normalize_source(
                        &session.candidate,
                        self.config.language,
                        &self.config.include_map,
                    );
                    compiler::write_test_source(&artifact, &source)?;

                    last = self.toolchain.compile(&self.invocation(&artifact))?;
                    session.attempts += 1;

                    if last.succeeded {
                        tracing::info!(
                            signature = %session.function.signature,
                            attempts = session.attempts,
                            "candidate test compiled"
                        );
                        phase = Phase::Succeeded;
                    } else if session.attempts >= self.config.max_attempts {
                        tracing::warn!(
                            signature = %session.function.signature,
                            attempts = session.attempts,
                            "retry budget exhausted"
                        );
                        phase = Phase::Exhausted;
                    } else {
                        phase = Phase::Retrying;
                    }
                }

                Phase::Retrying => {
                    let tip = session.chain.last().cloned();
                    if let Some(tip) = tip {
                        session
                            .chain
                            .push(prompt::refine_from_error(&tip, last.diagnostic()));
                    }
                    phase = Phase::Building;
                }

                Phase::Succeeded | Phase::Exhausted => {}
            }
        }

        Ok(SessionOutcome {
            signature: session.function.signature.clone(),
            phase,
            attempts: session.attempts,
            result: last,
            artifact: Some(artifact),
            source,
        })
    }

    fn invocation(&self, source: &std::path::Path) -> CompileInvocation {
        let mut sources = vec![source.to_path_buf()];
        sources.extend(self.config.extra_sources.iter().cloned());

        CompileInvocation {
            compiler: self.config.compiler.clone(),
            sources,
            output: source.with_extension("out"),
            include_dirs: self.config.include_dirs.clone(),
            link_libraries: self.config.link_libraries.clone(),
            extra_flags: self.config.extra_flags.clone(),
            coverage: self.config.coverage,
            timeout: self.config.compile_timeout(),
        }
    }
}

/* ============================================================
   Tests
   ============================================================ */

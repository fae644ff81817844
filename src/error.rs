//! error.rs
//!
//! Error taxonomy for the generation pipeline. Each variant maps to a
//! distinct recovery policy: path and extraction errors abort only the
//! affected session, completion and invocation errors surface through the
//! retry loop, and configuration errors abort the whole run.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Input file, include path, or tested module missing. Checked before
    /// any scanning or toolchain invocation.
    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// No candidate functions found in a source file.
    #[error("no candidate functions found in {}", .0.display())]
    ExtractionEmpty(PathBuf),

    /// Completion boundary failure that survived client-side retries.
    #[error("completion service: {0}")]
    CompletionService(String),

    /// The toolchain binary is missing or the invocation could not start.
    /// Distinct from a non-zero compiler exit; retrying cannot help.
    #[error("compiler invocation: {0}")]
    CompileInvocation(String),

    /// Invalid or unreadable configuration. Aborts the whole run.
    #[error("configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

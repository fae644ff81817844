//! extractor.rs
//!
//! Best-effort recovery of C/C++ function signatures and bodies from raw
//! source text. Candidate discovery is regex-based and body association is
//! line-by-line brace counting; there is no grammar, so braces inside
//! string literals or comments will confuse it.

use std::fs;
use std::path::Path;

use regex::Regex;

use crate::error::{Error, Result};

/// One discovered function. `body` runs from the line carrying the
/// signature through the matching closing brace, and is empty for a pure
/// declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFunction {
    pub signature: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub functions: Vec<SourceFunction>,
    /// `#include` lines in source order, duplicates retained. Later
    /// normalization rewrites specific paths, so nothing is collapsed here.
    pub includes: Vec<String>,
}

/* ============================================================
   Public entry
   ============================================================ */

pub fn extract(path: &Path) -> Result<Extraction> {
    if !path.is_file() {
        return Err(Error::PathNotFound(path.to_path_buf()));
    }

    let text =
        fs::read_to_string(path).map_err(|_| Error::PathNotFound(path.to_path_buf()))?;

    let extraction = extract_from_text(&text);
    if extraction.functions.is_empty() {
        return Err(Error::ExtractionEmpty(path.to_path_buf()));
    }

    Ok(extraction)
}

pub fn extract_from_text(text: &str) -> Extraction {
    let candidates = find_candidates(text);
    associate_bodies(text, &candidates)
}

/* ============================================================
   Phase 1: candidate discovery
   ============================================================ */

/// Three patterns tuned for different declaration shapes: a definition
/// whose opening brace may sit on the next line, a bare declaration, and a
/// class-scoped definition. Results are unioned with string-equality
/// dedup; order is insertion order of the union, stable within one run.
fn find_candidates(text: &str) -> Vec<String> {
    let inline_brace = Regex::new(r"\b\w+\s+\w+\s*\([^)]*\)\s*(?:\n\s*)?\{")
        .expect("inline-brace pattern is valid");
    let bare_decl =
        Regex::new(r"\b\w+\s+\w+\s*\([^)]*\)\s*").expect("bare-declaration pattern is valid");
    let qualified =
        Regex::new(r"\w+\s+\w+::\w+\([^)]*\)\s*\{").expect("qualified-name pattern is valid");

    let mut out: Vec<String> = Vec::new();

    for pattern in [&inline_brace, &bare_decl, &qualified] {
        for m in pattern.find_iter(text) {
            let sig = normalize_signature(m.as_str());
            if !sig.is_empty() && !out.contains(&sig) {
                out.push(sig);
            }
        }
    }

    out
}

/// Strip the trailing brace and tighten spacing after the closing paren so
/// the stored signature is body-free and directly usable as prompt text.
fn normalize_signature(raw: &str) -> String {
    let mut sig = raw.replace(" {", "").replace('{', "");
    sig = sig.replace(")\n", ")");
    while sig.contains(") ") {
        sig = sig.replace(") ", ")");
    }
    sig.trim().to_string()
}

/* ============================================================
   Phase 2: body association
   ============================================================ */

fn associate_bodies(text: &str, candidates: &[String]) -> Extraction {
    let mut functions = Vec::new();
    let mut includes = Vec::new();

    let mut in_function = false;
    let mut open_braces: i32 = 0;
    let mut current_signature = String::new();
    let mut current_body = String::new();

    for line in text.lines() {
        if line.contains("#include") {
            includes.push(format!("{line}\n"));
        }

        if in_function {
            open_braces += brace_delta(line);
            current_body.push_str(line);
            current_body.push('\n');

            if open_braces == 0 {
                functions.push(SourceFunction {
                    signature: std::mem::take(&mut current_signature),
                    body: std::mem::take(&mut current_body),
                });
                in_function = false;
            }
            continue;
        }

        let matched = candidates
            .iter()
            .find(|candidate| line.contains(candidate.as_str()));

        let Some(signature) = matched else {
            continue;
        };

        if line.contains('}') {
            // Single-line zero-body function: the line itself is the body.
            functions.push(SourceFunction {
                signature: signature.clone(),
                body: line.to_string(),
            });
        } else if line.contains('{') || !line.contains(';') {
            in_function = true;
            current_signature = signature.clone();
            current_body = format!("{line}\n");
            open_braces = brace_delta(line);
        } else {
            // Pure declaration: recorded with an empty body so signatures
            // and bodies stay index-aligned.
            functions.push(SourceFunction {
                signature: signature.clone(),
                body: String::new(),
            });
        }
    }

    Extraction {
        functions,
        includes,
    }
}

fn brace_delta(line: &str) -> i32 {
    let opens = line.matches('{').count() as i32;
    let closes = line.matches('}').count() as i32;
    opens - closes
}

/* ============================================================
   Tests
   ============================================================ */

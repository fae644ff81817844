//! compiler.rs
//!
//! Turns a candidate test into a pass/fail signal plus captured
//! diagnostics. The candidate is normalized so it self-contained-compiles
//! against the tested module, then the configured toolchain is driven with
//! an explicit argument list, never a shell string.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::config::TestLanguage;
use crate::error::{Error, Result};

/// Outcome of one toolchain invocation. Immutable once produced.
#[derive(Debug, Clone)]
pub struct CompileResult {
    pub succeeded: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CompileResult {
    /// Placeholder for sessions that never reached the toolchain.
    pub fn empty() -> Self {
        Self {
            succeeded: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: -1,
        }
    }

    /// Diagnostic text fed back into prompt refinement.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Everything one invocation needs, assembled up front by the caller.
#[derive(Debug, Clone)]
pub struct CompileInvocation {
    pub compiler: String,
    pub sources: Vec<PathBuf>,
    pub output: PathBuf,
    pub include_dirs: Vec<PathBuf>,
    pub link_libraries: Vec<String>,
    pub extra_flags: Vec<String>,
    pub coverage: bool,
    pub timeout: Duration,
}

/// Toolchain boundary, substitutable in tests.
pub trait Toolchain {
    fn compile(&self, inv: &CompileInvocation) -> Result<CompileResult>;
}

pub struct SystemToolchain;

impl Toolchain for SystemToolchain {
    fn compile(&self, inv: &CompileInvocation) -> Result<CompileResult> {
        for src in &inv.sources {
            if !src.is_file() {
                return Err(Error::PathNotFound(src.clone()));
            }
        }
        for dir in &inv.include_dirs {
            if !dir.exists() {
                return Err(Error::PathNotFound(dir.clone()));
            }
        }

        // A stale artifact would make "executable produced" meaningless.
        let _ = fs::remove_file(&inv.output);

        let mut cmd = Command::new(&inv.compiler);
        cmd.args(build_args(inv));
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::CompileInvocation(format!("{}: {e}", inv.compiler)))?;

        let deadline = Instant::now() + inv.timeout;
        let timed_out = loop {
            match child.try_wait() {
                Ok(Some(_)) => break false,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    break true;
                }
                Ok(None) => thread::sleep(Duration::from_millis(50)),
                Err(e) => return Err(Error::CompileInvocation(e.to_string())),
            }
        };

        let out = child
            .wait_with_output()
            .map_err(|e| Error::CompileInvocation(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&out.stdout).to_string();
        let mut stderr = String::from_utf8_lossy(&out.stderr).to_string();
        if timed_out {
            stderr.push_str("\ncompile timed out");
        }

        // A toolchain may exit zero with warnings only, or decorate its
        // exit text; the produced executable is the success signal.
        let succeeded = !timed_out && inv.output.is_file();

        Ok(CompileResult {
            succeeded,
            stdout,
            stderr,
            exit_code: out.status.code().unwrap_or(-1),
        })
    }
}

fn build_args(inv: &CompileInvocation) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();

    for src in &inv.sources {
        args.push(src.clone().into_os_string());
    }

    args.push("-o".into());
    args.push(inv.output.clone().into_os_string());

    for dir in &inv.include_dirs {
        args.push("-I".into());
        args.push(dir.clone().into_os_string());
    }

    if inv.coverage {
        args.push("-fprofile-arcs".into());
        args.push("-ftest-coverage".into());
    }

    for flag in &inv.extra_flags {
        args.push(flag.into());
    }

    for lib in &inv.link_libraries {
        args.push(format!("-l{lib}").into());
    }

    args
}

/* ============================================================
   Candidate normalization
   ============================================================ */

/// Rewrites applied before the candidate is written to disk: caller-supplied
/// short include names become resolvable project-relative paths, dialect
/// tokens the C toolchain rejects are replaced, and assertion/stdlib
/// includes are prepended so minimal test bodies compile standalone.
pub fn normalize_source(
    candidate: &str,
    language: TestLanguage,
    include_map: &std::collections::BTreeMap<String, String>,
) -> String {
    let mut code = candidate.to_string();

    for (short, resolved) in include_map {
        code = code.replace(
            &format!("#include \"{short}\""),
            &format!("#include \"{resolved}\""),
        );
        code = code.replace(
            &format!("#include <{short}>"),
            &format!("#include \"{resolved}\""),
        );
    }

    if language == TestLanguage::C {
        code = code.replace("#include <cassert>", "#include <assert.h>");
        code = code.replace("#include <cstdlib>", "#include <stdlib.h>");
        code = code.replace("#include <cstdio>", "#include <stdio.h>");
        code = code.replace("nullptr", "NULL");
    }

    let prelude = match language {
        TestLanguage::C => "#include <assert.h>\n#include <stdlib.h>\n#include <stdio.h>\n\n",
        TestLanguage::Cpp => "#include <cassert>\n#include <cstdlib>\n#include <cstdio>\n\n",
    };

    format!("{prelude}{code}")
}

/* ============================================================
   Artifact placement
   ============================================================ */

/// Collision-free test file path for one session. Concurrent sessions
/// share the build directory, so the name carries a random identifier.
pub fn session_artifact_path(build_dir: &Path, language: TestLanguage) -> PathBuf {
    build_dir.join(format!(
        "test_{}.{}",
        Uuid::new_v4().simple(),
        language.artifact_extension()
    ))
}

pub fn write_test_source(path: &Path, source: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, source)?;
    Ok(())
}

/* ============================================================
   Tests
   ============================================================ */

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn invocation(sources: Vec<PathBuf>) -> CompileInvocation {
        CompileInvocation {
            compiler: "g++".into(),
            sources,
            output: PathBuf::from("build/test_x.out"),
            include_dirs: vec![PathBuf::from("include")],
            link_libraries: vec!["m".into()],
            extra_flags: vec!["-Wall".into()],
            coverage: true,
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn args_are_an_explicit_list_in_stable_order() {
        let inv = invocation(vec![PathBuf::from("build/test_x.cpp")]);
        let args = build_args(&inv);

        let rendered: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            rendered,
            vec![
                "build/test_x.cpp",
                "-o",
                "build/test_x.out",
                "-I",
                "include",
                "-fprofile-arcs",
                "-ftest-coverage",
                "-Wall",
                "-lm",
            ]
        );
    }

    #[test]
    fn coverage_flags_are_omitted_when_disabled() {
        let mut inv = invocation(vec![PathBuf::from("t.c")]);
        inv.coverage = false;

        let args = build_args(&inv);
        assert!(!args.iter().any(|a| a == "-fprofile-arcs"));
    }

    #[test]
    fn missing_source_fails_before_invocation() {
        let inv = invocation(vec![PathBuf::from("/no/such/test_file.cpp")]);
        let err = SystemToolchain.compile(&inv).unwrap_err();
        assert!(matches!(err, Error::PathNotFound(_)));
    }

    #[test]
    fn missing_toolchain_binary_is_an_invocation_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let src = dir.path().join("t.c");
        fs::write(&src, "int main(void) { return 0; }\n").expect("write");

        let inv = CompileInvocation {
            compiler: "autest-no-such-compiler".into(),
            sources: vec![src],
            output: dir.path().join("t.out"),
            include_dirs: Vec::new(),
            link_libraries: Vec::new(),
            extra_flags: Vec::new(),
            coverage: false,
            timeout: Duration::from_secs(5),
        };

        let err = SystemToolchain.compile(&inv).unwrap_err();
        assert!(matches!(err, Error::CompileInvocation(_)));
    }

    #[test]
    fn include_map_rewrites_short_names_to_project_paths() {
        let mut map = BTreeMap::new();
        map.insert("tree.h".to_string(), "examples/tree/tree.h".to_string());

        let out = normalize_source("#include \"tree.h\"\n", TestLanguage::Cpp, &map);
        assert!(out.contains("#include \"examples/tree/tree.h\""));
        assert!(!out.contains("#include \"tree.h\"\n"));
    }

    #[test]
    fn c_mode_rewrites_dialect_tokens() {
        let out = normalize_source(
            "#include <cassert>\nint *p = nullptr;\n",
            TestLanguage::C,
            &BTreeMap::new(),
        );

        assert!(out.contains("#include <assert.h>"));
        assert!(out.contains("int *p = NULL;"));
        assert!(!out.contains("nullptr"));
    }

    #[test]
    fn cpp_mode_leaves_dialect_tokens_alone() {
        let out = normalize_source("int *p = nullptr;\n", TestLanguage::Cpp, &BTreeMap::new());
        assert!(out.contains("nullptr"));
    }

    #[test]
    fn assertion_includes_are_prepended_unconditionally() {
        let out = normalize_source("int main(void) { return 0; }", TestLanguage::C, &BTreeMap::new());
        assert!(out.starts_with("#include <assert.h>"));
    }

    #[test]
    fn artifact_paths_are_collision_free() {
        let dir = Path::new("build");
        let a = session_artifact_path(dir, TestLanguage::C);
        let b = session_artifact_path(dir, TestLanguage::C);

        assert_ne!(a, b);
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("c"));
    }

    #[test]
    fn diagnostic_prefers_stderr_and_falls_back_to_stdout() {
        let mut result = CompileResult::empty();
        result.stdout = "note: something".into();
        assert_eq!(result.diagnostic(), "note: something");

        result.stderr = "error: hard stop".into();
        assert_eq!(result.diagnostic(), "error: hard stop");
    }
}

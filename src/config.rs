//! config.rs
//!
//! Run configuration: project-level `autest.toml` merged with CLI flags.
//! Every config owns its own containers, so no list is shared between
//! sessions or calls.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestLanguage {
    C,
    Cpp,
}

impl TestLanguage {
    pub fn artifact_extension(self) -> &'static str {
        match self {
            TestLanguage::C => "c",
            TestLanguage::Cpp => "cpp",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "c" => Ok(TestLanguage::C),
            "c++" | "cpp" => Ok(TestLanguage::Cpp),
            other => Err(Error::Config(format!("unknown test language: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub compiler: String,
    pub language: TestLanguage,
    /// Where per-session test sources and executables land.
    pub build_dir: PathBuf,
    pub include_dirs: Vec<PathBuf>,
    /// Short include name to project-relative path, rewritten into the
    /// candidate before compiling.
    pub include_map: BTreeMap<String, String>,
    /// Extra translation units compiled alongside the test, normally the
    /// tested module itself.
    pub extra_sources: Vec<PathBuf>,
    pub link_libraries: Vec<String>,
    pub extra_flags: Vec<String>,
    pub coverage: bool,
    pub max_attempts: u32,
    pub compile_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            compiler: "g++".into(),
            language: TestLanguage::Cpp,
            build_dir: PathBuf::from("build"),
            include_dirs: Vec::new(),
            include_map: BTreeMap::new(),
            extra_sources: Vec::new(),
            link_libraries: Vec::new(),
            extra_flags: Vec::new(),
            coverage: false,
            max_attempts: 3,
            compile_timeout_secs: 120,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|_| Error::PathNotFound(path.to_path_buf()))?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Missing project file is not an error; defaults apply.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }
}

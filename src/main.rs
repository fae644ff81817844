mod compiler;
mod config;
mod error;
mod extractor;
mod llm;
mod report;
mod session;

use std::fs;
use std::path::PathBuf;
use std::thread;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::compiler::SystemToolchain;
use crate::config::{RunConfig, TestLanguage};
use crate::error::{Error, Result};
use crate::llm::client::LlmClient;
use crate::session::RetryController;

#[derive(Parser)]
#[command(
    name = "autest",
    version,
    about = "Generate compilable unit tests for C/C++ functions with an LLM, validated by the compiler."
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Extract functions from a source file and generate a test per function
    Generate(GenerateArgs),
    /// Persist completion provider settings (provider, model, API key)
    Configure(ConfigureArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// C or C++ source file to extract functions from
    source: PathBuf,

    /// Project configuration file
    #[arg(long, default_value = "autest.toml")]
    config: PathBuf,

    /// Compiler binary
    #[arg(long)]
    compiler: Option<String>,

    /// Test language, c or c++; drives dialect rewrites
    #[arg(long)]
    language: Option<String>,

    /// Directory for generated test sources and executables
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// Include directory passed to the compiler (repeatable)
    #[arg(long = "include-dir")]
    include_dirs: Vec<PathBuf>,

    /// Library linked into every test binary (repeatable)
    #[arg(long = "link")]
    link_libraries: Vec<String>,

    /// Maximum compile attempts per function
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Add coverage instrumentation flags to every compile
    #[arg(long)]
    coverage: bool,

    /// File with doc text folded into every prompt chain
    #[arg(long)]
    doc_file: Option<PathBuf>,

    /// File with a usage example folded into every prompt chain
    #[arg(long)]
    example_file: Option<PathBuf>,
}

#[derive(Args)]
struct ConfigureArgs {
    /// Provider name, openai or anthropic
    provider: String,

    /// Model identifier
    model: String,

    /// API key
    #[arg(long)]
    api_key: String,

    /// Override the provider endpoint
    #[arg(long)]
    base_url: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        tracing::error!(error = %e, "run aborted");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    match Cli::parse().command {
        CliCommand::Generate(args) => generate(args),
        CliCommand::Configure(args) => {
            LlmClient::configure(&args.provider, args.model, args.api_key, args.base_url)
        }
    }
}

fn generate(args: GenerateArgs) -> Result<()> {
    let cfg = build_config(&args)?;
    let doc = read_optional(args.doc_file.as_deref())?;
    let example = read_optional(args.example_file.as_deref())?;

    let extraction = extractor::extract(&args.source)?;
    tracing::info!(
        functions = extraction.functions.len(),
        includes = extraction.includes.len(),
        source = %args.source.display(),
        "extraction finished"
    );

    let client = LlmClient::from_saved();

    // Sessions share nothing mutable, so each function runs on its own
    // thread against its own conversation and artifact.
    let mut handles = Vec::new();
    for function in extraction.functions {
        let cfg = cfg.clone();
        let client = client.clone();
        let doc = doc.clone();
        let example = example.clone();

        handles.push(thread::spawn(move || {
            let controller = RetryController {
                service: &client,
                toolchain: &SystemToolchain,
                config: &cfg,
                doc,
                example,
            };
            controller.run(function)
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        match handle.join() {
            Ok(Ok(outcome)) => outcomes.push(outcome),
            Ok(Err(e)) => tracing::error!(error = %e, "session aborted"),
            Err(_) => tracing::error!("session thread panicked"),
        }
    }

    report::print_report(&outcomes);
    Ok(())
}

fn build_config(args: &GenerateArgs) -> Result<RunConfig> {
    let mut cfg = RunConfig::load_or_default(&args.config)?;

    if let Some(compiler) = &args.compiler {
        cfg.compiler = compiler.clone();
    }
    if let Some(language) = &args.language {
        cfg.language = TestLanguage::parse(language)?;
    }
    if let Some(build_dir) = &args.build_dir {
        cfg.build_dir = build_dir.clone();
    }
    if let Some(max_attempts) = args.max_attempts {
        if max_attempts == 0 {
            return Err(Error::Config("max attempts must be at least 1".into()));
        }
        cfg.max_attempts = max_attempts;
    }
    if args.coverage {
        cfg.coverage = true;
    }
    cfg.include_dirs.extend(args.include_dirs.iter().cloned());
    cfg.link_libraries.extend(args.link_libraries.iter().cloned());

    // Tests must link against the tested module; default to compiling the
    // input file alongside unless the project config says otherwise.
    if cfg.extra_sources.is_empty() {
        cfg.extra_sources.push(args.source.clone());
    }

    Ok(cfg)
}

fn read_optional(path: Option<&std::path::Path>) -> Result<Option<String>> {
    match path {
        None => Ok(None),
        Some(p) => fs::read_to_string(p)
            .map(Some)
            .map_err(|_| Error::PathNotFound(p.to_path_buf())),
    }
}

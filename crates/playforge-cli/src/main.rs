//! Playforge CLI
//!
//! The `playforge` command turns a plain-language description into an
//! Ansible playbook for Kubernetes that has passed `ansible-lint` and
//! `ansible-playbook --syntax-check`.
//!
//! ## Commands
//!
//! - `generate`: generate, validate and retry until the playbook is clean
//! - `validate`: run both checkers against an existing playbook
//! - `readme`: write README documentation for a playbook
//! - `library`: list, show or delete saved playbooks
//! - `doctor`: check settings, credentials and the sandbox runtime
//!
//! Exit status is 0 on success, 1 when the playbook is invalid (or every
//! attempt was), and 2 on configuration or infrastructure failure.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};

use playforge_core::{
    build_generator, build_validation_engine, generate_readme, init_tracing, load_system_prompt,
    FailureKind, GenerationResult, PlaybookLibrary, PlaybookMetadata, Playforge, Provider,
    Settings, ValidationEngine, ValidationVerdict,
};
use playforge_sandbox::{DockerSandbox, SandboxBackend};

#[derive(Parser)]
#[command(name = "playforge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate and validate Ansible playbooks for Kubernetes", long_about = None)]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true, env = "PLAYFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Sandbox backend (overrides settings)
    #[arg(long, global = true, value_enum)]
    sandbox: Option<BackendArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a validated playbook from a description
    Generate {
        /// What to deploy, in plain language
        description: String,

        /// Model provider
        #[arg(short, long, value_enum)]
        provider: Option<ProviderArg>,

        /// Maximum generate-validate cycles
        #[arg(short = 'n', long)]
        max_attempts: Option<u32>,

        /// Sampling temperature (0-2)
        #[arg(short, long)]
        temperature: Option<f64>,

        /// Store the playbook in the library on success
        #[arg(long)]
        save: bool,

        /// Write the playbook to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Validate an existing playbook
    Validate {
        /// Playbook file, or `-` for stdin
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Generate README documentation for a playbook
    Readme {
        /// Playbook file, or `-` for stdin
        file: PathBuf,

        /// Write the README to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage saved playbooks
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },

    /// Check settings, credentials and sandbox availability
    Doctor,
}

#[derive(Subcommand)]
enum LibraryAction {
    /// List saved playbooks, newest first
    List {
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Print a saved playbook
    Show {
        /// Playbook filename
        name: String,
    },

    /// Delete a saved playbook
    Delete {
        /// Playbook filename
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    Docker,
    Local,
}

impl From<BackendArg> for SandboxBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Docker => SandboxBackend::Docker,
            BackendArg::Local => SandboxBackend::Local,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderArg {
    Gemini,
    Claude,
}

impl From<ProviderArg> for Provider {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Gemini => Provider::Gemini,
            ProviderArg::Claude => Provider::Claude,
        }
    }
}

/// How a command ended, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    /// The playbook was checked and found wanting.
    Rejected,
    /// Configuration, generator or sandbox failure.
    Failed,
}

impl Status {
    fn exit_code(self) -> ExitCode {
        match self {
            Status::Ok => ExitCode::SUCCESS,
            Status::Rejected => ExitCode::from(1),
            Status::Failed => ExitCode::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json_logs, level);

    match run(cli).await {
        Ok(status) => status.exit_code(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            Status::Failed.exit_code()
        }
    }
}

async fn run(cli: Cli) -> Result<Status> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(backend) = cli.sandbox {
        settings.sandbox.backend = backend.into();
    }

    match cli.command {
        Commands::Generate {
            description,
            provider,
            max_attempts,
            temperature,
            save,
            output,
            format,
        } => {
            if let Some(provider) = provider {
                settings.generator.provider = provider.into();
            }
            if let Some(n) = max_attempts {
                settings.validation.max_attempts = n;
            }
            if let Some(t) = temperature {
                settings.generator.temperature = t;
            }
            let library = save.then(|| PlaybookLibrary::new(&settings.library.data_dir));
            let forge =
                Playforge::from_settings(settings).context("Failed to set up generation")?;
            cmd_generate(
                &forge,
                &description,
                library.as_ref(),
                output.as_deref(),
                format,
            )
            .await
        }
        Commands::Validate { file, format } => {
            settings.validate().context("Invalid settings")?;
            let artifact = read_input(&file)?;
            let engine = build_validation_engine(&settings);
            cmd_validate(&engine, settings.validation.timeout_secs, &artifact, format).await
        }
        Commands::Readme { file, output } => {
            let playbook = read_input(&file)?;
            cmd_readme(&settings, &playbook, output.as_deref()).await
        }
        Commands::Library { action } => {
            let library = PlaybookLibrary::new(&settings.library.data_dir);
            match action {
                LibraryAction::List { format } => cmd_library_list(&library, format),
                LibraryAction::Show { name } => cmd_library_show(&library, &name),
                LibraryAction::Delete { name } => cmd_library_delete(&library, &name),
            }
        }
        Commands::Doctor => cmd_doctor(&settings).await,
    }
}

/// Read a playbook from a file, or stdin for `-`.
fn read_input(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read playbook from stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))
    }
}

/// Generate, validate and retry; print the playbook or the last errors
async fn cmd_generate(
    forge: &Playforge,
    description: &str,
    library: Option<&PlaybookLibrary>,
    output: Option<&Path>,
    format: Format,
) -> Result<Status> {
    let result = forge
        .generate(description)
        .await
        .context("Generation could not start")?;

    let mut saved = None;
    if result.success {
        if let Some(path) = output {
            std::fs::write(path, &result.artifact)
                .with_context(|| format!("Failed to write {:?}", path))?;
        }
        if let Some(library) = library {
            let path = library
                .save(&result.artifact, description)
                .context("Failed to save playbook")?;
            info!(path = %path.display(), "playbook stored in library");
            saved = Some(path);
        }
    }

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print!(
            "{}",
            render_generation(&result, output, saved.as_deref())
        ),
    }

    Ok(generation_status(&result))
}

fn generation_status(result: &GenerationResult) -> Status {
    match (result.success, result.failure_kind) {
        (true, _) => Status::Ok,
        (false, Some(FailureKind::Exhausted)) => Status::Rejected,
        (false, _) => Status::Failed,
    }
}

fn render_generation(
    result: &GenerationResult,
    output: Option<&Path>,
    saved: Option<&Path>,
) -> String {
    let mut text = String::new();

    if result.success {
        text.push_str(&format!(
            "✓ Playbook validated after {} attempt(s)",
            result.attempts
        ));
        if let Some(model) = &result.model_used {
            text.push_str(&format!(" (model: {model}"));
            if let Some(tokens) = result.tokens_used {
                text.push_str(&format!(", tokens: {tokens}"));
            }
            text.push(')');
        }
        text.push('\n');
        if let Some(path) = output {
            text.push_str(&format!("Written to: {}\n", path.display()));
        }
        if let Some(path) = saved {
            text.push_str(&format!("Saved to: {}\n", path.display()));
        }
        if let Some(verdict) = &result.verdict {
            text.push_str(&render_warnings(verdict));
        }
        if output.is_none() {
            text.push('\n');
            text.push_str(&result.artifact);
            if !result.artifact.ends_with('\n') {
                text.push('\n');
            }
        }
    } else {
        let reason = result.failure_reason.as_deref().unwrap_or("unknown failure");
        text.push_str(&format!("✗ Generation failed: {reason}\n"));
        if let Some(verdict) = &result.verdict {
            text.push_str("\n=== Errors ===\n");
            text.push_str(&verdict.errors().join("\n\n"));
            text.push('\n');
        }
    }

    text
}

/// Run both checkers against one playbook
async fn cmd_validate(
    engine: &ValidationEngine,
    timeout_secs: u64,
    artifact: &str,
    format: Format,
) -> Result<Status> {
    let verdict = engine
        .validate(artifact, timeout_secs)
        .await
        .context("Validation could not run")?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&verdict)?),
        Format::Text => println!("{}", render_validation(&verdict)),
    }

    Ok(if verdict.is_valid() {
        Status::Ok
    } else {
        Status::Rejected
    })
}

fn render_validation(verdict: &ValidationVerdict) -> String {
    let mut text = if verdict.is_valid() {
        format!(
            "✓ Playbook is valid!\n\n=== Ansible Lint Output ===\n{}\n\n=== Syntax Check Output ===\n{}",
            or_placeholder(verdict.raw_lint_output()),
            or_placeholder(verdict.raw_syntax_output()),
        )
    } else {
        format!(
            "✗ Playbook validation failed!\n\n=== Errors ===\n{}",
            verdict.errors().join("\n\n")
        )
    };
    text.push_str(render_warnings(verdict).trim_end());
    text
}

fn render_warnings(verdict: &ValidationVerdict) -> String {
    if verdict.warnings().is_empty() {
        String::new()
    } else {
        format!("\n\n⚠ Warnings:\n{}\n", verdict.warnings().join("\n"))
    }
}

fn or_placeholder(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "(no output)"
    } else {
        trimmed
    }
}

/// Ask the configured provider for README documentation
async fn cmd_readme(settings: &Settings, playbook: &str, output: Option<&Path>) -> Result<Status> {
    let generator =
        build_generator(&settings.generator).context("Failed to set up generator")?;
    let readme = generate_readme(generator.as_ref(), playbook).await;

    match output {
        Some(path) => {
            std::fs::write(path, &readme)
                .with_context(|| format!("Failed to write {:?}", path))?;
            println!("README written to {}", path.display());
        }
        None => print!("{readme}"),
    }
    Ok(Status::Ok)
}

/// List saved playbooks
fn cmd_library_list(library: &PlaybookLibrary, format: Format) -> Result<Status> {
    let playbooks = library.list().context("Failed to list playbooks")?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&playbooks)?),
        Format::Text => print!("{}", render_library(&playbooks)),
    }
    Ok(Status::Ok)
}

fn render_library(playbooks: &[PlaybookMetadata]) -> String {
    if playbooks.is_empty() {
        return "No saved playbooks.\n".to_string();
    }
    let mut text = String::new();
    for p in playbooks {
        text.push_str(&format!(
            "{}  {}  {:>7}B  {}\n",
            p.created_at.format("%Y-%m-%d %H:%M"),
            p.filename,
            p.size_bytes,
            p.description
        ));
    }
    text
}

/// Print one saved playbook
fn cmd_library_show(library: &PlaybookLibrary, name: &str) -> Result<Status> {
    let yaml = library
        .load(name)
        .with_context(|| format!("Failed to load playbook {name:?}"))?;
    print!("{yaml}");
    Ok(Status::Ok)
}

/// Delete one saved playbook
fn cmd_library_delete(library: &PlaybookLibrary, name: &str) -> Result<Status> {
    if library
        .delete(name)
        .with_context(|| format!("Failed to delete playbook {name:?}"))?
    {
        println!("Deleted {name}");
        Ok(Status::Ok)
    } else {
        println!("No playbook named {name}");
        Ok(Status::Rejected)
    }
}

/// Report whether generation and validation can run with these settings
async fn cmd_doctor(settings: &Settings) -> Result<Status> {
    println!("Playforge Doctor");
    println!("================");
    println!();

    let mut healthy = true;
    let mut check = |ok: bool, line: String| {
        healthy &= ok;
        println!("{} {}", if ok { "✓" } else { "✗" }, line);
    };

    match settings.validate() {
        Ok(()) => check(true, "Settings valid".to_string()),
        Err(e) => check(false, format!("Settings: {e}")),
    }

    let provider = settings.generator.provider;
    match settings.require_api_key() {
        Ok(_) => check(
            true,
            format!(
                "Provider {} ({}): {} set",
                provider,
                settings.generator.model(),
                provider.api_key_env()
            ),
        ),
        Err(e) => check(false, format!("Provider {provider}: {e}")),
    }

    match load_system_prompt(settings.generator.system_prompt_path.as_deref()) {
        Ok(_) => check(true, "System prompt has all critical keywords".to_string()),
        Err(e) => check(false, format!("System prompt: {e}")),
    }

    match settings.sandbox.backend {
        SandboxBackend::Docker => {
            let sandbox = DockerSandbox::new(settings.sandbox.clone());
            match sandbox.probe().await {
                Ok(version) => check(
                    true,
                    format!(
                        "Docker server {version}, image {}",
                        settings.sandbox.image
                    ),
                ),
                Err(e) => check(false, format!("Docker: {e}")),
            }
        }
        SandboxBackend::Local => {
            for command in [
                &settings.validation.lint_command,
                &settings.validation.syntax_command,
            ] {
                let exe = command.first().map(String::as_str).unwrap_or_default();
                match find_executable(exe) {
                    Some(path) => check(true, format!("{exe}: {}", path.display())),
                    None => check(false, format!("{exe}: not found on PATH")),
                }
            }
        }
    }

    println!();
    println!("Validation timeout: {}s", settings.validation.timeout_secs);
    println!("Max attempts: {}", settings.validation.max_attempts);
    println!(
        "Library: {}",
        PlaybookLibrary::new(&settings.library.data_dir).dir().display()
    );

    Ok(if healthy { Status::Ok } else { Status::Failed })
}

fn find_executable(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    if name.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(name);
        return path.is_file().then_some(path);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

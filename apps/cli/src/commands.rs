//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use codedoc_core::pipeline::{self, ApplyConfig, GenerateConfig, ProgressReporter};
use codedoc_core::{ApplyMethod, GeneratorOptions, Preview};
use codedoc_llm::{ApiKeys, Backend, resolve_backend};
use codedoc_shared::{
    AppConfig, ConsistencyReport, ProviderChoice, ProviderKind, ScanOptions, init_config,
    load_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// codedoc: documentation generation and analysis for source code.
#[derive(Parser)]
#[command(
    name = "codedoc",
    version,
    about = "Generate, check, and apply source code documentation with LLMs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Report output format for `analyze`.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum ReportFormat {
    Text,
    Json,
}

/// Provider selection and credentials shared by commands that call a model.
#[derive(clap::Args, Debug)]
pub(crate) struct ProviderArgs {
    /// Provider: auto, openai, gemini, or template (defaults to the config file).
    #[arg(long)]
    pub provider: Option<String>,

    /// Model override for the selected provider.
    #[arg(long)]
    pub model: Option<String>,

    /// OpenAI API key.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_key: Option<String>,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_key: Option<String>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate documentation for a codebase.
    Generate {
        /// Path to the codebase (directory or single file).
        path: PathBuf,

        /// Output directory for generated documentation.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Provider calls in flight at once.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Ignore and do not update the generation cache.
        #[arg(long)]
        no_cache: bool,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Analyze existing documentation for consistency and coverage.
    Analyze {
        /// Path to the codebase (directory or single file).
        path: PathBuf,

        /// Report format.
        #[arg(long, default_value = "text")]
        format: ReportFormat,
    },

    /// Insert docstrings into Python files.
    Apply {
        /// A `.py` file or a directory containing them.
        path: PathBuf,

        /// Show the first lines before and after without writing.
        #[arg(long)]
        preview: bool,

        /// Overwrite files without keeping a backup.
        #[arg(long)]
        no_backup: bool,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// List models that support text generation.
    Models {
        /// Provider to query: openai or gemini (defaults to the first with a key).
        #[arg(long)]
        provider: Option<String>,

        /// OpenAI API key.
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        openai_key: Option<String>,

        /// Gemini API key.
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        gemini_key: Option<String>,
    },

    /// Show recent `generate` runs recorded for a codebase.
    Runs {
        /// Path to the codebase that was documented.
        path: PathBuf,

        /// Output directory holding the state database.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Maximum number of runs to show.
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },

    /// Generation cache management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Delete every cached provider response.
    Clear {
        /// Output directory holding the state database.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "codedoc=info",
        1 => "codedoc=debug",
        _ => "codedoc=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate {
            path,
            output_dir,
            concurrency,
            no_cache,
            provider,
        } => cmd_generate(&path, output_dir, concurrency, no_cache, &provider).await,
        Command::Analyze { path, format } => cmd_analyze(&path, &format),
        Command::Apply {
            path,
            preview,
            no_backup,
            provider,
        } => cmd_apply(&path, preview, !no_backup, &provider).await,
        Command::Models {
            provider,
            openai_key,
            gemini_key,
        } => cmd_models(provider.as_deref(), ApiKeys { openai: openai_key, gemini: gemini_key }).await,
        Command::Runs {
            path,
            output_dir,
            limit,
        } => cmd_runs(&path, output_dir, limit).await,
        Command::Cache { action } => match action {
            CacheAction::Clear { output_dir } => cmd_cache_clear(output_dir).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Resolve the backend from flags, then the config file.
fn backend_from_args(config: &AppConfig, args: &ProviderArgs) -> Result<Backend> {
    let choice: ProviderChoice = args
        .provider
        .as_deref()
        .unwrap_or(&config.defaults.provider)
        .parse()?;
    let keys = ApiKeys {
        openai: args.openai_key.clone(),
        gemini: args.gemini_key.clone(),
    };
    Ok(resolve_backend(config, choice, &keys, args.model.as_deref())?)
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

async fn cmd_generate(
    path: &Path,
    output_dir: Option<PathBuf>,
    concurrency: Option<usize>,
    no_cache: bool,
    args: &ProviderArgs,
) -> Result<()> {
    let config = load_config()?;
    let backend = backend_from_args(&config, args)?;

    let concurrency = concurrency.unwrap_or(config.defaults.concurrency as usize);
    if concurrency == 0 {
        return Err(eyre!("--concurrency must be at least 1"));
    }

    let generate_config = GenerateConfig {
        path: path.to_path_buf(),
        output_dir: resolve_output_dir(&config, output_dir),
        backend,
        options: GeneratorOptions {
            context_k: config.generation.context_k as usize,
            concurrency,
            temperature: config.generation.temperature,
            max_tokens: config.generation.max_tokens,
            use_cache: !no_cache,
        },
        scan: ScanOptions::from(&config),
    };

    info!(
        path = %path.display(),
        provider = %generate_config.backend.kind_name(),
        model = generate_config.backend.model().unwrap_or("-"),
        "generating documentation"
    );

    let reporter = CliProgress::new();
    let result = pipeline::generate(&generate_config, &reporter).await?;

    println!();
    println!("=== Documentation Generation Summary ===");
    println!("Generated documentation for {} elements", result.total_documented());
    println!("Functions: {}", result.functions_documented);
    println!("Classes: {}", result.classes_documented);

    if !result.report.coverage_issues.is_empty() {
        println!();
        println!("Coverage Report:");
        for issue in &result.report.coverage_issues {
            println!("  - {issue}");
        }
    }

    if let Backend::Llm(_) = generate_config.backend {
        println!();
        println!(
            "Cache: {} hits, {} misses, {} failed",
            result.stats.cache_hits, result.stats.cache_misses, result.stats.failures
        );
        println!(
            "Tokens: {} in, {} out",
            result.stats.tokens_in, result.stats.tokens_out
        );
    }

    println!();
    println!("Output written to {}:", result.output_dir.display());
    for artifact in &result.artifacts {
        println!("  - {} ({} bytes)", artifact.path.display(), artifact.size_bytes);
    }
    println!("Time: {:.1}s", result.elapsed.as_secs_f64());

    Ok(())
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

fn cmd_analyze(path: &Path, format: &ReportFormat) -> Result<()> {
    let config = load_config()?;
    let report = pipeline::analyze(path, &ScanOptions::from(&config))?;

    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &ConsistencyReport) {
    println!();
    println!("=== Documentation Analysis Report ===");
    for (title, items) in [
        ("Style Issues:", &report.style_issues),
        ("Formatting Issues:", &report.formatting_issues),
        ("Coverage Issues:", &report.coverage_issues),
        ("Recommendations:", &report.recommendations),
    ] {
        if items.is_empty() {
            continue;
        }
        println!();
        println!("{title}");
        for item in items {
            println!("  - {item}");
        }
    }
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

async fn cmd_apply(path: &Path, preview: bool, backup: bool, args: &ProviderArgs) -> Result<()> {
    let config = load_config()?;
    let backend = backend_from_args(&config, args)?;

    let apply_config = ApplyConfig {
        path: path.to_path_buf(),
        preview,
        backup,
        backend,
        temperature: config.generation.temperature,
        max_tokens: config.generation.max_tokens,
        scan: ScanOptions::from(&config),
    };

    let reporter = CliProgress::new();
    let result = pipeline::apply(&apply_config, &reporter).await?;

    if result.files.is_empty() {
        println!("No Python files found at {}", path.display());
        return Ok(());
    }

    for outcome in &result.files {
        let method = match outcome.method {
            Some(ApplyMethod::Provider) => apply_config.backend.kind_name(),
            Some(ApplyMethod::Local) => "local",
            None => "-",
        };
        if let Some(error) = &outcome.error {
            println!("Failed: {} ({error})", outcome.path.display());
        } else if let Some(preview) = &outcome.preview {
            print_preview(&outcome.path, method, preview);
        } else {
            println!("Documented {} [{method}]", outcome.path.display());
            if let Some(backup) = &outcome.backup {
                println!("  backup: {}", backup.display());
            }
        }
    }

    println!();
    println!(
        "Processed {} files, {} failed",
        result.succeeded(),
        result.failed()
    );
    if result.failed() > 0 {
        return Err(eyre!("{} files could not be documented", result.failed()));
    }
    Ok(())
}

fn print_preview(path: &Path, method: &str, preview: &Preview) {
    let rule = "=".repeat(60);
    println!();
    println!("{rule}");
    println!("Preview: {} [{method}]", path.display());
    println!("{rule}");
    println!("Original (first {} lines):", preview.original_head.len());
    for (i, line) in preview.original_head.iter().enumerate() {
        println!("{:2}: {line}", i + 1);
    }
    println!();
    println!("Documented (first {} lines):", preview.documented_head.len());
    for (i, line) in preview.documented_head.iter().enumerate() {
        println!("{:2}: {line}", i + 1);
    }
    println!();
    println!(
        "Lines: {} -> {}",
        preview.original_lines, preview.documented_lines
    );
}

// ---------------------------------------------------------------------------
// models
// ---------------------------------------------------------------------------

async fn cmd_models(provider: Option<&str>, keys: ApiKeys) -> Result<()> {
    let config = load_config()?;
    let choice: ProviderChoice = provider.unwrap_or("auto").parse()?;
    if choice == ProviderChoice::Fixed(ProviderKind::Template) {
        return Err(eyre!("the template backend has no models to list"));
    }

    let backend = resolve_backend(&config, choice, &keys, None)?;
    let Backend::Llm(provider) = backend else {
        return Err(eyre!(
            "no API key found: set {} or {} (or pass --openai-key / --gemini-key)",
            config.openai.api_key_env,
            config.gemini.api_key_env
        ));
    };

    let models = provider.list_models().await?;
    let usable: Vec<_> = models.iter().filter(|m| m.supports_generation).collect();

    println!("Models available from {} ({}):", provider.name(), usable.len());
    for model in usable {
        match model.display_name.as_deref().filter(|n| *n != model.id) {
            Some(name) => println!("  - {} ({name})", model.id),
            None => println!("  - {}", model.id),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// runs / cache
// ---------------------------------------------------------------------------

fn resolve_output_dir(config: &AppConfig, output_dir: Option<PathBuf>) -> PathBuf {
    output_dir.unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir))
}

async fn cmd_runs(path: &Path, output_dir: Option<PathBuf>, limit: u32) -> Result<()> {
    let config = load_config()?;
    let output_dir = resolve_output_dir(&config, output_dir);
    let history = pipeline::run_history(path, &output_dir, limit).await?;

    println!("Codebase: {} ({} indexed elements)", history.codebase_id, history.elements);
    if history.runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }
    for run in &history.runs {
        let status = run.finished_at.as_deref().unwrap_or("unfinished");
        println!("  {} {} started {} finished {}", run.id, run.command, run.started_at, status);
        if let Some(stats) = &run.stats_json {
            println!("      {stats}");
        }
    }
    Ok(())
}

async fn cmd_cache_clear(output_dir: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let output_dir = resolve_output_dir(&config, output_dir);
    let removed = pipeline::clear_cache(&output_dir).await?;
    println!("Removed {removed} cached generations from {}", output_dir.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn task_progress(&self, current: usize, total: usize, detail: &str) {
        self.spinner
            .set_message(format!("[{current}/{total}] {detail}"));
    }

    fn done(&self, summary: &str) {
        self.spinner.finish_and_clear();
        info!("{summary}");
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

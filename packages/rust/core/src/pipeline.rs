//! End-to-end commands: `generate`, `analyze`, `apply`, and the state
//! database housekeeping behind `runs` and `cache clear`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use codedoc_artifacts::ArtifactMeta;
use codedoc_llm::Backend;
use codedoc_parser::{collect_files, decode_source, encode_source, parse_codebase};
use codedoc_shared::{
    CodeDocError, ConsistencyReport, Language, ParsedCodebase, Result, RunId, ScanOptions,
};
use codedoc_storage::{RunRecord, Storage};

use crate::apply::{self, ApplyMethod, Preview};
use crate::consistency;
use crate::generator::{self, GenerationStats, GeneratorOptions};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as items within a phase complete.
    fn task_progress(&self, current: usize, total: usize, detail: &str);
    /// Called once when the command finishes.
    fn done(&self, summary: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn task_progress(&self, _current: usize, _total: usize, _detail: &str) {}
    fn done(&self, _summary: &str) {}
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

/// Configuration for [`generate`].
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    /// Codebase root (or a single file).
    pub path: PathBuf,
    /// Where artifacts and the state database go.
    pub output_dir: PathBuf,
    pub backend: Backend,
    pub options: GeneratorOptions,
    pub scan: ScanOptions,
}

/// Result of [`generate`].
#[derive(Debug)]
pub struct GenerateResult {
    pub run_id: String,
    pub output_dir: PathBuf,
    pub files_parsed: usize,
    pub functions_documented: usize,
    pub classes_documented: usize,
    pub report: ConsistencyReport,
    pub artifacts: Vec<ArtifactMeta>,
    pub stats: GenerationStats,
    pub elapsed: Duration,
}

impl GenerateResult {
    pub fn total_documented(&self) -> usize {
        self.functions_documented + self.classes_documented
    }
}

/// Run the full `generate` pipeline.
///
/// 1. Parse the codebase
/// 2. Index elements for similarity lookup
/// 3. Generate docstrings
/// 4. Check consistency
/// 5. Write artifacts and record the run
#[instrument(skip_all, fields(path = %config.path.display(), backend = %config.backend.kind_name()))]
pub async fn generate(
    config: &GenerateConfig,
    progress: &dyn ProgressReporter,
) -> Result<GenerateResult> {
    let start = Instant::now();

    // --- Phase 1: Parse ---
    progress.phase("Parsing codebase");
    let parsed = parse_codebase(&config.path, &config.scan)?;
    info!(
        files = parsed.summary.total_files,
        functions = parsed.summary.total_functions,
        classes = parsed.summary.total_classes,
        "codebase parsed"
    );

    // --- Phase 2: Storage + index ---
    progress.phase("Indexing code elements");
    let storage = Storage::open(&Storage::default_path(&config.output_dir)).await?;
    let codebase_id = storage.upsert_codebase(&parsed.root).await?;
    index(&storage, &codebase_id, &parsed).await?;
    let run_id = RunId::new();
    storage
        .insert_run(&run_id.to_string(), &codebase_id, "generate")
        .await?;

    // --- Phase 3: Generate ---
    let outcome = generator::generate_docstrings(
        &parsed,
        &config.backend,
        &storage,
        &codebase_id,
        &run_id,
        &config.options,
        progress,
    )
    .await?;

    // --- Phase 4: Analyze ---
    progress.phase("Checking consistency");
    let report = consistency::analyze(&parsed, Some(&outcome.docs));

    // --- Phase 5: Artifacts ---
    progress.phase("Writing artifacts");
    let artifacts = codedoc_artifacts::write_all(&config.output_dir, &parsed, &outcome.docs, &report)?;

    let stats_json = serde_json::to_string(&outcome.stats)?;
    storage.finish_run(&run_id.to_string(), &stats_json).await?;

    let result = GenerateResult {
        run_id: run_id.to_string(),
        output_dir: config.output_dir.clone(),
        files_parsed: parsed.summary.total_files,
        functions_documented: outcome.docs.functions.len(),
        classes_documented: outcome.docs.classes.len(),
        report,
        artifacts,
        stats: outcome.stats,
        elapsed: start.elapsed(),
    };

    progress.done(&format!(
        "Documented {} elements in {:.1}s",
        result.total_documented(),
        result.elapsed.as_secs_f64()
    ));

    info!(
        run_id = %result.run_id,
        elements = result.total_documented(),
        cache_hits = result.stats.cache_hits,
        cache_misses = result.stats.cache_misses,
        failures = result.stats.failures,
        elapsed_ms = result.elapsed.as_millis(),
        "generate pipeline complete"
    );

    Ok(result)
}

async fn index(storage: &Storage, codebase_id: &str, parsed: &ParsedCodebase) -> Result<()> {
    let elements: Vec<_> = parsed.elements().cloned().collect();
    if elements.is_empty() {
        warn!("no code elements found, skipping index");
        return Ok(());
    }
    let indexed = storage.index_elements(codebase_id, &elements).await?;
    info!(elements = indexed, "elements indexed");
    Ok(())
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

/// Parse and check existing documentation. No provider or storage involved.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn analyze(path: &Path, scan: &ScanOptions) -> Result<ConsistencyReport> {
    let parsed = parse_codebase(path, scan)?;
    let report = consistency::analyze(&parsed, None);
    info!(
        files = parsed.summary.total_files,
        issues = report.style_issues.len() + report.formatting_issues.len() + report.coverage_issues.len(),
        "analysis complete"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

/// Configuration for [`apply`].
#[derive(Debug, Clone)]
pub struct ApplyConfig {
    /// A `.py` file or a directory searched for them.
    pub path: PathBuf,
    /// Show what would change without writing.
    pub preview: bool,
    /// Keep a timestamped copy of each file before overwriting.
    pub backup: bool,
    pub backend: Backend,
    pub temperature: f32,
    pub max_tokens: u32,
    pub scan: ScanOptions,
}

/// What happened to one file.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub method: Option<ApplyMethod>,
    pub preview: Option<Preview>,
    pub backup: Option<PathBuf>,
    pub error: Option<String>,
}

/// Result of [`apply`].
#[derive(Debug)]
pub struct ApplyResult {
    pub files: Vec<FileOutcome>,
    pub elapsed: Duration,
}

impl ApplyResult {
    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.files.len() - self.succeeded()
    }
}

/// Insert docstrings into every Python file under `config.path`.
///
/// A failing file is recorded and the rest still run.
#[instrument(skip_all, fields(path = %config.path.display(), preview = config.preview))]
pub async fn apply(config: &ApplyConfig, progress: &dyn ProgressReporter) -> Result<ApplyResult> {
    let start = Instant::now();
    let files = collect_files(&config.path, &config.scan, Some(Language::Python))?;
    if files.is_empty() {
        warn!("no Python files found");
    }

    let provider = match &config.backend {
        Backend::Llm(p) => Some(p.as_ref()),
        Backend::Template => None,
    };

    progress.phase("Documenting files");
    let total = files.len();
    let mut outcomes = Vec::with_capacity(total);
    for (i, path) in files.into_iter().enumerate() {
        progress.task_progress(i + 1, total, &path.display().to_string());
        let outcome = match apply_file(config, provider, &path).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to document file");
                FileOutcome {
                    path,
                    method: None,
                    preview: None,
                    backup: None,
                    error: Some(e.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }

    let result = ApplyResult {
        files: outcomes,
        elapsed: start.elapsed(),
    };
    progress.done(&format!(
        "Processed {} files, {} failed",
        result.succeeded(),
        result.failed()
    ));
    info!(
        succeeded = result.succeeded(),
        failed = result.failed(),
        elapsed_ms = result.elapsed.as_millis(),
        "apply complete"
    );
    Ok(result)
}

async fn apply_file(
    config: &ApplyConfig,
    provider: Option<&dyn codedoc_llm::CompletionProvider>,
    path: &Path,
) -> Result<FileOutcome> {
    let bytes = std::fs::read(path).map_err(|e| CodeDocError::io(path, e))?;
    let (original, encoding) = decode_source(bytes);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let (documented, method) = apply::document_source(
        provider,
        &original,
        &file_name,
        config.temperature,
        config.max_tokens,
    )
    .await;

    if config.preview {
        return Ok(FileOutcome {
            path: path.to_path_buf(),
            method: Some(method),
            preview: Some(Preview::new(&original, &documented)),
            backup: None,
            error: None,
        });
    }

    let encoded = encode_source(&documented, encoding)?;
    let backup = apply::write_documented(path, &encoded, config.backup)?;
    Ok(FileOutcome {
        path: path.to_path_buf(),
        method: Some(method),
        preview: None,
        backup,
        error: None,
    })
}

// ---------------------------------------------------------------------------
// runs / cache
// ---------------------------------------------------------------------------

/// Recorded history for one codebase.
#[derive(Debug)]
pub struct RunHistory {
    pub codebase_id: String,
    pub elements: u64,
    pub runs: Vec<RunRecord>,
}

/// Recent `generate` runs for `path`, read from the database under
/// `output_dir`. Never creates or modifies the database.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn run_history(path: &Path, output_dir: &Path, limit: u32) -> Result<RunHistory> {
    let storage = Storage::open_readonly(&Storage::default_path(output_dir)).await?;
    let codebase_id = codedoc_storage::codebase_id_for(path);
    let elements = storage.count_elements(&codebase_id).await?;
    let runs = storage.list_runs(&codebase_id, limit).await?;
    info!(codebase_id = %codebase_id, elements, runs = runs.len(), "run history loaded");
    Ok(RunHistory {
        codebase_id,
        elements,
        runs,
    })
}

/// Drop every cached provider response under `output_dir`. Returns the
/// number of entries removed.
#[instrument(skip_all, fields(output_dir = %output_dir.display()))]
pub async fn clear_cache(output_dir: &Path) -> Result<u64> {
    let db = Storage::default_path(output_dir);
    if !db.is_file() {
        return Err(CodeDocError::validation(format!(
            "no codedoc database at {}; run `codedoc generate` first",
            db.display()
        )));
    }
    let storage = Storage::open(&db).await?;
    let removed = storage.clear_generation_cache().await?;
    info!(removed, "generation cache cleared");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codedoc_artifacts::{CONSISTENCY_REPORT_FILE, GENERATED_DOCS_FILE, MARKDOWN_FILE};

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("codedoc-pipeline-{tag}-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn generate_config(path: &Path, output_dir: &Path) -> GenerateConfig {
        GenerateConfig {
            path: path.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            backend: Backend::Template,
            options: GeneratorOptions::default(),
            scan: ScanOptions::default(),
        }
    }

    fn apply_config(path: &Path, preview: bool) -> ApplyConfig {
        ApplyConfig {
            path: path.to_path_buf(),
            preview,
            backup: true,
            backend: Backend::Template,
            temperature: 0.3,
            max_tokens: 500,
            scan: ScanOptions::default(),
        }
    }

    #[tokio::test]
    async fn generate_with_templates_writes_artifacts() {
        let src = temp_dir("src");
        std::fs::write(
            src.join("shapes.py"),
            "class Circle:\n    def area(self, scale):\n        return 3.14 * scale\n\n\
             def helper():\n    \"\"\"Return one, always and forever.\"\"\"\n    return 1\n",
        )
        .unwrap();
        let out = src.join("doc_output");

        let result = generate(&generate_config(&src, &out), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.files_parsed, 1);
        assert_eq!(result.functions_documented, 1);
        assert_eq!(result.classes_documented, 1);
        assert_eq!(result.artifacts.len(), 3);
        for name in [GENERATED_DOCS_FILE, CONSISTENCY_REPORT_FILE, MARKDOWN_FILE] {
            assert!(out.join(name).is_file(), "{name} missing");
        }
        assert!(Storage::default_path(&out).is_file());

        let artifact: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join(GENERATED_DOCS_FILE)).unwrap())
                .unwrap();
        assert_eq!(artifact["run_id"], result.run_id.as_str());

        let history = run_history(&src, &out, 10).await.unwrap();
        assert_eq!(history.elements, 3);
        assert_eq!(history.runs.len(), 1);
        assert_eq!(history.runs[0].id, result.run_id);
        assert!(history.runs[0].finished_at.is_some());

        let _ = std::fs::remove_dir_all(&src);
    }

    #[tokio::test]
    async fn history_and_cache_need_an_existing_database() {
        let src = temp_dir("nodb");
        let out = src.join("doc_output");

        let err = run_history(&src, &out, 10).await.unwrap_err();
        assert!(err.to_string().contains("no codedoc database"));
        let err = clear_cache(&out).await.unwrap_err();
        assert!(err.to_string().contains("no codedoc database"));
        assert!(!out.exists());

        generate(&generate_config(&src, &out), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(clear_cache(&out).await.unwrap(), 0);
        assert_eq!(run_history(&src, &out, 10).await.unwrap().runs.len(), 1);

        let _ = std::fs::remove_dir_all(&src);
    }

    #[tokio::test]
    async fn commands_succeed_on_empty_directory() {
        let src = temp_dir("empty");
        let out = temp_dir("empty-out");

        let result = generate(&generate_config(&src, &out), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(result.total_documented(), 0);

        let report = analyze(&src, &ScanOptions::default()).unwrap();
        assert!(report.recommendations.iter().any(|r| r.contains("No supported code elements")));

        let applied = apply(&apply_config(&src, false), &SilentProgress).await.unwrap();
        assert!(applied.files.is_empty());

        let _ = std::fs::remove_dir_all(&src);
        let _ = std::fs::remove_dir_all(&out);
    }

    #[tokio::test]
    async fn missing_path_is_an_error() {
        let missing = std::env::temp_dir().join(format!("codedoc-missing-{}", uuid::Uuid::now_v7()));

        let err = analyze(&missing, &ScanOptions::default()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let out = temp_dir("missing-out");
        let err = generate(&generate_config(&missing, &out), &SilentProgress)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let err = apply(&apply_config(&missing, true), &SilentProgress).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        let _ = std::fs::remove_dir_all(&out);
    }

    #[test]
    fn analyze_reports_coverage() {
        let src = temp_dir("analyze");
        std::fs::write(
            src.join("m.py"),
            "def a():\n    \"\"\"Documented.\"\"\"\n\ndef b():\n    pass\n\ndef c():\n    pass\n",
        )
        .unwrap();

        let report = analyze(&src, &ScanOptions::default()).unwrap();
        assert!(report
            .coverage_issues
            .iter()
            .any(|i| i == "Function documentation coverage: 33.3%"));

        let _ = std::fs::remove_dir_all(&src);
    }

    #[tokio::test]
    async fn apply_preview_leaves_files_untouched() {
        let src = temp_dir("preview");
        let file = src.join("tool.py");
        std::fs::write(&file, "def run(x):\n    return x\n").unwrap();

        let result = apply(&apply_config(&src, true), &SilentProgress).await.unwrap();
        assert_eq!(result.succeeded(), 1);
        let preview = result.files[0].preview.as_ref().unwrap();
        assert_eq!(preview.original_lines, 2);
        assert!(preview.documented_lines > 2);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "def run(x):\n    return x\n");

        let _ = std::fs::remove_dir_all(&src);
    }

    #[tokio::test]
    async fn apply_writes_file_and_backup() {
        let src = temp_dir("write");
        let file = src.join("tool.py");
        std::fs::write(&file, "def run(x):\n    return x\n").unwrap();

        let result = apply(&apply_config(&file, false), &SilentProgress).await.unwrap();
        let outcome = &result.files[0];
        assert_eq!(outcome.method, Some(ApplyMethod::Local));
        let backup = outcome.backup.as_ref().unwrap();
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "def run(x):\n    return x\n");
        let written = std::fs::read_to_string(&file).unwrap();
        assert!(written.starts_with("\"\"\"tool.py\n"));
        assert!(written.contains("        x: Description"));

        let _ = std::fs::remove_dir_all(&src);
    }

    #[tokio::test]
    async fn apply_round_trips_latin1_files() {
        let src = temp_dir("latin1");
        let file = src.join("legacy.py");
        let original = b"# caf\xe9\ndef f(x):\n    return x\n".to_vec();
        std::fs::write(&file, &original).unwrap();

        let result = apply(&apply_config(&file, false), &SilentProgress).await.unwrap();
        assert_eq!(result.failed(), 0);
        let backup = result.files[0].backup.as_ref().unwrap();
        assert_eq!(std::fs::read(backup).unwrap(), original);

        let written = std::fs::read(&file).unwrap();
        assert!(String::from_utf8(written.clone()).is_err());
        assert!(written.starts_with(b"\"\"\"legacy.py\n"));
        assert!(written.windows(5).any(|w| w == b"caf\xe9\n"));
        let docstring = b"    \"\"\"f.\n";
        assert!(written.windows(docstring.len()).any(|w| w == docstring));

        let _ = std::fs::remove_dir_all(&src);
    }
}

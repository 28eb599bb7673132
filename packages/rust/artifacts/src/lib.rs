//! Report files written by `codedoc generate`.
//!
//! Produces the following layout inside the output directory:
//! ```text
//! <output_dir>/
//! ├── generated_docs.json
//! ├── consistency_report.json
//! └── DOCUMENTATION.md
//! ```
//!
//! Every file is written to a temporary sibling first and renamed into place,
//! so an interrupted run never leaves a half-written report behind.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use codedoc_shared::{
    CodeDocError, ConsistencyReport, GeneratedDoc, GeneratedDocs, Language, ParsedCodebase,
    Result,
};

pub const GENERATED_DOCS_FILE: &str = "generated_docs.json";
pub const CONSISTENCY_REPORT_FILE: &str = "consistency_report.json";
pub const MARKDOWN_FILE: &str = "DOCUMENTATION.md";

/// Metadata for one written file.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactMeta {
    pub filename: String,
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Write `generated_docs.json`.
pub fn write_generated_docs(dir: &Path, docs: &GeneratedDocs) -> Result<ArtifactMeta> {
    write_json(dir, GENERATED_DOCS_FILE, docs)
}

/// Write `consistency_report.json`.
pub fn write_consistency_report(dir: &Path, report: &ConsistencyReport) -> Result<ArtifactMeta> {
    write_json(dir, CONSISTENCY_REPORT_FILE, report)
}

/// Write `DOCUMENTATION.md`.
pub fn write_markdown(
    dir: &Path,
    parsed: &ParsedCodebase,
    docs: &GeneratedDocs,
    report: &ConsistencyReport,
) -> Result<ArtifactMeta> {
    write_atomic(dir, MARKDOWN_FILE, &render_markdown(parsed, docs, report))
}

/// Write all three report files, creating `dir` if needed.
#[instrument(skip_all, fields(dir = %dir.display(), elements = docs.total()))]
pub fn write_all(
    dir: &Path,
    parsed: &ParsedCodebase,
    docs: &GeneratedDocs,
    report: &ConsistencyReport,
) -> Result<Vec<ArtifactMeta>> {
    let metas = vec![
        write_generated_docs(dir, docs)?,
        write_consistency_report(dir, report)?,
        write_markdown(dir, parsed, docs, report)?,
    ];
    info!(count = metas.len(), "artifacts written");
    Ok(metas)
}

// ---------------------------------------------------------------------------
// Markdown rendering
// ---------------------------------------------------------------------------

/// Render the human-readable documentation page.
pub fn render_markdown(
    parsed: &ParsedCodebase,
    docs: &GeneratedDocs,
    report: &ConsistencyReport,
) -> String {
    let mut out = String::new();
    let title = parsed
        .root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| parsed.root.display().to_string());

    let _ = writeln!(out, "# Documentation: {title}\n");
    let _ = writeln!(
        out,
        "_Generated {} (run `{}`)_\n",
        docs.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        docs.run_id
    );

    let summary = &parsed.summary;
    let languages = if summary.languages.is_empty() {
        "none".to_string()
    } else {
        summary
            .languages
            .iter()
            .map(Language::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    out.push_str("## Summary\n\n| Metric | Value |\n|---|---|\n");
    let _ = writeln!(out, "| Files | {} |", summary.total_files);
    let _ = writeln!(out, "| Functions | {} |", summary.total_functions);
    let _ = writeln!(out, "| Classes | {} |", summary.total_classes);
    let _ = writeln!(out, "| Languages | {languages} |");
    let _ = writeln!(out, "| Generated docs | {} |", docs.total());
    if let Some(pct) = report.coverage.function_pct() {
        let _ = writeln!(out, "| Function coverage | {pct:.1}% |");
    }
    if let Some(pct) = report.coverage.class_pct() {
        let _ = writeln!(out, "| Class coverage | {pct:.1}% |");
    }
    out.push('\n');

    // Files in parse order; elements within a file by line.
    for file in &parsed.files {
        let mut entries: Vec<&GeneratedDoc> = docs
            .iter()
            .filter(|d| d.element.file_path == file.path)
            .collect();
        if entries.is_empty() {
            continue;
        }
        entries.sort_by_key(|d| d.element.line_start);

        let _ = writeln!(out, "## `{}`\n", file.path);
        for doc in entries {
            render_entry(&mut out, doc);
        }
    }

    out.push_str("## Consistency Report\n\n");
    let sections = [
        ("Style Issues", &report.style_issues),
        ("Formatting Issues", &report.formatting_issues),
        ("Coverage Issues", &report.coverage_issues),
        ("Recommendations", &report.recommendations),
    ];
    let mut any = false;
    for (heading, items) in sections {
        if items.is_empty() {
            continue;
        }
        any = true;
        let _ = writeln!(out, "### {heading}\n");
        for item in items {
            let _ = writeln!(out, "- {item}");
        }
        out.push('\n');
    }
    if !any {
        out.push_str("No issues found.\n");
    }

    out
}

fn render_entry(out: &mut String, doc: &GeneratedDoc) {
    let el = &doc.element;
    let _ = writeln!(
        out,
        "### {} `{}` (line {})\n",
        el.kind,
        el.qualified_name(),
        el.line_start
    );
    let _ = writeln!(out, "```{}\n{}\n```\n", fence_lang(el.language), el.signature);
    let _ = writeln!(out, "{}\n", doc.generated_doc.trim());

    let mut source = doc.source.clone();
    if let Some(model) = &doc.model {
        let _ = write!(source, " / {model}");
    }
    if doc.cached {
        source.push_str(", cached");
    }
    let _ = writeln!(out, "<sub>source: {source}</sub>\n");
    if let Some(err) = &doc.error {
        let _ = writeln!(out, "> Template fallback after provider error: {err}\n");
    }
}

/// Info string for fenced code blocks.
fn fence_lang(lang: Language) -> &'static str {
    match lang {
        Language::CHeader => "c",
        Language::CppHeader => "cpp",
        other => other.as_str(),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_json<T: Serialize>(dir: &Path, filename: &str, data: &T) -> Result<ArtifactMeta> {
    let json = serde_json::to_string_pretty(data)?;
    write_atomic(dir, filename, &json)
}

/// Write to a temp file, then rename over the target.
fn write_atomic(dir: &Path, filename: &str, content: &str) -> Result<ArtifactMeta> {
    std::fs::create_dir_all(dir).map_err(|e| CodeDocError::io(dir, e))?;

    let target = dir.join(filename);
    let temp = dir.join(format!(".{filename}.tmp"));
    std::fs::write(&temp, content).map_err(|e| CodeDocError::io(&temp, e))?;
    std::fs::rename(&temp, &target).map_err(|e| CodeDocError::io(&target, e))?;

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let sha256 = format!("{:x}", hasher.finalize());

    debug!(file = %filename, size = content.len(), "wrote artifact");
    Ok(ArtifactMeta {
        filename: filename.to_string(),
        path: target,
        sha256,
        size_bytes: content.len(),
    })
}

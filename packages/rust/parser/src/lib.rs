//! Code indexer: walks a source tree and extracts documentable elements.
//!
//! Python files get a dedicated indentation-aware scanner ([`python`]);
//! every other supported language goes through a table of per-language
//! declaration patterns ([`generic`]). Neither builds a full syntax tree;
//! the goal is locating functions, classes, and their existing docs.

mod generic;
mod python;

use std::path::{Path, PathBuf};

use codedoc_shared::{CodeDocError, Language, ParsedCodebase, Result, ScanOptions, SourceFile};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

pub use python::{BlockHeader, PythonParse, clean_docstring, parse_python};

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parse every supported file under `root` (or `root` itself if it is a file).
///
/// Unreadable files are logged and skipped; only a missing root is an error.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn parse_codebase(root: &Path, opts: &ScanOptions) -> Result<ParsedCodebase> {
    if !root.exists() {
        return Err(CodeDocError::validation(format!(
            "codebase path {} does not exist",
            root.display()
        )));
    }

    let paths = collect_files(root, opts, None)?;
    let mut files = Vec::with_capacity(paths.len());

    for path in &paths {
        match parse_file(path) {
            Ok(file) => files.push(file),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable file"),
        }
    }

    let parsed = ParsedCodebase::new(root.to_path_buf(), files);

    info!(
        files = parsed.summary.total_files,
        functions = parsed.summary.total_functions,
        classes = parsed.summary.total_classes,
        "codebase parsed"
    );

    Ok(parsed)
}

/// Read and parse a single supported file.
pub fn parse_file(path: &Path) -> Result<SourceFile> {
    let language = Language::from_path(path).ok_or_else(|| {
        CodeDocError::parse(format!("unsupported file type: {}", path.display()))
    })?;

    let content = read_source(path)?;
    let path_str = path.to_string_lossy().to_string();

    let (functions, classes, imports) = match language {
        Language::Python => {
            let parsed = parse_python(&content, &path_str);
            (parsed.functions, parsed.classes, parsed.imports)
        }
        other => {
            let (functions, classes) = generic::parse_generic(&content, &path_str, other);
            (functions, classes, Vec::new())
        }
    };

    debug!(
        path = %path_str,
        %language,
        functions = functions.len(),
        classes = classes.len(),
        "parsed file"
    );

    Ok(SourceFile {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        path: path_str,
        language,
        size: content.chars().count(),
        line_count: content.lines().count(),
        content,
        functions,
        classes,
        imports,
    })
}

/// List supported files under `root` in sorted order, optionally limited to
/// one language. Excluded directory names are never descended into.
pub fn collect_files(
    root: &Path,
    opts: &ScanOptions,
    only: Option<Language>,
) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(CodeDocError::validation(format!(
            "codebase path {} does not exist",
            root.display()
        )));
    }

    let wanted = |path: &Path| match Language::from_path(path) {
        Some(lang) => only.is_none_or(|o| o == lang),
        None => false,
    };

    if root.is_file() {
        return Ok(if wanted(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded_dir(e, &opts.exclude_dirs));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "walk error, skipping entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !wanted(entry.path()) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size > opts.max_file_bytes {
            debug!(path = %entry.path().display(), size, "file too large, skipping");
            continue;
        }

        files.push(entry.into_path());
    }

    Ok(files)
}

fn is_excluded_dir(entry: &walkdir::DirEntry, excluded: &[String]) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| excluded.iter().any(|x| x == name))
}

/// Byte encoding a source file was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Latin1,
}

/// Read a file as UTF-8, falling back to Latin-1 for legacy encodings.
pub fn read_source(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| CodeDocError::io(path, e))?;
    let (text, encoding) = decode_source(bytes);
    if encoding == SourceEncoding::Latin1 {
        debug!(path = %path.display(), "not valid UTF-8, decoded as Latin-1");
    }
    Ok(text)
}

/// Decode raw file bytes, reporting which encoding was used.
pub fn decode_source(bytes: Vec<u8>) -> (String, SourceEncoding) {
    match String::from_utf8(bytes) {
        Ok(text) => (text, SourceEncoding::Utf8),
        Err(e) => (
            e.into_bytes().iter().map(|&b| char::from(b)).collect(),
            SourceEncoding::Latin1,
        ),
    }
}

/// Encode text back into the encoding it was decoded from.
///
/// Fails when a Latin-1 file would gain a character above U+00FF.
pub fn encode_source(text: &str, encoding: SourceEncoding) -> Result<Vec<u8>> {
    match encoding {
        SourceEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
        SourceEncoding::Latin1 => text
            .chars()
            .map(|c| {
                u8::try_from(u32::from(c)).map_err(|_| {
                    CodeDocError::validation(format!(
                        "character {c:?} cannot be encoded as Latin-1"
                    ))
                })
            })
            .collect(),
    }
}

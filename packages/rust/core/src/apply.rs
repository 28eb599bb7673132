//! Writing docstrings back into Python source files.
//!
//! A provider can rewrite a whole file; when it is unavailable or returns
//! something unusable, a local pass inserts template docstrings after every
//! undocumented `def`/`class` header.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, warn};

use codedoc_llm::{CompletionProvider, CompletionRequest, clean_code_response};
use codedoc_parser::parse_python;
use codedoc_shared::{CodeDocError, ElementKind, Result};

use crate::prompt::{FILE_SYSTEM_PROMPT, file_prompt};
use crate::template;

/// Lines shown from each side in a preview.
pub const PREVIEW_LINES: usize = 10;

/// Output budget for whole-file rewrites.
const FILE_MAX_TOKENS: u32 = 8192;

/// Markers of a model echoing the prompt instead of returning code.
const ECHO_MARKERS: [&str; 2] = ["CODE TO DOCUMENT", "{code}"];

/// How a file's documented text was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMethod {
    Provider,
    Local,
}

/// Side-by-side head of a file before and after documentation.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub original_head: Vec<String>,
    pub documented_head: Vec<String>,
    pub original_lines: usize,
    pub documented_lines: usize,
}

impl Preview {
    pub fn new(original: &str, documented: &str) -> Self {
        let head = |text: &str| {
            text.split('\n')
                .take(PREVIEW_LINES)
                .map(String::from)
                .collect()
        };
        Self {
            original_head: head(original),
            documented_head: head(documented),
            original_lines: original.lines().count(),
            documented_lines: documented.lines().count(),
        }
    }
}

// ---------------------------------------------------------------------------
// Local insertion
// ---------------------------------------------------------------------------

/// Insert template docstrings into `content`.
///
/// Keeps a leading shebang and encoding line in place, adds a module
/// docstring when the file has none, and gives every undocumented
/// `def`/`class` a docstring indented one level below its header.
/// CRLF files stay CRLF.
pub fn document_locally(content: &str, file_name: &str) -> String {
    let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let content = content.replace("\r\n", "\n");
    let mut lines: Vec<String> = content.split('\n').map(String::from).collect();
    let parsed = parse_python(&content, file_name);

    // Bottom-up so earlier indices stay valid.
    for header in parsed.headers.iter().rev() {
        if header.inline_body || header.has_docstring {
            continue;
        }
        let doc = match header.kind {
            ElementKind::Class => template::class_docstring(&header.name),
            ElementKind::Function => {
                let args = parsed
                    .functions
                    .iter()
                    .find(|f| f.line_start == header.start + 1)
                    .map(|f| f.args.clone())
                    .unwrap_or_default();
                template::function_docstring(&header.name, args.iter().map(String::as_str))
            }
        };
        let indent = body_indent(&lines, header.end, header.indent);
        let block = docstring_block(&doc, &indent);
        let at = (header.end + 1).min(lines.len());
        lines.splice(at..at, block);
    }

    let preamble = lines
        .iter()
        .take_while(|l| l.starts_with("#!") || is_encoding_line(l))
        .count();
    if !has_module_docstring(&lines[preamble..]) {
        let doc = template::module_docstring(file_name);
        let mut block = docstring_block(&doc, "");
        block.push(String::new());
        lines.splice(preamble..preamble, block);
    }

    lines.join(newline)
}

/// `# -*- coding: utf-8 -*-` / `# vim: set fileencoding=...`
fn is_encoding_line(line: &str) -> bool {
    line.starts_with('#') && (line.contains("coding:") || line.contains("coding="))
}

/// A module docstring must come before any code; comments and blank lines
/// may precede it.
fn has_module_docstring(lines: &[String]) -> bool {
    lines
        .iter()
        .map(|l| l.trim())
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .is_some_and(|first| {
            let rest = first.trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'u' | 'U'));
            rest.starts_with("\"\"\"") || rest.starts_with("'''") || rest.starts_with('"')
        })
}

/// Indentation of the first body line, or the header's plus four spaces.
fn body_indent(lines: &[String], header_end: usize, header_indent: usize) -> String {
    let body = lines
        .iter()
        .skip(header_end + 1)
        .find(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'));
    match body {
        Some(line) => {
            let width = line.len() - line.trim_start().len();
            if width > header_indent {
                return line[..width].to_string();
            }
            " ".repeat(header_indent + 4)
        }
        None => " ".repeat(header_indent + 4),
    }
}

/// Render `doc` as a triple-quoted block at `indent`.
fn docstring_block(doc: &str, indent: &str) -> Vec<String> {
    let mut parts = doc.trim_end().split('\n');
    let first = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    if rest.is_empty() {
        return vec![format!("{indent}\"\"\"{first}\"\"\"")];
    }
    let mut block = vec![format!("{indent}\"\"\"{first}")];
    for line in rest {
        if line.trim().is_empty() {
            block.push(String::new());
        } else {
            block.push(format!("{indent}{line}"));
        }
    }
    block.push(format!("{indent}\"\"\""));
    block
}

// ---------------------------------------------------------------------------
// Provider rewrite
// ---------------------------------------------------------------------------

/// Ask the provider to document the whole file.
///
/// Fails when the answer is empty, unchanged, or echoes the prompt.
pub async fn document_with_provider(
    provider: &dyn CompletionProvider,
    content: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<String> {
    let request = CompletionRequest {
        system: FILE_SYSTEM_PROMPT.to_string(),
        prompt: file_prompt(content),
        temperature,
        max_tokens: max_tokens.max(FILE_MAX_TOKENS),
    };
    let completion = provider.complete(&request).await?;
    let mut documented = clean_code_response(&completion.text);

    if documented.is_empty() {
        return Err(CodeDocError::provider(provider.name(), "empty rewrite"));
    }
    if documented == content.trim() {
        return Err(CodeDocError::provider(provider.name(), "no changes made"));
    }
    if ECHO_MARKERS
        .iter()
        .any(|m| documented.contains(m) && !content.contains(m))
    {
        return Err(CodeDocError::provider(
            provider.name(),
            "response echoed the prompt instead of code",
        ));
    }

    if content.ends_with('\n') && !documented.ends_with('\n') {
        documented.push('\n');
    }
    Ok(documented)
}

/// Provider rewrite with local fallback.
pub async fn document_source(
    provider: Option<&dyn CompletionProvider>,
    content: &str,
    file_name: &str,
    temperature: f32,
    max_tokens: u32,
) -> (String, ApplyMethod) {
    if let Some(provider) = provider {
        match document_with_provider(provider, content, temperature, max_tokens).await {
            Ok(documented) => return (documented, ApplyMethod::Provider),
            Err(e) => warn!(file = file_name, error = %e, "provider rewrite rejected, using local method"),
        }
    }
    (document_locally(content, file_name), ApplyMethod::Local)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// `<file>.backup_<YYYYMMDD_HHMMSS>` next to `path`.
pub fn backup_path(path: &Path, at: DateTime<Local>) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".backup_{}", at.format("%Y%m%d_%H%M%S")));
    PathBuf::from(name)
}

/// Overwrite `path` with `documented`, optionally backing up the file's
/// current bytes first.
pub fn write_documented(path: &Path, documented: &[u8], backup: bool) -> Result<Option<PathBuf>> {
    let backup_file = if backup {
        let target = backup_path(path, Local::now());
        std::fs::copy(path, &target).map_err(|e| CodeDocError::io(&target, e))?;
        debug!(backup = %target.display(), "wrote backup");
        Some(target)
    } else {
        None
    };
    std::fs::write(path, documented).map_err(|e| CodeDocError::io(path, e))?;
    Ok(backup_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use codedoc_llm::{Completion, ModelInfo};

    struct FixedProvider(String);

    #[async_trait]
    impl CompletionProvider for FixedProvider {
        fn name(&self) -> &str {
            "gemini"
        }

        fn model(&self) -> &str {
            "gemini-2.5-pro"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
            Ok(Completion {
                text: self.0.clone(),
                tokens_in: 1,
                tokens_out: 1,
                model: "gemini-2.5-pro".into(),
                latency_ms: 1,
            })
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            Ok(Vec::new())
        }
    }

    const SOURCE: &str = r#"#!/usr/bin/env python3
# -*- coding: utf-8 -*-
import os

class Store:
    def save(self, path,
             mode='w'):
        return os.path.join(path, mode)

    def load(self):
        """Already documented."""
        pass

def quick(): return 1
"#;

    #[test]
    fn local_inserts_module_class_and_method_docs() {
        let out = document_locally(SOURCE, "store.py");
        let expected = r#"#!/usr/bin/env python3
# -*- coding: utf-8 -*-
"""store.py

Module description.
"""

import os

class Store:
    """Store.

    Class description.
    """
    def save(self, path,
             mode='w'):
        """save.

        Args:
            path: Description
            mode: Description

        Returns:
            Description of return value
        """
        return os.path.join(path, mode)

    def load(self):
        """Already documented."""
        pass

def quick(): return 1
"#;
        assert_eq!(out, expected);
    }

    #[test]
    fn local_keeps_existing_module_docstring() {
        let src = "\"\"\"Tools.\"\"\"\n\ndef f(x):\n    return x\n";
        let out = document_locally(src, "tools.py");
        assert!(out.starts_with("\"\"\"Tools.\"\"\"\n\ndef f(x):\n    \"\"\"f.\n"));
        assert_eq!(out.matches("Module description").count(), 0);
    }

    #[test]
    fn local_is_idempotent() {
        let once = document_locally(SOURCE, "store.py");
        assert_eq!(document_locally(&once, "store.py"), once);
    }

    #[test]
    fn local_keeps_crlf_line_endings() {
        let src = "import os\r\n\r\ndef f(x):\r\n    return x\r\n";
        let out = document_locally(src, "tools.py");
        assert!(out.starts_with("\"\"\"tools.py\r\n"));
        assert!(out.contains("def f(x):\r\n    \"\"\"f.\r\n"));
        assert!(out.ends_with("    return x\r\n"));
        let bare = out
            .char_indices()
            .filter(|&(i, c)| c == '\n' && (i == 0 || out.as_bytes()[i - 1] != b'\r'))
            .count();
        assert_eq!(bare, 0);
        assert_eq!(document_locally(&out, "tools.py"), out);
    }

    #[test]
    fn backup_name_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            backup_path(Path::new("pkg/mod.py"), at),
            PathBuf::from("pkg/mod.py.backup_20240309_140507")
        );
    }

    #[test]
    fn preview_heads() {
        let original = (1..=12).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let preview = Preview::new(&original, "a\nb");
        assert_eq!(preview.original_head.len(), PREVIEW_LINES);
        assert_eq!(preview.original_lines, 12);
        assert_eq!(preview.documented_head, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn provider_rewrite_is_cleaned() {
        let provider = FixedProvider("```python\n\"\"\"Doc.\"\"\"\nx = 1\n```".into());
        let provider: &dyn CompletionProvider = &provider;
        let (out, method) = document_source(Some(provider), "x = 1\n", "x.py", 0.3, 500).await;
        assert_eq!(method, ApplyMethod::Provider);
        assert_eq!(out, "\"\"\"Doc.\"\"\"\nx = 1\n");
    }

    #[tokio::test]
    async fn echoed_prompt_falls_back_to_local() {
        let provider = FixedProvider("Here is {code}".into());
        let provider: &dyn CompletionProvider = &provider;
        let (out, method) = document_source(Some(provider), "x = 1\n", "x.py", 0.3, 500).await;
        assert_eq!(method, ApplyMethod::Local);
        assert!(out.starts_with("\"\"\"x.py\n"));
    }

    #[tokio::test]
    async fn unchanged_rewrite_is_rejected() {
        let provider = FixedProvider("x = 1".into());
        let err = document_with_provider(&provider, "x = 1\n", 0.3, 500)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no changes"));
    }

    #[test]
    fn write_with_and_without_backup() {
        let dir = std::env::temp_dir().join(format!("codedoc-apply-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("m.py");
        std::fs::write(&file, "x = 1\n").unwrap();

        let backup = write_documented(&file, b"\"\"\"m.\"\"\"\nx = 1\n", true)
            .unwrap()
            .unwrap();
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "x = 1\n");
        assert!(std::fs::read_to_string(&file).unwrap().starts_with("\"\"\"m."));

        assert!(write_documented(&file, b"b", false).unwrap().is_none());
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "b");

        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! Indentation-aware Python scanner.
//!
//! Finds `def`/`async def`/`class` statements at any depth, their parameter
//! lists, return annotations, decorators, and docstrings, plus `import`
//! statements. Lines that begin inside a triple-quoted string are never
//! treated as code.

use std::sync::LazyLock;

use codedoc_shared::{CodeElement, DocDelimiter, ElementKind, ImportInfo, Language};
use regex::Regex;

/// Matches `def name(` / `async def name(` on a stripped line.
static DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(async\s+)?def\s+([A-Za-z_]\w*)\s*\(").expect("def regex")
});

/// Matches `class Name` on a stripped line.
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^class\s+([A-Za-z_]\w*)").expect("class regex")
});

/// Matches `name = ...` or `name: T = ...` (not `==`).
static ASSIGN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_]\w*)\s*(?::[^=]*)?=(?:[^=]|$)").expect("assign regex")
});

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^import\s+(.+)$").expect("import regex")
});

static FROM_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^from\s+(\.*)\s*([\w.]*)\s+import\s+(.+)$").expect("from-import regex")
});

/// Elements extracted from one Python file.
#[derive(Debug, Default)]
pub struct PythonParse {
    pub functions: Vec<CodeElement>,
    pub classes: Vec<CodeElement>,
    pub imports: Vec<ImportInfo>,
    /// Every `def`/`class` header in source order.
    pub headers: Vec<BlockHeader>,
}

/// Position of a `def`/`class` header, used when inserting docstrings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub kind: ElementKind,
    pub name: String,
    /// 0-based line of the `def`/`class` keyword.
    pub start: usize,
    /// 0-based last line of the header.
    pub end: usize,
    /// Indentation of the header line, in columns.
    pub indent: usize,
    /// `def f(): return 1`
    pub inline_body: bool,
    /// The body opens with a string literal, even an empty one.
    pub has_docstring: bool,
}

/// An open `def`/`class` block while scanning.
struct Scope {
    indent: usize,
    kind: ElementKind,
    name: String,
    /// Index into `PythonParse::classes` for class scopes.
    class_idx: Option<usize>,
    body_indent: Option<usize>,
}

/// A `def`/`class` header, possibly spanning several physical lines.
struct Header {
    /// Comment-free header text joined onto one line.
    text: String,
    /// Index of the last physical line of the header.
    end: usize,
    /// Byte offset of the block-opening `:` in `text`.
    colon: Option<usize>,
}

impl Header {
    /// Text before the block colon.
    fn signature(&self) -> &str {
        match self.colon {
            Some(c) => self.text[..c].trim(),
            None => self.text.trim(),
        }
    }

    /// `def f(): return 1` style bodies.
    fn has_inline_body(&self) -> bool {
        self.colon
            .is_some_and(|c| !self.text[c + 1..].trim().is_empty())
    }
}

/// Scan Python source for functions, classes, and imports.
pub fn parse_python(content: &str, file_path: &str) -> PythonParse {
    let lines: Vec<&str> = content.lines().collect();
    let in_string = string_state(&lines);

    let mut out = PythonParse::default();
    let mut scopes: Vec<Scope> = Vec::new();
    let mut decorators: Vec<String> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if in_string[i] {
            i += 1;
            continue;
        }
        let line = lines[i];
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            i += 1;
            continue;
        }

        let indent = indent_of(line);
        while scopes.last().is_some_and(|s| s.indent >= indent) {
            scopes.pop();
        }

        if let Some(dec) = trimmed.strip_prefix('@') {
            // Bracketed arguments may continue over several lines.
            let mut text = strip_comment(dec).trim().to_string();
            let mut depth = bracket_delta(&text);
            i += 1;
            while depth > 0 && i < lines.len() {
                let part = strip_comment(lines[i]).trim();
                depth += bracket_delta(part);
                if !part.is_empty() {
                    if !text.ends_with(['(', '[', '{']) && !part.starts_with([')', ']', '}']) {
                        text.push(' ');
                    }
                    text.push_str(part);
                }
                i += 1;
            }
            decorators.push(text);
            continue;
        }

        if let Some(caps) = DEF_RE.captures(trimmed) {
            let name = caps[2].to_string();
            let header = read_header(&lines, i);
            let (args, returns) = parse_def_signature(header.signature());

            let mut el = CodeElement::new(
                name.clone(),
                ElementKind::Function,
                Language::Python,
                file_path,
                i + 1,
            );
            el.signature = header.signature().to_string();
            el.args = args;
            el.returns = returns;
            el.decorators = std::mem::take(&mut decorators);
            el.line_end = block_end(&lines, &in_string, header.end, indent) + 1;
            if !header.has_inline_body() {
                if let Some((doc, delim)) = find_docstring(&lines, header.end, indent) {
                    el.docstring = Some(doc);
                    el.doc_delimiter = Some(delim);
                }
            }
            out.headers.push(block_header(&lines, &header, ElementKind::Function, &name, i, indent));

            if let Some(scope) = scopes.last() {
                if let Some(idx) = scope.class_idx {
                    el.parent = Some(scope.name.clone());
                    out.classes[idx].methods.push(name.clone());
                }
            }

            out.functions.push(el);
            scopes.push(Scope {
                indent,
                kind: ElementKind::Function,
                name,
                class_idx: None,
                body_indent: None,
            });
            i = header.end + 1;
            continue;
        }

        if let Some(caps) = CLASS_RE.captures(trimmed) {
            let name = caps[1].to_string();
            let header = read_header(&lines, i);

            let mut el = CodeElement::new(
                name.clone(),
                ElementKind::Class,
                Language::Python,
                file_path,
                i + 1,
            );
            el.signature = header.signature().to_string();
            el.decorators = std::mem::take(&mut decorators);
            el.line_end = block_end(&lines, &in_string, header.end, indent) + 1;
            if !header.has_inline_body() {
                if let Some((doc, delim)) = find_docstring(&lines, header.end, indent) {
                    el.docstring = Some(doc);
                    el.doc_delimiter = Some(delim);
                }
            }
            out.headers.push(block_header(&lines, &header, ElementKind::Class, &name, i, indent));
            if let Some(scope) = scopes.last() {
                if scope.kind == ElementKind::Class {
                    el.parent = Some(scope.name.clone());
                }
            }

            out.classes.push(el);
            scopes.push(Scope {
                indent,
                kind: ElementKind::Class,
                name,
                class_idx: Some(out.classes.len() - 1),
                body_indent: first_body_indent(&lines, &in_string, header.end, indent),
            });
            i = header.end + 1;
            continue;
        }

        decorators.clear();

        if trimmed.starts_with("import ") || trimmed.starts_with("from ") {
            let (logical, end) = join_import(&lines, i);
            if let Some(import) = parse_import(&logical) {
                out.imports.push(import);
            }
            i = end + 1;
            continue;
        }

        if let Some(scope) = scopes.last() {
            if let (Some(idx), Some(body)) = (scope.class_idx, scope.body_indent) {
                if indent == body {
                    if let Some(caps) = ASSIGN_RE.captures(trimmed) {
                        out.classes[idx].class_variables.push(caps[1].to_string());
                    }
                }
            }
        }

        i += 1;
    }

    out
}

fn block_header(
    lines: &[&str],
    header: &Header,
    kind: ElementKind,
    name: &str,
    start: usize,
    indent: usize,
) -> BlockHeader {
    let inline_body = header.has_inline_body();
    let has_docstring = !inline_body
        && lines
            .iter()
            .skip(header.end + 1)
            .map(|l| l.trim())
            .find(|l| !l.is_empty() && !l.starts_with('#'))
            .is_some_and(opens_string);
    BlockHeader {
        kind,
        name: name.to_string(),
        start,
        end: header.end,
        indent,
        inline_body,
        has_docstring,
    }
}

/// True when a stripped line starts with a (possibly prefixed) string literal.
fn opens_string(line: &str) -> bool {
    let rest = line.trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'u' | 'U' | 'b' | 'B'));
    rest.starts_with('"') || rest.starts_with('\'')
}

/// Remove the common indentation from a raw docstring the way Python's
/// `inspect.cleandoc` does: the first line is stripped, the rest lose their
/// shared margin, and leading/trailing blank lines are dropped.
pub fn clean_docstring(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let Some(first) = lines.first() else {
        return String::new();
    };

    let margin = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<&str> = Vec::with_capacity(lines.len());
    cleaned.push(first.trim());
    for line in &lines[1..] {
        if line.trim().is_empty() {
            cleaned.push("");
        } else {
            cleaned.push(line[margin..].trim_end());
        }
    }

    while cleaned.first().is_some_and(|l| l.is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}

// ---------------------------------------------------------------------------
// Lexical helpers
// ---------------------------------------------------------------------------

/// For each line, whether it begins inside a triple-quoted string.
fn string_state(lines: &[&str]) -> Vec<bool> {
    let mut state = Vec::with_capacity(lines.len());
    let mut open: Option<&'static [u8]> = None;

    for line in lines {
        state.push(open.is_some());
        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if let Some(delim) = open {
                if bytes[i..].starts_with(delim) {
                    open = None;
                    i += 3;
                } else if bytes[i] == b'\\' {
                    i += 2;
                } else {
                    i += 1;
                }
                continue;
            }
            match bytes[i] {
                b'#' => break,
                q @ (b'"' | b'\'') => {
                    let triple: &'static [u8] = if q == b'"' { b"\"\"\"" } else { b"'''" };
                    if bytes[i..].starts_with(triple) {
                        open = Some(triple);
                        i += 3;
                    } else {
                        i = skip_short_string(bytes, i);
                    }
                }
                _ => i += 1,
            }
        }
    }
    state
}

/// Index just past the closing quote of the string opening at `start`.
fn skip_short_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut j = start + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b if b == quote => return j + 1,
            _ => j += 1,
        }
    }
    bytes.len()
}

/// Drop a trailing `# comment` that is not inside a string literal.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'#' => return &line[..i],
            b'"' | b'\'' => i = skip_short_string(bytes, i),
            _ => i += 1,
        }
    }
    line
}

/// Leading whitespace width with tabs counted as four columns.
fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// Net bracket depth change of `code`, ignoring brackets inside strings.
fn bracket_delta(code: &str) -> i32 {
    let bytes = code.as_bytes();
    let mut depth = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => {
                depth += 1;
                i += 1;
            }
            b')' | b']' | b'}' => {
                depth -= 1;
                i += 1;
            }
            b'"' | b'\'' => i = skip_short_string(bytes, i),
            _ => i += 1,
        }
    }
    depth
}

/// Join the physical lines of a header until brackets balance and no
/// backslash continuation remains.
fn read_header(lines: &[&str], start: usize) -> Header {
    let mut text = String::new();
    let mut depth = 0;
    let mut end = start;

    for (j, line) in lines.iter().enumerate().skip(start) {
        let code = strip_comment(line).trim();
        let code = code.strip_suffix('\\').unwrap_or(code).trim_end();
        depth += bracket_delta(code);
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(code);
        end = j;

        let continued = strip_comment(line).trim_end().ends_with('\\');
        if depth <= 0 && !continued {
            break;
        }
    }

    let colon = block_colon(&text);
    Header { text, end, colon }
}

/// First `:` outside brackets and strings.
fn block_colon(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'"' | b'\'' => {
                i = skip_short_string(bytes, i);
                continue;
            }
            b':' if depth == 0 => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split on commas that are not nested in brackets or strings.
fn split_top_level(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'"' | b'\'' => {
                i = skip_short_string(bytes, i);
                continue;
            }
            b',' if depth == 0 => {
                parts.push(&text[last..i]);
                last = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&text[last..]);
    parts
}

/// Parameter names and return annotation from `def name(...) -> T`.
fn parse_def_signature(signature: &str) -> (Vec<String>, Option<String>) {
    let Some(open) = signature.find('(') else {
        return (Vec::new(), None);
    };

    let bytes = signature.as_bytes();
    let mut depth = 0i32;
    let mut close = None;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            b'"' | b'\'' => {
                i = skip_short_string(bytes, i);
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    let Some(close) = close else {
        return (Vec::new(), None);
    };

    let args = split_top_level(&signature[open + 1..close])
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "/" && !p.starts_with('*'))
        .filter_map(|p| {
            let name = p.split([':', '=']).next().unwrap_or("").trim();
            is_identifier(name).then(|| name.to_string())
        })
        .collect();

    let returns = signature[close + 1..]
        .trim()
        .strip_prefix("->")
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    (args, returns)
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

// ---------------------------------------------------------------------------
// Block structure
// ---------------------------------------------------------------------------

/// Index of the last line belonging to the block opened at `header_end`.
fn block_end(lines: &[&str], in_string: &[bool], header_end: usize, indent: usize) -> usize {
    let mut last = header_end;
    for k in header_end + 1..lines.len() {
        if in_string[k] {
            last = k;
            continue;
        }
        let t = lines[k].trim();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        if indent_of(lines[k]) <= indent {
            break;
        }
        last = k;
    }
    last
}

/// Indentation of the first statement in a block.
fn first_body_indent(
    lines: &[&str],
    in_string: &[bool],
    header_end: usize,
    indent: usize,
) -> Option<usize> {
    (header_end + 1..lines.len())
        .filter(|&k| !in_string[k])
        .find(|&k| {
            let t = lines[k].trim();
            !t.is_empty() && !t.starts_with('#')
        })
        .map(|k| indent_of(lines[k]))
        .filter(|&body| body > indent)
}

/// The docstring of the block opened at `header_end`, if its first
/// statement is a string literal.
fn find_docstring(
    lines: &[&str],
    header_end: usize,
    indent: usize,
) -> Option<(String, DocDelimiter)> {
    let k = (header_end + 1..lines.len()).find(|&k| {
        let t = lines[k].trim();
        !t.is_empty() && !t.starts_with('#')
    })?;
    if indent_of(lines[k]) <= indent {
        return None;
    }

    let mut t = lines[k].trim_start();
    if t.starts_with(['r', 'R', 'u', 'U']) && t[1..].starts_with(['"', '\'']) {
        t = &t[1..];
    }

    let (raw, delim) = if t.starts_with("\"\"\"") || t.starts_with("'''") {
        let quote = &t[..3];
        let delim = if quote == "\"\"\"" {
            DocDelimiter::TripleDouble
        } else {
            DocDelimiter::TripleSingle
        };
        let after = &t[3..];
        if let Some(pos) = after.find(quote) {
            (after[..pos].to_string(), delim)
        } else {
            let mut raw = after.to_string();
            for line in &lines[k + 1..] {
                raw.push('\n');
                if let Some(pos) = line.find(quote) {
                    raw.push_str(&line[..pos]);
                    break;
                }
                raw.push_str(line);
            }
            (raw, delim)
        }
    } else if t.starts_with(['"', '\'']) {
        let end = skip_short_string(t.as_bytes(), 0);
        let body = t.get(1..end.saturating_sub(1)).unwrap_or("");
        (body.to_string(), DocDelimiter::SingleLine)
    } else {
        return None;
    };

    let cleaned = clean_docstring(&raw);
    (!cleaned.is_empty()).then_some((cleaned, delim))
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

/// Join a parenthesized multi-line `from x import (...)`.
fn join_import(lines: &[&str], start: usize) -> (String, usize) {
    let first = strip_comment(lines[start]).trim();
    if !first.contains('(') || first.contains(')') {
        return (first.to_string(), start);
    }

    let mut text = first.to_string();
    for (j, line) in lines.iter().enumerate().skip(start + 1) {
        let code = strip_comment(line).trim();
        text.push(' ');
        text.push_str(code);
        if code.contains(')') {
            return (text, j);
        }
    }
    (text, lines.len() - 1)
}

fn parse_import(logical: &str) -> Option<ImportInfo> {
    let split_names = |list: &str| -> Vec<(String, Option<String>)> {
        list.trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|item| match item.split_once(" as ") {
                Some((name, alias)) => (name.trim().to_string(), Some(alias.trim().to_string())),
                None => (item.to_string(), None),
            })
            .collect()
    };

    if let Some(caps) = FROM_IMPORT_RE.captures(logical) {
        let level = caps[1].len();
        let module = Some(caps[2].to_string()).filter(|m| !m.is_empty());
        let items = split_names(&caps[3]);
        return Some(ImportInfo::ImportFrom {
            module,
            level,
            names: items.iter().map(|(n, _)| n.clone()).collect(),
            aliases: items.into_iter().filter_map(|(_, a)| a).collect(),
        });
    }

    let caps = IMPORT_RE.captures(logical)?;
    let items = split_names(&caps[1]);
    Some(ImportInfo::Import {
        modules: items.iter().map(|(m, _)| m.clone()).collect(),
        names: items
            .into_iter()
            .map(|(m, alias)| alias.unwrap_or(m))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"#!/usr/bin/env python3
"""Module docstring."""

import os, sys as system
from ..core.store import (
    Store,
    Index as Idx,
)

TEMPLATE = """
def not_a_function(x):
    pass
"""


@dataclass
class Config(Base):
    '''Holds settings.

        Indented detail line.
    '''

    retries: int = 3
    name = "cfg"

    def load(self, path: str, *args, strict: bool = False, **kwargs) -> Dict[str, int]:
        """Load config from ``path``."""
        def helper(x):
            return x
        return {}

    @staticmethod
    async def fetch(
        url,
        timeout=30,
    ):
        # no docstring here
        pass


def top_level(a, b=2, /, c=None):
    "Short."
    return a


def one_liner(): return 1
"#;

    fn parsed() -> PythonParse {
        parse_python(SAMPLE, "pkg/config.py")
    }

    #[test]
    fn finds_functions_at_all_depths() {
        let p = parsed();
        let names: Vec<_> = p.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["load", "helper", "fetch", "top_level", "one_liner"]);
        assert!(!names.contains(&"not_a_function"));
    }

    #[test]
    fn class_details() {
        let p = parsed();
        assert_eq!(p.classes.len(), 1);
        let cfg = &p.classes[0];
        assert_eq!(cfg.name, "Config");
        assert_eq!(cfg.signature, "class Config(Base)");
        assert_eq!(cfg.decorators, vec!["dataclass"]);
        assert_eq!(cfg.methods, vec!["load", "fetch"]);
        assert_eq!(cfg.class_variables, vec!["retries", "name"]);
        assert_eq!(
            cfg.docstring.as_deref(),
            Some("Holds settings.\n\nIndented detail line.")
        );
        assert_eq!(cfg.doc_delimiter, Some(DocDelimiter::TripleSingle));
        assert_eq!(cfg.line_start, 17);
    }

    #[test]
    fn method_signature_details() {
        let p = parsed();
        let load = &p.functions[0];
        assert_eq!(load.args, vec!["self", "path", "strict"]);
        assert_eq!(load.returns.as_deref(), Some("Dict[str, int]"));
        assert_eq!(load.docstring.as_deref(), Some("Load config from ``path``."));
        assert_eq!(load.doc_delimiter, Some(DocDelimiter::TripleDouble));
        assert_eq!(load.parent.as_deref(), Some("Config"));
        assert_eq!(load.line_end, load.line_start + 4);

        let helper = &p.functions[1];
        assert_eq!(helper.parent, None);
    }

    #[test]
    fn multi_line_async_signature() {
        let p = parsed();
        let fetch = p.functions.iter().find(|f| f.name == "fetch").unwrap();
        assert_eq!(fetch.args, vec!["url", "timeout"]);
        assert_eq!(fetch.decorators, vec!["staticmethod"]);
        assert!(fetch.docstring.is_none());
        assert!(fetch.signature.starts_with("async def fetch("));
    }

    #[test]
    fn multi_line_decorators_attach_to_the_next_def() {
        let src = r#"class Views:
    @app.route(
        "/x",  # path
        methods=["GET"],
    )
    @login_required
    def view(self):
        return 1

@cache(
    ttl=60)
class Cached:
    pass
"#;
        let p = parse_python(src, "views.py");
        let view = &p.functions[0];
        assert_eq!(
            view.decorators,
            vec![r#"app.route("/x", methods=["GET"],)"#, "login_required"]
        );
        assert_eq!(view.parent.as_deref(), Some("Views"));
        assert_eq!(p.classes[1].decorators, vec!["cache(ttl=60)"]);
        assert_eq!(p.classes[0].methods, vec!["view"]);
    }

    #[test]
    fn positional_only_and_single_quote_docstring() {
        let p = parsed();
        let f = p.functions.iter().find(|f| f.name == "top_level").unwrap();
        assert_eq!(f.args, vec!["a", "b", "c"]);
        assert_eq!(f.docstring.as_deref(), Some("Short."));
        assert_eq!(f.doc_delimiter, Some(DocDelimiter::SingleLine));
        assert_eq!(f.parent, None);
    }

    #[test]
    fn one_liner_has_no_docstring() {
        let p = parsed();
        let f = p.functions.iter().find(|f| f.name == "one_liner").unwrap();
        assert!(f.docstring.is_none());
        assert_eq!(f.line_start, f.line_end);
    }

    #[test]
    fn block_headers_for_insertion() {
        let p = parsed();
        assert_eq!(p.headers.len(), p.functions.len() + p.classes.len());

        let fetch = p.headers.iter().find(|h| h.name == "fetch").unwrap();
        assert_eq!(fetch.kind, ElementKind::Function);
        assert_eq!(fetch.end, fetch.start + 3);
        assert_eq!(fetch.indent, 4);
        assert!(!fetch.has_docstring);

        let config = p.headers.iter().find(|h| h.name == "Config").unwrap();
        assert!(config.has_docstring);
        assert_eq!(config.indent, 0);

        let one_liner = p.headers.iter().find(|h| h.name == "one_liner").unwrap();
        assert!(one_liner.inline_body);
        assert!(!one_liner.has_docstring);

        let empty = parse_python("def f():\n    \"\"\"\"\"\"\n", "f.py");
        assert!(empty.headers[0].has_docstring);
        assert!(empty.functions[0].docstring.is_none());
    }

    #[test]
    fn imports() {
        let p = parsed();
        assert_eq!(p.imports.len(), 2);
        assert_eq!(
            p.imports[0],
            ImportInfo::Import {
                modules: vec!["os".into(), "sys".into()],
                names: vec!["os".into(), "system".into()],
            }
        );
        assert_eq!(
            p.imports[1],
            ImportInfo::ImportFrom {
                module: Some("core.store".into()),
                level: 2,
                names: vec!["Store".into(), "Index".into()],
                aliases: vec!["Idx".into()],
            }
        );
    }

    #[test]
    fn cleandoc_behaviour() {
        assert_eq!(clean_docstring(""), "");
        assert_eq!(clean_docstring("  one line  "), "one line");
        assert_eq!(
            clean_docstring("\n    Summary.\n\n    Args:\n        x: value\n    "),
            "Summary.\n\nArgs:\n    x: value"
        );
    }

    #[test]
    fn empty_docstring_counts_as_missing() {
        let p = parse_python("def f():\n    \"\"\"\"\"\"\n    pass\n", "f.py");
        assert!(p.functions[0].docstring.is_none());
    }

    #[test]
    fn raw_prefixed_docstring() {
        let p = parse_python("def f():\n    r\"\"\"Match \\d+ digits.\"\"\"\n", "f.py");
        assert_eq!(p.functions[0].docstring.as_deref(), Some("Match \\d+ digits."));
    }
}

//! Core domain types: parsed code elements, generated docs, and reports.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one command run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Languages the indexer recognizes, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    Javascript,
    Typescript,
    Java,
    Cpp,
    C,
    CHeader,
    CppHeader,
    Rust,
    Go,
    Ruby,
    Php,
    Swift,
    Kotlin,
    Scala,
}

impl Language {
    /// Map a file extension (without the dot, any case) to a language.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let lang = match ext.to_ascii_lowercase().as_str() {
            "py" => Self::Python,
            "js" => Self::Javascript,
            "ts" => Self::Typescript,
            "java" => Self::Java,
            "cpp" => Self::Cpp,
            "c" => Self::C,
            "h" => Self::CHeader,
            "hpp" => Self::CppHeader,
            "rs" => Self::Rust,
            "go" => Self::Go,
            "rb" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "kt" => Self::Kotlin,
            "scala" => Self::Scala,
            _ => return None,
        };
        Some(lang)
    }

    /// Language of `path`, if its extension is supported.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Javascript => "javascript",
            Self::Typescript => "typescript",
            Self::Java => "java",
            Self::Cpp => "cpp",
            Self::C => "c",
            Self::CHeader => "c_header",
            Self::CppHeader => "cpp_header",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Scala => "scala",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Code elements
// ---------------------------------------------------------------------------

/// Function-like or type-like element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Function,
    Class,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quote style of a Python docstring as written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocDelimiter {
    TripleDouble,
    TripleSingle,
    /// A plain `"..."` or `'...'` string.
    SingleLine,
}

impl DocDelimiter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TripleDouble => "triple-double-quotes",
            Self::TripleSingle => "triple-single-quotes",
            Self::SingleLine => "single-line-quotes",
        }
    }
}

/// A function, method, or class extracted from a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeElement {
    pub name: String,
    pub kind: ElementKind,
    pub language: Language,
    pub file_path: String,
    /// 1-based line of the declaration.
    pub line_start: usize,
    /// 1-based, inclusive.
    pub line_end: usize,
    /// Declaration text collapsed onto one line.
    pub signature: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<String>,
    /// Cleaned docstring text without delimiters.
    #[serde(default)]
    pub docstring: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_delimiter: Option<DocDelimiter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub class_variables: Vec<String>,
    /// Enclosing class for methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl CodeElement {
    /// Bare element with no documentation or members.
    pub fn new(
        name: impl Into<String>,
        kind: ElementKind,
        language: Language,
        file_path: impl Into<String>,
        line_start: usize,
    ) -> Self {
        let name = name.into();
        Self {
            signature: name.clone(),
            name,
            kind,
            language,
            file_path: file_path.into(),
            line_start,
            line_end: line_start,
            args: Vec::new(),
            returns: None,
            docstring: None,
            doc_delimiter: None,
            decorators: Vec::new(),
            methods: Vec::new(),
            class_variables: Vec::new(),
            parent: None,
        }
    }

    pub fn is_documented(&self) -> bool {
        self.docstring
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }

    /// `Parent.name` for methods, `name` otherwise.
    pub fn qualified_name(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{parent}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Parameters a reader would expect documented (no `self`/`cls`).
    pub fn documentable_args(&self) -> impl Iterator<Item = &str> {
        self.args
            .iter()
            .map(String::as_str)
            .filter(|a| *a != "self" && *a != "cls")
    }

    /// `path:line` for reports.
    pub fn location(&self) -> String {
        format!("{}:{}", self.file_path, self.line_start)
    }
}

/// A single import statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImportInfo {
    /// `import a, b as c`
    Import {
        modules: Vec<String>,
        /// Bound names (alias or module).
        names: Vec<String>,
    },
    /// `from ..pkg import x, y as z`
    ImportFrom {
        module: Option<String>,
        /// Number of leading dots.
        level: usize,
        names: Vec<String>,
        aliases: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Source files and parse results
// ---------------------------------------------------------------------------

/// One supported file and the elements found in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub name: String,
    pub language: Language,
    /// Length in characters.
    pub size: usize,
    pub line_count: usize,
    #[serde(skip)]
    pub content: String,
    #[serde(default)]
    pub functions: Vec<CodeElement>,
    #[serde(default)]
    pub classes: Vec<CodeElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ImportInfo>,
}

/// Aggregate counts over a parsed codebase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodebaseSummary {
    pub total_files: usize,
    pub total_functions: usize,
    pub total_classes: usize,
    /// Sorted, deduplicated.
    pub languages: Vec<Language>,
}

/// Everything the indexer extracted from a codebase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedCodebase {
    pub root: PathBuf,
    pub files: Vec<SourceFile>,
    pub summary: CodebaseSummary,
}

impl ParsedCodebase {
    /// Build a codebase and compute its summary.
    pub fn new(root: PathBuf, files: Vec<SourceFile>) -> Self {
        let mut languages: Vec<Language> = files.iter().map(|f| f.language).collect();
        languages.sort();
        languages.dedup();

        let summary = CodebaseSummary {
            total_files: files.len(),
            total_functions: files.iter().map(|f| f.functions.len()).sum(),
            total_classes: files.iter().map(|f| f.classes.len()).sum(),
            languages,
        };

        Self {
            root,
            files,
            summary,
        }
    }

    pub fn functions(&self) -> impl Iterator<Item = &CodeElement> {
        self.files.iter().flat_map(|f| f.functions.iter())
    }

    pub fn classes(&self) -> impl Iterator<Item = &CodeElement> {
        self.files.iter().flat_map(|f| f.classes.iter())
    }

    /// Functions first, then classes, each in file order.
    pub fn elements(&self) -> impl Iterator<Item = &CodeElement> {
        self.functions().chain(self.classes())
    }
}

// ---------------------------------------------------------------------------
// Generated documentation
// ---------------------------------------------------------------------------

/// Documentation produced for one element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedDoc {
    pub element: CodeElement,
    pub generated_doc: String,
    /// Docstring found in the source, if any.
    pub existing_doc: Option<String>,
    /// `openai`, `gemini`, or `template`.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub cached: bool,
    /// Provider failure that forced the template fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// All documentation produced by a `generate` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedDocs {
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    pub functions: Vec<GeneratedDoc>,
    pub classes: Vec<GeneratedDoc>,
}

impl GeneratedDocs {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            generated_at: Utc::now(),
            functions: Vec::new(),
            classes: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.functions.len() + self.classes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneratedDoc> {
        self.functions.iter().chain(self.classes.iter())
    }
}

// ---------------------------------------------------------------------------
// Consistency report
// ---------------------------------------------------------------------------

/// Documented/total counts behind the coverage messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageStats {
    pub total_functions: usize,
    pub documented_functions: usize,
    pub total_classes: usize,
    pub documented_classes: usize,
}

impl CoverageStats {
    /// `None` when there are no functions.
    pub fn function_pct(&self) -> Option<f64> {
        percentage(self.documented_functions, self.total_functions)
    }

    /// `None` when there are no classes.
    pub fn class_pct(&self) -> Option<f64> {
        percentage(self.documented_classes, self.total_classes)
    }
}

fn percentage(part: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| part as f64 / total as f64 * 100.0)
}

/// Output of the consistency checker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub style_issues: Vec<String>,
    pub formatting_issues: Vec<String>,
    pub coverage_issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub coverage: CoverageStats,
    /// `qualified_name (path:line)` of every undocumented element.
    #[serde(default)]
    pub undocumented: Vec<String>,
}

impl ConsistencyReport {
    pub fn has_issues(&self) -> bool {
        !self.style_issues.is_empty() || !self.formatting_issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with(functions: Vec<CodeElement>, classes: Vec<CodeElement>) -> SourceFile {
        SourceFile {
            path: "pkg/mod.py".into(),
            name: "mod.py".into(),
            language: Language::Python,
            size: 0,
            line_count: 0,
            content: String::new(),
            functions,
            classes,
            imports: vec![],
        }
    }

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn language_from_extension_is_case_insensitive() {
        assert_eq!(Language::from_extension("PY"), Some(Language::Python));
        assert_eq!(Language::from_extension("hpp"), Some(Language::CppHeader));
        assert_eq!(Language::from_extension("md"), None);
        assert_eq!(
            Language::from_path(Path::new("src/lib.rs")),
            Some(Language::Rust)
        );
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn language_serializes_snake_case() {
        let json = serde_json::to_string(&Language::CHeader).unwrap();
        assert_eq!(json, r#""c_header""#);
    }

    #[test]
    fn element_helpers() {
        let mut el = CodeElement::new("save", ElementKind::Function, Language::Python, "a.py", 3);
        el.args = vec!["self".into(), "path".into()];
        el.parent = Some("Store".into());
        assert!(!el.is_documented());
        assert_eq!(el.qualified_name(), "Store.save");
        assert_eq!(el.documentable_args().collect::<Vec<_>>(), vec!["path"]);
        assert_eq!(el.location(), "a.py:3");

        el.docstring = Some("   ".into());
        assert!(!el.is_documented());
        el.docstring = Some("Persist to disk.".into());
        assert!(el.is_documented());
    }

    #[test]
    fn codebase_summary_counts_and_dedups_languages() {
        let f = CodeElement::new("f", ElementKind::Function, Language::Python, "a.py", 1);
        let c = CodeElement::new("C", ElementKind::Class, Language::Python, "a.py", 5);
        let mut rust_file = file_with(vec![f.clone()], vec![]);
        rust_file.language = Language::Rust;

        let parsed = ParsedCodebase::new(
            PathBuf::from("."),
            vec![
                file_with(vec![f.clone(), f], vec![c]),
                rust_file,
                file_with(vec![], vec![]),
            ],
        );
        assert_eq!(parsed.summary.total_files, 3);
        assert_eq!(parsed.summary.total_functions, 3);
        assert_eq!(parsed.summary.total_classes, 1);
        assert_eq!(
            parsed.summary.languages,
            vec![Language::Python, Language::Rust]
        );
        assert_eq!(parsed.elements().count(), 4);
    }

    #[test]
    fn coverage_percentages() {
        let stats = CoverageStats {
            total_functions: 3,
            documented_functions: 2,
            total_classes: 0,
            documented_classes: 0,
        };
        let pct = stats.function_pct().unwrap();
        assert_eq!(format!("{pct:.1}"), "66.7");
        assert!(stats.class_pct().is_none());
    }

    #[test]
    fn import_info_is_tagged() {
        let import = ImportInfo::ImportFrom {
            module: Some("os".into()),
            level: 0,
            names: vec!["path".into()],
            aliases: vec![],
        };
        let json = serde_json::to_string(&import).unwrap();
        assert!(json.contains(r#""type":"import_from""#));
    }

    #[test]
    fn source_file_content_is_not_serialized() {
        let mut file = file_with(vec![], vec![]);
        file.content = "secret body".into();
        let json = serde_json::to_string(&file).unwrap();
        assert!(!json.contains("secret body"));
    }
}

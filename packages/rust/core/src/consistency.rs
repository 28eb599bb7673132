//! Consistency checker: docstring style, parameter sections, and coverage.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use codedoc_shared::{
    CodeElement, ConsistencyReport, CoverageStats, DocDelimiter, GeneratedDocs, Language,
    ParsedCodebase,
};

/// Coverage below this percentage triggers a recommendation.
pub const COVERAGE_TARGET: f64 = 80.0;

/// Keywords that count as a parameter section.
const PARAM_KEYWORDS: [&str; 4] = ["param", "argument", "args:", "parameters:"];

static GOOGLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(Args|Arguments|Returns|Yields|Raises|Attributes|Examples?):\s*$")
        .expect("google section regex")
});
static NUMPY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(Parameters|Returns|Yields|Raises|Attributes|Examples?)\s*\n\s*-{3,}\s*$")
        .expect("numpy section regex")
});
static SPHINX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*:(param|type|returns?|rtype|raises?)\b").expect("sphinx field regex")
});
static EPYTEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*@(param|type|return|rtype|raise)\b").expect("epytext field regex")
});

/// Docstring convention of a single docstring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocStyle {
    Google,
    Numpy,
    Sphinx,
    Epytext,
    /// Prose with no recognizable sections.
    Plain,
}

impl DocStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Numpy => "numpy",
            Self::Sphinx => "sphinx",
            Self::Epytext => "epytext",
            Self::Plain => "plain",
        }
    }

    /// Classify `doc`. Numpy is checked first since its section titles
    /// overlap with Google's once the underline is ignored.
    pub fn detect(doc: &str) -> Self {
        if NUMPY_RE.is_match(doc) {
            Self::Numpy
        } else if GOOGLE_RE.is_match(doc) {
            Self::Google
        } else if SPHINX_RE.is_match(doc) {
            Self::Sphinx
        } else if EPYTEXT_RE.is_match(doc) {
            Self::Epytext
        } else {
            Self::Plain
        }
    }
}

/// Analyze documentation quality of `parsed`.
///
/// `generated` adds the formatting checks on freshly generated docs; the
/// `analyze` command passes `None`.
#[instrument(skip_all, fields(files = parsed.summary.total_files))]
pub fn analyze(parsed: &ParsedCodebase, generated: Option<&GeneratedDocs>) -> ConsistencyReport {
    let mut report = ConsistencyReport::default();

    let styles = check_style(parsed, &mut report);
    if let Some(generated) = generated {
        check_formatting(generated, &mut report);
    }
    check_coverage(parsed, &mut report);
    recommend(&styles, &mut report);

    debug!(
        style_issues = report.style_issues.len(),
        formatting_issues = report.formatting_issues.len(),
        undocumented = report.undocumented.len(),
        "consistency analysis complete"
    );
    report
}

/// Count of each non-plain style across existing function docstrings.
fn check_style(parsed: &ParsedCodebase, report: &mut ConsistencyReport) -> BTreeMap<DocStyle, usize> {
    let mut styles: BTreeMap<DocStyle, usize> = BTreeMap::new();
    for doc in parsed.functions().filter_map(documented_text) {
        let style = DocStyle::detect(doc);
        if style != DocStyle::Plain {
            *styles.entry(style).or_default() += 1;
        }
    }

    if styles.len() > 1 {
        let mut names: Vec<&str> = styles.keys().map(DocStyle::as_str).collect();
        names.sort_unstable();
        report
            .style_issues
            .push(format!("Multiple docstring styles detected: {}", names.join(", ")));
    }

    // Quote style only exists for Python.
    let mut delimiters: Vec<DocDelimiter> = parsed
        .elements()
        .filter(|el| el.language == Language::Python)
        .filter_map(|el| el.doc_delimiter)
        .filter(|d| *d != DocDelimiter::SingleLine)
        .collect();
    delimiters.sort_by_key(|d| d.as_str());
    delimiters.dedup();
    if delimiters.len() > 1 {
        let names: Vec<&str> = delimiters.iter().map(DocDelimiter::as_str).collect();
        report
            .style_issues
            .push(format!("Mixed docstring quote styles: {}", names.join(", ")));
    }

    styles
}

fn check_formatting(generated: &GeneratedDocs, report: &mut ConsistencyReport) {
    for doc in &generated.functions {
        if doc.element.documentable_args().next().is_none() {
            continue;
        }
        if !has_parameter_section(&doc.generated_doc) {
            report.formatting_issues.push(format!(
                "Function {}: Missing parameter section",
                doc.element.name
            ));
        }
    }
}

/// True when `doc` mentions parameters in any common convention.
pub fn has_parameter_section(doc: &str) -> bool {
    let lower = doc.to_lowercase();
    PARAM_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn check_coverage(parsed: &ParsedCodebase, report: &mut ConsistencyReport) {
    let mut stats = CoverageStats::default();
    for el in parsed.functions() {
        stats.total_functions += 1;
        if el.is_documented() {
            stats.documented_functions += 1;
        } else {
            report.undocumented.push(undocumented_entry(el));
        }
    }
    for el in parsed.classes() {
        stats.total_classes += 1;
        if el.is_documented() {
            stats.documented_classes += 1;
        } else {
            report.undocumented.push(undocumented_entry(el));
        }
    }

    if let Some(pct) = stats.function_pct() {
        report
            .coverage_issues
            .push(format!("Function documentation coverage: {pct:.1}%"));
    }
    if let Some(pct) = stats.class_pct() {
        report
            .coverage_issues
            .push(format!("Class documentation coverage: {pct:.1}%"));
    }
    report.coverage = stats;
}

fn recommend(styles: &BTreeMap<DocStyle, usize>, report: &mut ConsistencyReport) {
    let stats = report.coverage.clone();

    if stats.total_functions == 0 && stats.total_classes == 0 {
        report.recommendations.push(
            "No supported code elements were found; check the path and the excluded directories"
                .to_string(),
        );
        return;
    }

    if let Some(pct) = stats.function_pct().filter(|p| *p < COVERAGE_TARGET) {
        let missing = stats.total_functions - stats.documented_functions;
        report.recommendations.push(format!(
            "Document the {missing} undocumented function(s) to raise coverage from {pct:.1}% to at least {COVERAGE_TARGET:.0}%"
        ));
    }
    if let Some(pct) = stats.class_pct().filter(|p| *p < COVERAGE_TARGET) {
        let missing = stats.total_classes - stats.documented_classes;
        report.recommendations.push(format!(
            "Document the {missing} undocumented class(es) to raise coverage from {pct:.1}% to at least {COVERAGE_TARGET:.0}%"
        ));
    }

    if styles.len() > 1 {
        // Most common wins; ties go to the first in style order.
        let dominant = styles
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(style, _)| style.as_str())
            .unwrap_or("google");
        report.recommendations.push(format!(
            "Standardize docstrings on the most common style ({dominant})"
        ));
    }

    if !report.formatting_issues.is_empty() {
        report.recommendations.push(format!(
            "Add parameter sections to {} generated function doc(s)",
            report.formatting_issues.len()
        ));
    }
}

fn documented_text(el: &CodeElement) -> Option<&str> {
    el.docstring.as_deref().filter(|d| !d.trim().is_empty())
}

fn undocumented_entry(el: &CodeElement) -> String {
    format!("{} ({})", el.qualified_name(), el.location())
}

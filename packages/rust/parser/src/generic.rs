//! Regex-table extraction for non-Python languages.
//!
//! Each language gets a small set of declaration patterns. Patterns run on
//! trimmed lines; bodies are delimited by brace matching (or `end` keywords
//! for Ruby) and doc comments are read upward from the declaration.

use std::sync::LazyLock;

use codedoc_shared::{CodeElement, ElementKind, Language};
use regex::{Captures, Regex};

use crate::python::clean_docstring;

/// Lines of header the scanner will look through for a body opener.
const MAX_HEADER_LINES: usize = 20;

/// Words that look like declarations to a regex but never are.
const KEYWORDS: &[&str] = &[
    "if", "else", "elif", "for", "foreach", "while", "do", "switch", "case", "when", "match",
    "catch", "try", "return", "new", "delete", "throw", "function", "sizeof", "typeof", "until",
    "unless", "super", "this", "synchronized", "await", "yield", "goto", "in", "of", "with",
    "assert", "fn", "let", "var", "const",
];

/// Leading words that are modifiers rather than a return type.
const MODIFIERS: &[&str] = &[
    "public", "private", "protected", "static", "final", "abstract", "synchronized", "native",
    "default", "virtual", "inline", "explicit",
];

#[derive(Debug, Clone, Copy)]
enum DocStyle {
    /// `/// text` runs.
    TripleSlash,
    /// `// text` runs.
    DoubleSlash,
    /// `/** ... */` blocks.
    Block,
    /// `# text` runs.
    Hash,
}

#[derive(Debug, Clone, Copy)]
enum ParamStyle {
    /// `name: Type`, `name Type`, `name = default`.
    NameFirst,
    /// `Type name`.
    NameLast,
    /// `Type $name`.
    Dollar,
}

#[derive(Debug, Clone, Copy)]
enum ReturnStyle {
    /// `) -> T`
    Arrow,
    /// `): T`
    Colon,
    /// `) T {`
    Trailing,
    /// Captured before the name as `ret`.
    Prefix,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    Braces,
    EndKeyword,
}

struct Rules {
    languages: &'static [Language],
    functions: Vec<Regex>,
    /// Only tried inside a class body.
    members: Vec<Regex>,
    classes: Vec<Regex>,
    /// Blocks like `impl X` that own methods without being classes.
    containers: Vec<Regex>,
    docs: &'static [DocStyle],
    params: ParamStyle,
    returns: ReturnStyle,
    body: Body,
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("declaration regex")
}

static RULES: LazyLock<Vec<Rules>> = LazyLock::new(|| {
    vec![
        Rules {
            languages: &[Language::Rust],
            functions: vec![re(
                r#"^(?:pub(?:\([^)]*\))?\s+)?(?:(?:const|async|unsafe|default)\s+)*(?:extern\s+"[^"]*"\s+)?fn\s+(?P<name>[A-Za-z_]\w*)\s*(?:<.*?>)?\s*(?P<open>\()"#,
            )],
            members: Vec::new(),
            classes: vec![re(
                r"^(?:pub(?:\([^)]*\))?\s+)?(?:unsafe\s+)?(?:struct|enum|trait|union)\s+(?P<name>[A-Za-z_]\w*)",
            )],
            containers: vec![re(
                r"^(?:unsafe\s+)?impl(?:\s*<.*?>)?\s+(?:[\w:<>, ]+?\s+for\s+)?(?:\w+::)*(?P<name>[A-Za-z_]\w*)",
            )],
            docs: &[DocStyle::TripleSlash],
            params: ParamStyle::NameFirst,
            returns: ReturnStyle::Arrow,
            body: Body::Braces,
        },
        Rules {
            languages: &[Language::Go],
            functions: vec![re(
                r"^func\s+(?:\((?P<recv>[^)]*)\)\s*)?(?P<name>[A-Za-z_]\w*)\s*(?:\[[^\]]*\])?\s*(?P<open>\()",
            )],
            members: Vec::new(),
            classes: vec![re(
                r"^type\s+(?P<name>[A-Za-z_]\w*)(?:\[[^\]]*\])?\s+(?:struct|interface)\b",
            )],
            containers: Vec::new(),
            docs: &[DocStyle::DoubleSlash],
            params: ParamStyle::NameFirst,
            returns: ReturnStyle::Trailing,
            body: Body::Braces,
        },
        Rules {
            languages: &[Language::Javascript, Language::Typescript],
            functions: vec![
                re(
                    r"^(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>[A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*(?P<open>\()",
                ),
                re(
                    r"^(?:export\s+)?(?:const|let|var)\s+(?P<name>[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?function\b[^(]*(?P<open>\()",
                ),
                re(
                    r"^(?:export\s+)?(?:const|let|var)\s+(?P<name>[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?P<open>\()[^)]*\)\s*(?::[^=]+)?=>",
                ),
            ],
            members: vec![re(
                r"^(?:(?:public|private|protected|static|async|readonly|abstract|override|get|set)\s+|\*\s*)*(?P<name>[A-Za-z_$][\w$]*)\s*(?:<[^>]*>)?\s*(?P<open>\()[^;]*$",
            )],
            classes: vec![re(
                r"^(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:class|interface)\s+(?P<name>[A-Za-z_$][\w$]*)",
            )],
            containers: Vec::new(),
            docs: &[DocStyle::Block],
            params: ParamStyle::NameFirst,
            returns: ReturnStyle::Colon,
            body: Body::Braces,
        },
        Rules {
            languages: &[Language::Java],
            functions: vec![re(
                r"^(?:(?:public|private|protected|static|final|abstract|synchronized|native|default|strictfp)\s+)*(?:<[^>]+>\s+)?(?P<ret>[\w<>\[\],.?]+(?:\s*<[^>]*>)?)\s+(?P<name>[A-Za-z_]\w*)\s*(?P<open>\()",
            )],
            members: Vec::new(),
            classes: vec![re(
                r"^(?:(?:public|private|protected|static|final|abstract|sealed|non-sealed)\s+)*(?:class|interface|enum|record|@interface)\s+(?P<name>[A-Za-z_]\w*)",
            )],
            containers: Vec::new(),
            docs: &[DocStyle::Block],
            params: ParamStyle::NameLast,
            returns: ReturnStyle::Prefix,
            body: Body::Braces,
        },
        Rules {
            languages: &[Language::C, Language::CHeader],
            functions: vec![c_function_regex()],
            members: Vec::new(),
            classes: vec![re(
                r"^(?:typedef\s+)?(?:struct|union|enum)\s+(?P<name>[A-Za-z_]\w*)\s*\{?\s*$",
            )],
            containers: Vec::new(),
            docs: &[DocStyle::Block],
            params: ParamStyle::NameLast,
            returns: ReturnStyle::Prefix,
            body: Body::Braces,
        },
        Rules {
            languages: &[Language::Cpp, Language::CppHeader],
            functions: vec![c_function_regex()],
            members: Vec::new(),
            classes: vec![re(
                r"^(?:template\s*<[^>]*>\s*)?(?:class|struct|union)\s+(?:\w+\s+)?(?P<name>[A-Za-z_]\w*)[^;]*$",
            )],
            containers: Vec::new(),
            docs: &[DocStyle::Block],
            params: ParamStyle::NameLast,
            returns: ReturnStyle::Prefix,
            body: Body::Braces,
        },
        Rules {
            languages: &[Language::Kotlin],
            functions: vec![re(
                r"^(?:(?:public|private|protected|internal|open|override|suspend|inline|abstract|final|operator|infix|tailrec|external)\s+)*fun\s+(?:<[^>]*>\s*)?(?:[\w.]+\.)?(?P<name>[A-Za-z_]\w*)\s*(?P<open>\()",
            )],
            members: Vec::new(),
            classes: vec![re(
                r"^(?:(?:public|private|protected|internal|open|abstract|sealed|data|enum|inner|annotation|value)\s+)*(?:class|interface|object)\s+(?P<name>[A-Za-z_]\w*)",
            )],
            containers: Vec::new(),
            docs: &[DocStyle::Block],
            params: ParamStyle::NameFirst,
            returns: ReturnStyle::Colon,
            body: Body::Braces,
        },
        Rules {
            languages: &[Language::Scala],
            functions: vec![re(
                r"^(?:(?:override|private|protected|final|implicit|lazy)\s+)*def\s+(?P<name>[A-Za-z_]\w*)\s*(?:\[[^\]]*\])?\s*(?P<open>\()?",
            )],
            members: Vec::new(),
            classes: vec![re(
                r"^(?:(?:case|abstract|sealed|final|implicit)\s+)*(?:class|trait|object)\s+(?P<name>[A-Za-z_]\w*)",
            )],
            containers: Vec::new(),
            docs: &[DocStyle::Block],
            params: ParamStyle::NameFirst,
            returns: ReturnStyle::Colon,
            body: Body::Braces,
        },
        Rules {
            languages: &[Language::Swift],
            functions: vec![re(
                r"^(?:(?:public|private|fileprivate|internal|open|static|class|override|final|mutating|@\w+)\s+)*func\s+(?P<name>[A-Za-z_]\w*)\s*(?:<[^>]*>)?\s*(?P<open>\()",
            )],
            members: Vec::new(),
            classes: vec![re(
                r"^(?:(?:public|private|fileprivate|internal|open|final)\s+)*(?:class|struct|protocol|enum|actor)\s+(?P<name>[A-Za-z_]\w*)",
            )],
            containers: vec![re(
                r"^(?:(?:public|private|fileprivate|internal)\s+)?extension\s+(?P<name>[A-Za-z_]\w*)",
            )],
            docs: &[DocStyle::TripleSlash, DocStyle::Block],
            params: ParamStyle::NameFirst,
            returns: ReturnStyle::Arrow,
            body: Body::Braces,
        },
        Rules {
            languages: &[Language::Php],
            functions: vec![re(
                r"^(?:(?:public|private|protected|static|final|abstract)\s+)*function\s+&?(?P<name>[A-Za-z_]\w*)\s*(?P<open>\()",
            )],
            members: Vec::new(),
            classes: vec![re(
                r"^(?:(?:abstract|final|readonly)\s+)*(?:class|interface|trait|enum)\s+(?P<name>[A-Za-z_]\w*)",
            )],
            containers: Vec::new(),
            docs: &[DocStyle::Block],
            params: ParamStyle::Dollar,
            returns: ReturnStyle::Colon,
            body: Body::Braces,
        },
        Rules {
            languages: &[Language::Ruby],
            functions: vec![re(
                r"^def\s+(?:self\.)?(?P<name>[A-Za-z_]\w*[?!=]?)\s*(?P<open>\()?",
            )],
            members: Vec::new(),
            classes: vec![re(r"^(?:class|module)\s+(?P<name>[A-Z]\w*(?:::\w+)*)")],
            containers: Vec::new(),
            docs: &[DocStyle::Hash],
            params: ParamStyle::NameFirst,
            returns: ReturnStyle::None,
            body: Body::EndKeyword,
        },
    ]
});

fn c_function_regex() -> Regex {
    re(
        r"^(?:(?:static|inline|extern|virtual|constexpr|explicit|friend|unsigned|signed|const|struct|enum)\s+)*(?P<ret>[A-Za-z_][\w:<>,]*)[\s*&]+(?P<name>[A-Za-z_~][\w~]*(?:::[A-Za-z_~][\w~]*)*)\s*(?P<open>\()",
    )
}

static RUBY_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:def|class|module|if|unless|while|until|case|begin|for)\b")
        .expect("ruby opener regex")
});

static RUBY_DO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdo(?:\s*\|[^|]*\|)?\s*$").expect("ruby do regex"));

static RUBY_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bend\b").expect("ruby end regex"));

fn rules_for(language: Language) -> Option<&'static Rules> {
    RULES.iter().find(|r| r.languages.contains(&language))
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Block owning methods: classes plus `impl`/`extension` containers.
struct Owner {
    name: String,
    start: usize,
    end: usize,
}

/// Extract `(functions, classes)` from a non-Python source file.
pub(crate) fn parse_generic(
    content: &str,
    file_path: &str,
    language: Language,
) -> (Vec<CodeElement>, Vec<CodeElement>) {
    let Some(rules) = rules_for(language) else {
        return (Vec::new(), Vec::new());
    };
    let lines: Vec<&str> = content.lines().collect();

    // Pass 1: type-like declarations and method containers.
    let mut classes: Vec<CodeElement> = Vec::new();
    let mut owners: Vec<Owner> = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let t = line.trim();
        if is_comment(t, rules) {
            continue;
        }

        if let Some(caps) = first_match(&rules.containers, t) {
            owners.push(Owner {
                name: caps["name"].to_string(),
                start: idx + 1,
                end: block_end(&lines, idx, rules.body) + 1,
            });
            continue;
        }

        let Some(caps) = first_match(&rules.classes, t) else {
            continue;
        };
        let name = caps["name"].to_string();
        if is_keyword(&name) {
            continue;
        }

        let mut el = CodeElement::new(name.clone(), ElementKind::Class, language, file_path, idx + 1);
        el.signature = collapse(cut_body(t));
        el.line_end = block_end(&lines, idx, rules.body) + 1;
        el.docstring = doc_comment(&lines, idx, rules.docs);
        owners.push(Owner {
            name,
            start: el.line_start,
            end: el.line_end,
        });
        classes.push(el);
    }

    // Pass 2: functions and methods. Anything inside an earlier function's
    // body is a local helper or a call and is skipped.
    let mut functions: Vec<CodeElement> = Vec::new();
    let mut body_until = 0;

    for (idx, line) in lines.iter().enumerate() {
        let lineno = idx + 1;
        if lineno <= body_until {
            continue;
        }
        let t = line.trim();
        if is_comment(t, rules) {
            continue;
        }

        let enclosing = innermost_owner(&owners, lineno);
        let caps = match first_match(&rules.functions, t) {
            Some(caps) => caps,
            None if enclosing.is_some() => match first_match(&rules.members, t) {
                Some(caps) => caps,
                None => continue,
            },
            None => continue,
        };

        let raw_name = &caps["name"];
        let (mut parent, name) = match raw_name.rsplit_once("::") {
            Some((owner, name)) => (Some(owner.to_string()), name.to_string()),
            None => (None, raw_name.to_string()),
        };
        if is_keyword(&name) {
            continue;
        }
        let ret = caps.name("ret").map(|m| m.as_str().trim());
        if ret.is_some_and(is_keyword) {
            continue;
        }
        if let Some(recv) = caps.name("recv") {
            parent = go_receiver_type(recv.as_str());
        }

        let mut el = CodeElement::new(name.clone(), ElementKind::Function, language, file_path, lineno);
        match caps.name("open") {
            Some(open) => {
                if let Some(header) = read_params(&lines, idx, t, open.start()) {
                    el.args = parse_params(&header.params, rules.params);
                    el.returns = return_type(rules.returns, &header.after, ret);
                    el.signature = collapse(&format!("{}{}", header.head, cut_body(&header.after)));
                }
            }
            None => {
                let after = &t[caps.get(0).map_or(t.len(), |m| m.end())..];
                el.returns = return_type(rules.returns, after, ret);
                el.signature = collapse(cut_body(t));
            }
        }
        el.line_end = block_end(&lines, idx, rules.body) + 1;
        el.docstring = doc_comment(&lines, idx, rules.docs);

        let parent = parent.or_else(|| enclosing.map(|o| o.name.clone()));
        if let Some(owner) = &parent {
            if let Some(class) = classes.iter_mut().find(|c| &c.name == owner) {
                class.methods.push(name);
            }
        }
        el.parent = parent;

        if el.line_end > lineno {
            body_until = el.line_end;
        }
        functions.push(el);
    }

    (functions, classes)
}

fn first_match<'t>(patterns: &[Regex], text: &'t str) -> Option<Captures<'t>> {
    patterns.iter().find_map(|re| re.captures(text))
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

fn is_comment(t: &str, rules: &Rules) -> bool {
    t.starts_with("//")
        || t.starts_with("/*")
        || t.starts_with('*')
        || (rules.body == Body::EndKeyword && t.starts_with('#'))
}

/// Smallest owner block strictly enclosing `lineno`.
fn innermost_owner(owners: &[Owner], lineno: usize) -> Option<&Owner> {
    owners
        .iter()
        .filter(|o| o.start < lineno && lineno <= o.end)
        .min_by_key(|o| o.end - o.start)
}

/// `s *Server[T]` → `Server`.
fn go_receiver_type(recv: &str) -> Option<String> {
    let ty = recv.split_whitespace().last()?;
    let ty = ty.trim_start_matches('*');
    let ty = ty.split('[').next().unwrap_or(ty);
    (!ty.is_empty()).then(|| ty.to_string())
}

/// Declaration text before the body opener.
fn cut_body(text: &str) -> &str {
    let text = text.split('{').next().unwrap_or(text);
    text.trim_end().trim_end_matches(';').trim_end()
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Parameters and return types
// ---------------------------------------------------------------------------

struct ParamHeader {
    /// Declaration text through the closing parenthesis.
    head: String,
    params: String,
    /// Remainder of the line holding the closing parenthesis.
    after: String,
}

/// Join lines from `idx` until the parenthesis at `open` in `t` closes.
fn read_params(lines: &[&str], idx: usize, t: &str, open: usize) -> Option<ParamHeader> {
    let mut text = t.to_string();
    let mut end = idx;
    loop {
        if let Some(close) = matching_paren(&text, open) {
            return Some(ParamHeader {
                head: text[..=close].to_string(),
                params: text[open + 1..close].to_string(),
                after: text[close + 1..].to_string(),
            });
        }
        end += 1;
        if end >= lines.len() || end > idx + MAX_HEADER_LINES {
            return None;
        }
        text.push(' ');
        text.push_str(lines[end].trim());
    }
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            b'"' => i = skip_string(bytes, i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index of the closing `"` of the string opening at `start`.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let mut j = start + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'"' => return j,
            _ => j += 1,
        }
    }
    bytes.len()
}

/// Split on commas outside any bracket pair, generics included.
fn split_params(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut last = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' | '>' => depth = (depth - 1).max(0),
            ',' if depth == 0 => {
                parts.push(&text[last..i]);
                last = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[last..]);
    parts
}

fn parse_params(params: &str, style: ParamStyle) -> Vec<String> {
    split_params(params)
        .into_iter()
        .filter_map(|p| {
            // `=>` never appears in a parameter; `=` starts a default.
            let p = p.split('=').next().unwrap_or("").trim();
            if p.is_empty() {
                return None;
            }
            let name = match style {
                ParamStyle::NameFirst => match p.split_once(':') {
                    Some((before, _)) => before.split_whitespace().last()?,
                    None => p
                        .split_whitespace()
                        .find(|w| !matches!(*w, "mut" | "&mut" | "val" | "var" | "const"))?,
                },
                ParamStyle::NameLast => {
                    let p = p.split('[').next().unwrap_or(p);
                    let last = p.split_whitespace().last()?;
                    if last == "void" && !p.contains(char::is_whitespace) {
                        return None;
                    }
                    last
                }
                ParamStyle::Dollar => {
                    let word = p.split_whitespace().find(|w| w.contains('$'))?;
                    &word[word.find('$')? + 1..]
                }
            };
            let name = name.trim_start_matches(['&', '*', '.']);
            is_identifier(name).then(|| name.to_string())
        })
        .collect()
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c == '$' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c == '$' || c.is_alphanumeric())
}

fn return_type(style: ReturnStyle, after: &str, ret: Option<&str>) -> Option<String> {
    let after = after.trim_start();
    let found = match style {
        ReturnStyle::Arrow => after
            .strip_prefix("->")
            .map(|r| cut_body(r.split(" where ").next().unwrap_or(r))),
        ReturnStyle::Colon => after
            .strip_prefix(':')
            .map(|r| cut_body(r.split('=').next().unwrap_or(r))),
        ReturnStyle::Trailing => Some(cut_body(after)),
        ReturnStyle::Prefix => ret.filter(|r| *r != "void" && !MODIFIERS.contains(r)),
        ReturnStyle::None => None,
    };
    found
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Block extents
// ---------------------------------------------------------------------------

/// Index of the last line of the declaration at `idx`.
fn block_end(lines: &[&str], idx: usize, body: Body) -> usize {
    match body {
        Body::Braces => brace_block_end(lines, idx),
        Body::EndKeyword => end_keyword_block_end(lines, idx),
    }
}

fn brace_block_end(lines: &[&str], idx: usize) -> usize {
    let mut braces = 0i32;
    let mut parens = 0i32;
    let mut opened = false;

    for (j, line) in lines.iter().enumerate().skip(idx) {
        let code = line.split("//").next().unwrap_or_default();
        let bytes = code.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'"' => i = skip_string(bytes, i),
                b'(' => parens += 1,
                b')' => parens -= 1,
                b'{' => {
                    braces += 1;
                    opened = true;
                }
                b'}' => {
                    braces -= 1;
                    if opened && braces == 0 {
                        return j;
                    }
                }
                b';' if !opened && braces == 0 && parens <= 0 => return j,
                _ => {}
            }
            i += 1;
        }

        if !opened {
            if j >= idx + MAX_HEADER_LINES {
                return idx;
            }
            if parens <= 0 && !header_continues(line.trim(), next_code_line(lines, j)) {
                return idx;
            }
        }
    }
    idx
}

/// Whether a balanced header line still leads into a body on a later line.
fn header_continues(line: &str, next: Option<&str>) -> bool {
    if line.ends_with(',') || line.ends_with("where") || line.ends_with("->") {
        return true;
    }
    next.is_some_and(|n| {
        n.starts_with('{')
            || n.starts_with(':')
            || n.starts_with("->")
            || n.starts_with("where")
            || n.starts_with("throws")
            || n.starts_with("extends")
            || n.starts_with("implements")
    })
}

fn next_code_line<'a>(lines: &[&'a str], j: usize) -> Option<&'a str> {
    lines[j + 1..]
        .iter()
        .map(|l| l.trim())
        .find(|l| !l.is_empty())
}

fn end_keyword_block_end(lines: &[&str], idx: usize) -> usize {
    let mut depth = 0i32;
    for (j, line) in lines.iter().enumerate().skip(idx) {
        let t = line.trim();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        let opens = i32::from(RUBY_OPEN_RE.is_match(t)) + i32::from(RUBY_DO_RE.is_match(t));
        let closes = RUBY_END_RE.find_iter(t).count() as i32;
        depth += opens - closes;
        if depth <= 0 {
            return j;
        }
    }
    idx
}

// ---------------------------------------------------------------------------
// Doc comments
// ---------------------------------------------------------------------------

/// Doc comment directly above the declaration at `idx`, skipping attribute
/// and annotation lines.
fn doc_comment(lines: &[&str], idx: usize, styles: &[DocStyle]) -> Option<String> {
    let mut k = idx;
    while k > 0 {
        let above = lines[k - 1].trim();
        if above.starts_with("#[") || (above.starts_with('@') && !above.starts_with("@end")) {
            k -= 1;
        } else {
            break;
        }
    }

    styles.iter().find_map(|style| match style {
        DocStyle::TripleSlash => line_comment_run(lines, k, "///", &["////"]),
        DocStyle::DoubleSlash => line_comment_run(lines, k, "//", &[]),
        DocStyle::Hash => line_comment_run(lines, k, "#", &["#!", "#["]),
        DocStyle::Block => block_comment(lines, k),
    })
}

/// Consecutive `prefix` lines ending just above line `k`.
fn line_comment_run(lines: &[&str], k: usize, prefix: &str, reject: &[&str]) -> Option<String> {
    let mut run: Vec<&str> = Vec::new();
    let mut j = k;
    while j > 0 {
        let t = lines[j - 1].trim();
        if reject.iter().any(|r| t.starts_with(r)) {
            break;
        }
        let Some(rest) = t.strip_prefix(prefix) else {
            break;
        };
        run.push(rest.strip_prefix(' ').unwrap_or(rest));
        j -= 1;
    }
    if run.is_empty() {
        return None;
    }
    run.reverse();
    let doc = clean_docstring(&run.join("\n"));
    (!doc.is_empty()).then_some(doc)
}

/// `/** ... */` block ending just above line `k`.
fn block_comment(lines: &[&str], k: usize) -> Option<String> {
    if k == 0 || !lines[k - 1].trim().ends_with("*/") {
        return None;
    }

    let mut block: Vec<&str> = Vec::new();
    let mut j = k - 1;
    loop {
        let t = lines[j].trim();
        block.push(t);
        if t.starts_with("/**") {
            break;
        }
        if t.starts_with("/*") || j == 0 {
            return None;
        }
        j -= 1;
    }
    block.reverse();

    let body: Vec<&str> = block
        .iter()
        .map(|l| {
            let l = l.strip_prefix("/**").unwrap_or(l);
            let l = l.strip_suffix("*/").unwrap_or(l).trim();
            let l = l.strip_prefix('*').unwrap_or(l);
            l.strip_prefix(' ').unwrap_or(l).trim_end()
        })
        .collect();
    let doc = clean_docstring(&body.join("\n"));
    (!doc.is_empty()).then_some(doc)
}

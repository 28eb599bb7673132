//! Deterministic Google-style docstrings used when no provider is available
//! or a provider call fails.

use codedoc_shared::{CodeElement, ElementKind};

/// Docstring body for a function. `self`/`cls` are never listed.
pub fn function_docstring<'a>(name: &str, args: impl IntoIterator<Item = &'a str>) -> String {
    let params: Vec<&str> = args
        .into_iter()
        .filter(|a| *a != "self" && *a != "cls")
        .collect();

    let mut doc = format!("{name}.");
    if !params.is_empty() {
        doc.push_str("\n\nArgs:");
        for param in params {
            doc.push_str("\n    ");
            doc.push_str(param);
            doc.push_str(": Description");
        }
    }
    doc.push_str("\n\nReturns:\n    Description of return value");
    doc
}

pub fn class_docstring(name: &str) -> String {
    format!("{name}.\n\nClass description.")
}

pub fn module_docstring(file_name: &str) -> String {
    format!("{file_name}\n\nModule description.\n")
}

/// Template for any parsed element.
pub fn element_docstring(element: &CodeElement) -> String {
    match element.kind {
        ElementKind::Function => {
            function_docstring(&element.name, element.args.iter().map(String::as_str))
        }
        ElementKind::Class => class_docstring(&element.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codedoc_shared::Language;

    #[test]
    fn function_with_params() {
        assert_eq!(
            function_docstring("add", ["self", "a", "b"]),
            "add.\n\nArgs:\n    a: Description\n    b: Description\n\nReturns:\n    Description of return value"
        );
    }

    #[test]
    fn function_without_params_omits_args() {
        assert_eq!(
            function_docstring("reset", ["cls"]),
            "reset.\n\nReturns:\n    Description of return value"
        );
    }

    #[test]
    fn class_and_element_dispatch() {
        let el = CodeElement::new("Parser", ElementKind::Class, Language::Python, "p.py", 1);
        assert_eq!(element_docstring(&el), "Parser.\n\nClass description.");
        assert_eq!(module_docstring("p.py"), "p.py\n\nModule description.\n");
    }
}

//! Prompt text sent to the providers.

use codedoc_shared::CodeElement;

/// System message for per-element docstring generation.
pub const SYSTEM_PROMPT: &str = "You are an expert code documentation assistant. \
Generate clear, concise, and helpful documentation.";

/// System message for whole-file annotation.
pub const FILE_SYSTEM_PROMPT: &str = "You are an expert Python developer. \
You add documentation to source files without changing their behavior.";

/// Build the user prompt for one element.
///
/// `context` holds the `Similar ...` lines from retrieval and may be empty.
pub fn documentation_prompt(element: &CodeElement, context: &[String]) -> String {
    let kind = element.kind.as_str();
    let existing = element
        .docstring
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or("None");
    let context = if context.is_empty() {
        "None".to_string()
    } else {
        context.join("\n")
    };

    format!(
        "Please generate comprehensive documentation for the following {kind}:\n\
         \n\
         {label} Name: {name}\n\
         File: {file}\n\
         Signature: {signature}\n\
         Arguments: {args}\n\
         Existing Documentation: {existing}\n\
         \n\
         Context from similar code elements:\n\
         {context}\n\
         \n\
         Please generate:\n\
         1. A clear docstring following the appropriate style guide\n\
         2. Brief explanation of purpose\n\
         3. Parameter descriptions (if applicable)\n\
         4. Return value description (if applicable)\n\
         5. Any important notes or examples\n\
         \n\
         Make the documentation consistent with the existing style in the codebase.\n\
         Return only the docstring text, without quotes or code fences.",
        label = capitalize(kind),
        name = element.qualified_name(),
        file = element.file_path,
        signature = element.signature,
        args = element.args.join(", "),
    )
}

/// Build the whole-file prompt used by `apply`.
pub fn file_prompt(content: &str) -> String {
    format!(
        "Please add comprehensive documentation to this Python code.\n\
         \n\
         Add:\n\
         1. Module docstring if missing\n\
         2. Class docstrings with Google style\n\
         3. Function docstrings with parameters, returns, and examples\n\
         4. Keep all existing code and functionality\n\
         \n\
         Return ONLY the complete Python code with documentation, no explanations.\n\
         \n\
         Code:\n\
         {content}"
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

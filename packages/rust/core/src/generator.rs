//! Documentation generator.
//!
//! For every element whose docstring is missing or weak, looks up similar
//! documented elements in the index, builds a prompt, and asks the provider
//! for a docstring. Provider output is cached by prompt hash in storage.
//! Provider calls run concurrently; storage is only touched from the
//! driving task.

use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use codedoc_llm::{Backend, Completion, CompletionProvider, CompletionRequest, clean_response};
use codedoc_shared::{
    CodeElement, ElementKind, GeneratedDoc, GeneratedDocs, ParsedCodebase, Result, RunId,
};
use codedoc_storage::Storage;

use crate::pipeline::ProgressReporter;
use crate::prompt::{SYSTEM_PROMPT, documentation_prompt};
use crate::template;

/// Phrases that mark a docstring as a placeholder.
const WEAK_PHRASES: [&str; 4] = ["todo", "implement", "add documentation", "..."];

/// Docstrings shorter than this are regenerated.
const MIN_DOC_CHARS: usize = 20;

/// Knobs for a generation run.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Similar elements added to each prompt.
    pub context_k: usize,
    /// Provider calls in flight at once.
    pub concurrency: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Read and write the generation cache.
    pub use_cache: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            context_k: 3,
            concurrency: 4,
            temperature: 0.3,
            max_tokens: 500,
            use_cache: true,
        }
    }
}

/// Usage counters for a generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationStats {
    pub cache_hits: usize,
    /// Provider calls that succeeded.
    pub cache_misses: usize,
    /// Provider calls that failed and fell back to templates.
    pub failures: usize,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Docs plus counters.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub docs: GeneratedDocs,
    pub stats: GenerationStats,
}

/// True when `doc` is missing, blank, short, or a placeholder.
pub fn needs_improvement(doc: Option<&str>) -> bool {
    let Some(doc) = doc else {
        return true;
    };
    let trimmed = doc.trim();
    if trimmed.is_empty() || trimmed == "None" {
        return true;
    }
    let lower = doc.to_lowercase();
    trimmed.chars().count() < MIN_DOC_CHARS || WEAK_PHRASES.iter().any(|p| lower.contains(p))
}

/// Cache key for a prompt.
pub fn prompt_hash(system: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(system.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A provider call waiting to be made.
struct PendingCall {
    slot: usize,
    hash: String,
    request: CompletionRequest,
}

/// Generate docstrings for every element of `parsed` that needs one.
///
/// Functions come first, then classes, each in parse order. Provider
/// failures never abort the run: the element gets the template docstring
/// and the error is recorded on it. The returned docs carry `run_id`.
#[instrument(skip_all, fields(backend = %backend.kind_name(), codebase_id = %codebase_id, run_id = %run_id))]
pub async fn generate_docstrings(
    parsed: &ParsedCodebase,
    backend: &Backend,
    storage: &Storage,
    codebase_id: &str,
    run_id: &RunId,
    opts: &GeneratorOptions,
    progress: &dyn ProgressReporter,
) -> Result<GenerationOutcome> {
    let targets: Vec<&CodeElement> = parsed
        .elements()
        .filter(|el| needs_improvement(el.docstring.as_deref()))
        .collect();
    let total = targets.len();
    let mut stats = GenerationStats::default();
    let mut slots: Vec<Option<GeneratedDoc>> = vec![None; total];

    info!(
        candidates = parsed.summary.total_functions + parsed.summary.total_classes,
        targets = total,
        "selecting elements for generation"
    );

    let provider = match backend {
        Backend::Template => {
            for (slot, el) in targets.iter().enumerate() {
                progress.task_progress(slot + 1, total, &el.qualified_name());
                slots[slot] = Some(template_doc(el, None));
            }
            return Ok(finish(run_id, slots, &targets, stats));
        }
        Backend::Llm(provider) => provider,
    };
    let provider_name = provider.name().to_string();
    let model = provider.model().to_string();

    // --- Retrieval, prompts, and cache lookups ---
    progress.phase("Retrieving context");
    let mut pending = Vec::new();
    for (slot, el) in targets.iter().enumerate() {
        let context = similar_context(storage, codebase_id, el, opts.context_k).await?;
        let prompt = documentation_prompt(el, &context);
        let hash = prompt_hash(SYSTEM_PROMPT, &prompt);

        if opts.use_cache {
            if let Some(cached) = storage
                .get_cached_generation(&provider_name, &model, &hash)
                .await?
            {
                stats.cache_hits += 1;
                slots[slot] = Some(GeneratedDoc {
                    element: (*el).clone(),
                    generated_doc: cached,
                    existing_doc: el.docstring.clone(),
                    source: provider_name.clone(),
                    model: Some(model.clone()),
                    cached: true,
                    error: None,
                });
                continue;
            }
        }

        pending.push(PendingCall {
            slot,
            hash,
            request: CompletionRequest {
                system: SYSTEM_PROMPT.to_string(),
                prompt,
                temperature: opts.temperature,
                max_tokens: opts.max_tokens,
            },
        });
    }

    // --- Provider calls ---
    progress.phase(&format!("Generating docs with {provider_name}"));
    let mut done = stats.cache_hits;
    let completions = run_calls(provider, &pending, opts.concurrency.max(1), |slot| {
        done += 1;
        progress.task_progress(done, total, &targets[slot].qualified_name());
    })
    .await;

    for (call, result) in pending.iter().zip(completions) {
        let el = targets[call.slot];
        let result = result.and_then(|c| {
            let text = clean_response(&c.text);
            if text.is_empty() {
                Err("provider returned an empty docstring".to_string())
            } else {
                Ok((text, c))
            }
        });

        match result {
            Ok((text, completion)) => {
                stats.cache_misses += 1;
                stats.tokens_in += completion.tokens_in;
                stats.tokens_out += completion.tokens_out;
                if opts.use_cache {
                    if let Err(e) = storage
                        .set_cached_generation(&provider_name, &model, &call.hash, &text)
                        .await
                    {
                        warn!(
                            element = %el.qualified_name(),
                            error = %e,
                            "failed to cache generation"
                        );
                    }
                }
                slots[call.slot] = Some(GeneratedDoc {
                    element: el.clone(),
                    generated_doc: text,
                    existing_doc: el.docstring.clone(),
                    source: provider_name.clone(),
                    model: Some(completion.model),
                    cached: false,
                    error: None,
                });
            }
            Err(message) => {
                stats.failures += 1;
                warn!(element = %el.qualified_name(), error = %message, "generation failed, using template");
                slots[call.slot] = Some(template_doc(el, Some(message)));
            }
        }
    }

    info!(
        cache_hits = stats.cache_hits,
        cache_misses = stats.cache_misses,
        failures = stats.failures,
        tokens_in = stats.tokens_in,
        tokens_out = stats.tokens_out,
        "generation complete"
    );

    Ok(finish(run_id, slots, &targets, stats))
}

/// Run every pending call with at most `limit` in flight.
///
/// Results come back in `pending` order; `on_done` fires as each finishes.
async fn run_calls(
    provider: &Arc<dyn CompletionProvider>,
    pending: &[PendingCall],
    limit: usize,
    mut on_done: impl FnMut(usize),
) -> Vec<std::result::Result<Completion, String>> {
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut set = JoinSet::new();

    for (index, call) in pending.iter().enumerate() {
        let provider = Arc::clone(provider);
        let semaphore = Arc::clone(&semaphore);
        let request = call.request.clone();
        set.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => provider.complete(&request).await.map_err(|e| e.to_string()),
                Err(e) => Err(format!("concurrency limiter closed: {e}")),
            };
            (index, result)
        });
    }

    let mut results: Vec<Option<std::result::Result<Completion, String>>> =
        (0..pending.len()).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => {
                on_done(pending[index].slot);
                results[index] = Some(result);
            }
            Err(e) => warn!(error = %e, "generation task aborted"),
        }
    }

    results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err("generation task aborted".to_string())))
        .collect()
}

/// Context lines from documented elements similar to `el`.
async fn similar_context(
    storage: &Storage,
    codebase_id: &str,
    el: &CodeElement,
    k: usize,
) -> Result<Vec<String>> {
    if k == 0 {
        return Ok(Vec::new());
    }
    let query = format!("{} {}", el.kind, el.name);
    // One extra so the element itself can be dropped.
    let hits = storage.search_documented(codebase_id, &query, k + 1).await?;

    let lines: Vec<String> = hits
        .into_iter()
        .filter(|h| !(h.file_path == el.file_path && h.line_start == el.line_start))
        .filter_map(|h| {
            let doc = h.docstring.filter(|d| !d.trim().is_empty())?;
            Some(format!("Similar {} '{}': {}", h.kind, h.name, doc))
        })
        .take(k)
        .collect();
    debug!(element = %el.qualified_name(), context = lines.len(), "retrieved context");
    Ok(lines)
}

fn template_doc(el: &CodeElement, error: Option<String>) -> GeneratedDoc {
    GeneratedDoc {
        element: el.clone(),
        generated_doc: template::element_docstring(el),
        existing_doc: el.docstring.clone(),
        source: "template".to_string(),
        model: None,
        cached: false,
        error,
    }
}

/// Split filled slots into functions and classes, keeping order.
fn finish(
    run_id: &RunId,
    slots: Vec<Option<GeneratedDoc>>,
    targets: &[&CodeElement],
    stats: GenerationStats,
) -> GenerationOutcome {
    let mut docs = GeneratedDocs::new(run_id.clone());
    for (slot, el) in slots.into_iter().zip(targets) {
        let doc = slot.unwrap_or_else(|| template_doc(el, Some("no result".into())));
        match doc.element.kind {
            ElementKind::Function => docs.functions.push(doc),
            ElementKind::Class => docs.classes.push(doc),
        }
    }
    GenerationOutcome { docs, stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use async_trait::async_trait;
    use codedoc_llm::ModelInfo;
    use codedoc_shared::{CodeDocError, Language, SourceFile};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the element name back; fails for names listed in `fail`.
    struct MockProvider {
        calls: AtomicUsize,
        fail: Vec<&'static str>,
    }

    impl MockProvider {
        fn new(fail: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for MockProvider {
        fn name(&self) -> &str {
            "openai"
        }

        fn model(&self) -> &str {
            "mock-model"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = request
                .prompt
                .lines()
                .find_map(|l| l.split_once(" Name: ").map(|(_, n)| n.to_string()))
                .unwrap_or_default();
            if self.fail.contains(&name.as_str()) {
                return Err(CodeDocError::provider("openai", "API returned 400"));
            }
            Ok(Completion {
                text: format!("```\n\"\"\"Generated docs for {name}.\"\"\"\n```"),
                tokens_in: 10,
                tokens_out: 5,
                model: "mock-model".into(),
                latency_ms: 1,
            })
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            Ok(Vec::new())
        }
    }

    fn temp_db() -> PathBuf {
        std::env::temp_dir()
            .join(format!("codedoc-generator-test-{}", uuid::Uuid::now_v7()))
            .join("codedoc.db")
    }

    fn function(name: &str, line: usize, doc: Option<&str>) -> CodeElement {
        let mut el = CodeElement::new(name, ElementKind::Function, Language::Python, "app.py", line);
        el.args = vec!["value".into()];
        el.docstring = doc.map(String::from);
        el
    }

    fn codebase() -> ParsedCodebase {
        let documented = function(
            "parse_value",
            1,
            Some("Parse a raw value into a typed configuration entry."),
        );
        let mut class = CodeElement::new("ValueStore", ElementKind::Class, Language::Python, "app.py", 20);
        class.docstring = Some("TODO".into());
        ParsedCodebase::new(
            PathBuf::from("."),
            vec![SourceFile {
                path: "app.py".into(),
                name: "app.py".into(),
                language: Language::Python,
                size: 0,
                line_count: 30,
                content: String::new(),
                functions: vec![
                    documented,
                    function("store_value", 8, None),
                    function("load_value", 14, Some("Load.")),
                ],
                classes: vec![class],
                imports: vec![],
            }],
        )
    }

    async fn indexed_storage(parsed: &ParsedCodebase) -> (Storage, String) {
        let storage = Storage::open(&temp_db()).await.unwrap();
        let id = storage.upsert_codebase(&parsed.root).await.unwrap();
        let elements: Vec<CodeElement> = parsed.elements().cloned().collect();
        storage.index_elements(&id, &elements).await.unwrap();
        (storage, id)
    }

    #[test]
    fn needs_improvement_thresholds() {
        assert!(needs_improvement(None));
        assert!(needs_improvement(Some("   ")));
        assert!(needs_improvement(Some("None")));
        assert!(needs_improvement(Some("Short doc.")));
        assert!(needs_improvement(Some("TODO: describe the parser in detail")));
        assert!(needs_improvement(Some("Will implement caching here later on")));
        assert!(needs_improvement(Some("Does many things, see below...")));
        assert!(!needs_improvement(Some("Parse a raw value into an entry.")));
    }

    #[test]
    fn prompt_hash_is_stable_and_sensitive() {
        assert_eq!(prompt_hash("s", "p"), prompt_hash("s", "p"));
        assert_ne!(prompt_hash("s", "p"), prompt_hash("s", "q"));
        assert_ne!(prompt_hash("sp", ""), prompt_hash("s", "p"));
        assert_eq!(prompt_hash("s", "p").len(), 64);
    }

    #[tokio::test]
    async fn template_backend_needs_no_provider() {
        let parsed = codebase();
        let (storage, id) = indexed_storage(&parsed).await;

        let outcome = generate_docstrings(
            &parsed,
            &Backend::Template,
            &storage,
            &id,
            &RunId::new(),
            &GeneratorOptions::default(),
            &SilentProgress,
        )
        .await
        .unwrap();

        let names: Vec<_> = outcome.docs.functions.iter().map(|d| d.element.name.as_str()).collect();
        assert_eq!(names, vec!["store_value", "load_value"]);
        assert_eq!(outcome.docs.classes.len(), 1);
        assert!(outcome.docs.iter().all(|d| d.source == "template"));
        assert_eq!(
            outcome.docs.functions[0].generated_doc,
            "store_value.\n\nArgs:\n    value: Description\n\nReturns:\n    Description of return value"
        );
        assert_eq!(outcome.stats, GenerationStats::default());
    }

    #[tokio::test]
    async fn provider_output_is_cleaned_and_cached() {
        let parsed = codebase();
        let (storage, id) = indexed_storage(&parsed).await;
        let mock = MockProvider::new(vec![]);
        let backend = Backend::Llm(mock.clone());
        let opts = GeneratorOptions::default();

        let first = generate_docstrings(
            &parsed,
            &backend,
            &storage,
            &id,
            &RunId::new(),
            &opts,
            &SilentProgress,
        )
            .await
            .unwrap();
        assert_eq!(mock.calls.load(Ordering::SeqCst), 3);
        assert_eq!(first.stats.cache_misses, 3);
        assert_eq!(first.stats.tokens_in, 30);
        assert_eq!(
            first.docs.functions[0].generated_doc,
            "Generated docs for store_value."
        );
        assert_eq!(first.docs.classes[0].element.name, "ValueStore");
        assert_eq!(first.docs.classes[0].model.as_deref(), Some("mock-model"));

        let second = generate_docstrings(
            &parsed,
            &backend,
            &storage,
            &id,
            &RunId::new(),
            &opts,
            &SilentProgress,
        )
            .await
            .unwrap();
        assert_eq!(mock.calls.load(Ordering::SeqCst), 3);
        assert_eq!(second.stats.cache_hits, 3);
        assert!(second.docs.iter().all(|d| d.cached));
        assert_eq!(
            second.docs.functions[1].generated_doc,
            first.docs.functions[1].generated_doc
        );
    }

    #[tokio::test]
    async fn no_cache_always_calls_provider() {
        let parsed = codebase();
        let (storage, id) = indexed_storage(&parsed).await;
        let mock = MockProvider::new(vec![]);
        let backend = Backend::Llm(mock.clone());
        let opts = GeneratorOptions {
            use_cache: false,
            concurrency: 1,
            ..Default::default()
        };

        for _ in 0..2 {
            generate_docstrings(
                &parsed,
                &backend,
                &storage,
                &id,
                &RunId::new(),
                &opts,
                &SilentProgress,
            )
                .await
                .unwrap();
        }
        assert_eq!(mock.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn provider_failure_falls_back_per_element() {
        let parsed = codebase();
        let (storage, id) = indexed_storage(&parsed).await;
        let backend = Backend::Llm(MockProvider::new(vec!["load_value"]));

        let outcome = generate_docstrings(
            &parsed,
            &backend,
            &storage,
            &id,
            &RunId::new(),
            &GeneratorOptions::default(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(outcome.stats.failures, 1);
        assert_eq!(outcome.stats.cache_misses, 2);
        let failed = &outcome.docs.functions[1];
        assert_eq!(failed.element.name, "load_value");
        assert_eq!(failed.source, "template");
        assert_eq!(failed.existing_doc.as_deref(), Some("Load."));
        assert!(failed.error.as_deref().unwrap().contains("400"));
        assert!(failed.generated_doc.starts_with("load_value."));
        assert_eq!(outcome.docs.functions[0].source, "openai");
    }

    #[tokio::test]
    async fn context_excludes_the_element_itself() {
        let parsed = codebase();
        let (storage, id) = indexed_storage(&parsed).await;
        let target = &parsed.files[0].functions[1];

        let lines = similar_context(&storage, &id, target, 3).await.unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines.contains(
            &"Similar function 'parse_value': Parse a raw value into a typed configuration entry."
                .to_string()
        ));
        assert!(lines.iter().all(|l| !l.contains("'store_value'")));

        assert_eq!(similar_context(&storage, &id, target, 1).await.unwrap().len(), 1);
        assert!(similar_context(&storage, &id, target, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outcome_carries_the_callers_run_id() {
        let parsed = codebase();
        let (storage, id) = indexed_storage(&parsed).await;
        let run_id = RunId::new();

        let outcome = generate_docstrings(
            &parsed,
            &Backend::Template,
            &storage,
            &id,
            &run_id,
            &GeneratorOptions::default(),
            &SilentProgress,
        )
        .await
        .unwrap();
        assert_eq!(outcome.docs.run_id, run_id);
    }

    #[tokio::test]
    async fn context_reaches_documented_elements_behind_undocumented_ones() {
        let mut functions: Vec<CodeElement> = (0..6)
            .map(|i| function(&format!("fetch_value_{i}"), 10 + i * 5, None))
            .collect();
        functions.push(function(
            "fetch_record",
            60,
            Some("Fetch a single record from the backing store."),
        ));
        let parsed = ParsedCodebase::new(
            PathBuf::from("."),
            vec![SourceFile {
                path: "app.py".into(),
                name: "app.py".into(),
                language: Language::Python,
                size: 0,
                line_count: 80,
                content: String::new(),
                functions,
                classes: vec![],
                imports: vec![],
            }],
        );
        let (storage, id) = indexed_storage(&parsed).await;
        let target = &parsed.files[0].functions[0];

        let lines = similar_context(&storage, &id, target, 2).await.unwrap();
        assert_eq!(
            lines,
            vec!["Similar function 'fetch_record': Fetch a single record from the backing store."]
        );
    }

    #[tokio::test]
    async fn cache_write_failure_keeps_generated_docs() {
        let parsed = codebase();
        let path = temp_db();
        {
            let storage = Storage::open(&path).await.unwrap();
            let id = storage.upsert_codebase(&parsed.root).await.unwrap();
            let elements: Vec<CodeElement> = parsed.elements().cloned().collect();
            storage.index_elements(&id, &elements).await.unwrap();
        }
        let storage = Storage::open_readonly(&path).await.unwrap();
        let id = codedoc_storage::codebase_id_for(&parsed.root);
        let mock = MockProvider::new(vec![]);

        let outcome = generate_docstrings(
            &parsed,
            &Backend::Llm(mock.clone()),
            &storage,
            &id,
            &RunId::new(),
            &GeneratorOptions::default(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(mock.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.stats.failures, 0);
        assert!(outcome.docs.iter().all(|d| d.source == "openai" && !d.cached));
    }
}

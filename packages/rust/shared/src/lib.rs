//! Shared types, error model, and configuration for codedoc.
//!
//! This crate is the foundation depended on by all other codedoc crates.
//! It provides:
//! - [`CodeDocError`], the unified error type
//! - Domain types ([`CodeElement`], [`SourceFile`], [`ParsedCodebase`],
//!   [`GeneratedDocs`], [`ConsistencyReport`], [`RunId`])
//! - Configuration ([`AppConfig`], [`ScanOptions`], config and `.env` loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, GeminiConfig, GenerationConfig, OpenAiConfig, ProviderChoice,
    ProviderKind, ScanConfig, ScanOptions, config_dir, config_file_path, init_config,
    load_config, load_config_from, load_dotenv, resolve_api_key,
};
pub use error::{CodeDocError, Result};
pub use types::{
    CodeElement, CodebaseSummary, ConsistencyReport, CoverageStats, DocDelimiter, ElementKind,
    GeneratedDoc, GeneratedDocs, ImportInfo, Language, ParsedCodebase, RunId, SourceFile,
};

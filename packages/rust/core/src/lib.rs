//! Core pipeline orchestration and domain logic for codedoc.
//!
//! This crate ties together parsing, retrieval, generation, and consistency
//! checking into the `generate`, `analyze`, and `apply` workflows, plus
//! run history and cache housekeeping.

pub mod apply;
pub mod consistency;
pub mod generator;
pub mod pipeline;
pub mod prompt;
pub mod template;

pub use apply::{ApplyMethod, Preview};
pub use generator::{GenerationStats, GeneratorOptions};
pub use pipeline::{
    ApplyConfig, ApplyResult, FileOutcome, GenerateConfig, GenerateResult, ProgressReporter,
    RunHistory, SilentProgress,
};

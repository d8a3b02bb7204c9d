/*!
 * Markdown translation through an AI provider.
 *
 * - `chunking`: line-aligned splitting of long documents
 * - `prompts`: system and user prompt construction
 * - `classify`: provider errors to user-facing messages
 * - `core`: single-document translation
 * - `orchestrator`: per-task fan-out over languages and files
 */

pub use self::core::Translator;
pub use self::orchestrator::{PairFailure, RunSummary, SourceFile, TranslationOrchestrator};

pub mod chunking;
pub mod classify;
pub mod core;
pub mod orchestrator;
pub mod prompts;

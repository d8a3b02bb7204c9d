/*!
 * # docglot - translated documentation mirrors for GitHub repositories
 *
 * A Rust library that keeps `translations/{lang}/` copies of a repository's
 * Markdown documentation in sync using an LLM.
 *
 * ## Features
 *
 * - GitHub App authentication with cached installation tokens
 * - Incremental change detection, with full rescans after a force push
 * - Translation through OpenAI-compatible providers:
 *   - OpenRouter
 *   - DeepSeek
 *   - Doubao
 *   - Qwen
 *   - any custom endpoint
 * - Chunked translation of long documents
 * - Persistent task tracking in SQLite
 * - Branch, commit and pull request creation with a translation table in the README
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `app_controller`: Task lifecycle and scheduled polling
 * - `github`: Credentials and the repository contents client
 * - `detection`: Change detection and ignore rules
 * - `translation`: Chunking, prompts and the per-task orchestrator
 * - `publish`: Destination paths, messages, index table and batch commits
 * - `database`: SQLite store for repositories, tasks and results
 * - `providers`: LLM provider clients
 * - `language_utils`: ISO language code utilities
 * - `clock`: Injectable time source
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod clock;
pub mod database;
pub mod detection;
pub mod errors;
pub mod github;
pub mod language_utils;
pub mod providers;
pub mod publish;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{Controller, CreateOutcome, CreateTaskRequest, PollOutcome};
pub use database::Store;
pub use language_utils::{get_language_name, language_codes_match, validate_language_code};
pub use errors::{CredentialError, DetectionError, PlatformError, ProviderError};

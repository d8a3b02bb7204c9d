/*!
 * Prompt construction for document translation.
 */

pub mod templates;

pub use templates::{PromptTemplate, TranslationPromptBuilder};

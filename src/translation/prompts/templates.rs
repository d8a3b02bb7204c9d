/*!
 * Prompt templates for Markdown document translation.
 *
 * The system prompt fixes the rules (keep structure, code and links intact,
 * answer with the translation only); the user prompt carries the source
 * text between `---` fences.
 */

use crate::language_utils::get_language_name;
use crate::providers::ChatMessage;

/// System prompt template for document translation.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// The default system prompt for Markdown translation.
    pub const MARKDOWN_TRANSLATOR: &'static str = r#"You are a professional technical documentation translator working from {source_language} into {target_language}.

## Rules
- Keep the Markdown structure exactly: headings, lists, tables, block quotes and emphasis
- Do not translate anything inside code blocks or inline code
- Keep URLs, link targets, image paths and HTML tags unchanged
- Keep technical identifiers, product names and command names as written
- Translate only the natural-language prose

## Output
- Return only the translated document
- Do not add explanations, notes or surrounding fences"#;

    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    pub fn markdown_translator() -> Self {
        Self::new(Self::MARKDOWN_TRANSLATOR)
    }

    /// Render the template with the given variables.
    pub fn render(&self, source_language: &str, target_language: &str) -> String {
        self.template
            .replace("{source_language}", source_language)
            .replace("{target_language}", target_language)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::markdown_translator()
    }
}

/// Builds the system/user message pair for one document or chunk.
#[derive(Debug, Clone)]
pub struct TranslationPromptBuilder {
    source_language: String,
    target_language: String,
    template: PromptTemplate,
}

impl TranslationPromptBuilder {
    /// Languages are given as codes and rendered as names.
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: get_language_name(source_language),
            target_language: get_language_name(target_language),
            template: PromptTemplate::default(),
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn build_system_prompt(&self) -> String {
        self.template
            .render(&self.source_language, &self.target_language)
    }

    pub fn build_user_prompt(&self, content: &str) -> String {
        format!(
            "Translate the following Markdown document from {} to {}.\n\nSource content:\n---\n{}\n---\n\nTranslated content:",
            self.source_language, self.target_language, content
        )
    }

    pub fn build_messages(&self, content: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.build_system_prompt()),
            ChatMessage::user(self.build_user_prompt(content)),
        ]
    }
}

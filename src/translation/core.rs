/*!
 * Core document translation.
 *
 * `Translator` turns one Markdown document into one target language. Short
 * documents go to the provider in a single request; longer ones are split
 * on line boundaries, translated chunk by chunk with no shared context,
 * and joined with a blank line.
 */

use std::sync::Arc;

use log::debug;

use super::chunking::{DEFAULT_MAX_CHUNK_CHARS, chunk_content, merge_chunks};
use super::prompts::TranslationPromptBuilder;
use crate::errors::ProviderError;
use crate::providers::Provider;

#[derive(Debug, Clone)]
pub struct Translator {
    provider: Arc<dyn Provider>,
    max_chunk_chars: usize,
}

impl Translator {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }

    pub fn with_max_chunk_chars(mut self, max_chunk_chars: usize) -> Self {
        self.max_chunk_chars = max_chunk_chars.max(1);
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Translate `content` in a single request
    ///
    /// Blank content is returned as is without calling the provider.
    pub async fn translate(
        &self,
        content: &str,
        target_language: &str,
        source_language: &str,
    ) -> Result<String, ProviderError> {
        if content.trim().is_empty() {
            return Ok(content.to_string());
        }

        let messages =
            TranslationPromptBuilder::new(source_language, target_language).build_messages(content);
        let reply = self.provider.chat(messages).await?;
        Ok(reply.trim().to_string())
    }

    /// Translate `content`, chunking it when it exceeds the chunk limit
    ///
    /// Chunks are sent in order; the first failing chunk fails the document.
    pub async fn translate_large(
        &self,
        content: &str,
        target_language: &str,
        source_language: &str,
    ) -> Result<String, ProviderError> {
        let chunks = chunk_content(content, self.max_chunk_chars);
        if chunks.len() <= 1 {
            return self.translate(content, target_language, source_language).await;
        }

        debug!(
            "Translating {} chunks into {} with {}",
            chunks.len(),
            target_language,
            self.provider.model()
        );

        let mut translated = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            translated.push(self.translate(chunk, target_language, source_language).await?);
        }
        Ok(merge_chunks(&translated))
    }
}

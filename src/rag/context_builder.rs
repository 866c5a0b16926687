//! Renders a retrieval bundle as citation-formatted context for the
//! generation layer.

use serde::{Deserialize, Serialize};

use super::types::{Origin, Passage, RetrievalBundle};

pub const NO_SOURCES_NOTICE: &str = "No relevant sources found for this query.";

/// Per-block allowance for the header and locator lines.
const BLOCK_OVERHEAD: usize = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextBuilderConfig {
    /// Maximum total context length in characters
    pub max_context_chars: usize,
    /// Whether to include source headers and locators
    pub include_citations: bool,
}

impl Default for ContextBuilderConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 6000,
            include_citations: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: ContextBuilderConfig,
}

impl ContextBuilder {
    pub fn new(config: ContextBuilderConfig) -> Self {
        Self { config }
    }

    /// Formats passages in bundle order until the character budget is spent.
    /// The first passage is always included, cut to fit if necessary.
    pub fn render(&self, bundle: &RetrievalBundle, query: &str) -> String {
        if bundle.passages.is_empty() {
            return NO_SOURCES_NOTICE.to_string();
        }

        let mut context = String::new();
        if self.config.include_citations {
            context.push_str(&format!("Sources for: {}\n\n", query.trim()));
        }

        for (i, passage) in bundle.passages.iter().enumerate() {
            let used = context.chars().count();
            let room = self.config.max_context_chars.saturating_sub(used);
            let needed = passage.text.chars().count() + BLOCK_OVERHEAD;

            let text = if needed <= room {
                passage.text.clone()
            } else if i == 0 {
                cut(&passage.text, room.saturating_sub(BLOCK_OVERHEAD))
            } else {
                break;
            };

            if self.config.include_citations {
                context.push_str(&self.block(i + 1, passage, &text));
            } else {
                context.push_str(&text);
                context.push_str("\n\n");
            }
        }

        context.trim_end().to_string()
    }

    fn block(&self, number: usize, passage: &Passage, text: &str) -> String {
        let document = &passage.document;
        let origin = match document.origin {
            Origin::Local => "LOCAL",
            Origin::Web => "WEB",
        };
        let mut block = format!(
            "SOURCE {} [{}/{}] (relevance {:.2})\nTitle: {}\n",
            number,
            origin,
            document.authority_tier.as_str().to_uppercase(),
            passage.relevance_score,
            document.title
        );
        if let Some(author) = &document.author {
            block.push_str(&format!("Author: {}\n", author));
        }
        block.push_str(&format!("Content: {}\n", text));
        let label = match document.origin {
            Origin::Local => "File",
            Origin::Web => "URL",
        };
        block.push_str(&format!("{}: {}\n\n", label, document.locator));
        block
    }
}

fn cut(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

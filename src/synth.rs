//! Answer synthesis by tree summarization.
//!
//! Retrieved chunks are packed into groups that fit one model context. A
//! single group is answered directly. Otherwise every group produces a
//! partial answer and the partial answers are packed and answered again,
//! round after round, until one group is left.

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::debug;

use crate::llm::ChatModel;
use crate::models::RetrievalResult;

const SEPARATOR: &str = "\n\n---------------------\n\n";

pub struct TreeSummarizer {
    model: Arc<dyn ChatModel>,
    max_context_chars: usize,
    system_prompt: String,
}

impl TreeSummarizer {
    pub fn new(model: Arc<dyn ChatModel>, max_context_chars: usize, system_prompt: &str) -> Self {
        Self {
            model,
            max_context_chars,
            system_prompt: system_prompt.to_string(),
        }
    }

    /// Answer `question` from the retrieved chunks.
    ///
    /// Fails on an empty result, on any model error, and on a blank reply.
    pub async fn synthesize(&self, question: &str, result: &RetrievalResult) -> Result<String> {
        if result.is_empty() {
            bail!("No context retrieved for the question");
        }

        let limit = self.text_limit();
        let mut texts: Vec<String> = result
            .iter()
            .map(|s| truncate_chars(&s.chunk.text, limit))
            .collect();
        let mut round = 0;

        loop {
            let groups = pack(&texts, self.max_context_chars);
            debug!(round, texts = texts.len(), groups = groups.len(), "tree summarize round");

            if groups.len() == 1 {
                return self.answer(question, &groups[0]).await;
            }

            let mut partials = Vec::with_capacity(groups.len());
            for group in &groups {
                let partial = self.answer(question, group).await?;
                partials.push(truncate_chars(&partial, limit));
            }
            texts = partials;
            round += 1;
        }
    }

    /// Per-text cap guaranteeing that any two texts fit in one group.
    fn text_limit(&self) -> usize {
        (self.max_context_chars.saturating_sub(SEPARATOR.len()) / 2).max(1)
    }

    async fn answer(&self, question: &str, context: &str) -> Result<String> {
        let prompt = build_prompt(question, context);
        let reply = self.model.chat(&self.system_prompt, &prompt).await?;
        if reply.trim().is_empty() {
            bail!("Model '{}' returned an empty answer", self.model.model_name());
        }
        Ok(reply)
    }
}

fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "Context information from multiple sources is below.\n\
         ---------------------\n\
         {}\n\
         ---------------------\n\
         Given the information from multiple sources and not prior knowledge, answer the query.\n\
         Query: {}\n\
         Answer: ",
        context, question
    )
}

/// Greedily join consecutive texts into groups of at most `budget` chars.
///
/// A text longer than the budget forms a group on its own.
fn pack(texts: &[String], budget: usize) -> Vec<String> {
    let sep_len = SEPARATOR.chars().count();
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for text in texts {
        let len = text.chars().count();
        if current_len > 0 && current_len + sep_len + len > budget {
            groups.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push_str(SEPARATOR);
            current_len += sep_len;
        }
        current.push_str(text);
        current_len += len;
    }
    if current_len > 0 || groups.is_empty() {
        groups.push(current);
    }
    groups
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}

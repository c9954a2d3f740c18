//! The E-Cris assistant: question in, answer string out.
//!
//! Answering walks a fixed ladder of tiers:
//!
//! | Tier | Attempt | Result on success |
//! |------|---------|-------------------|
//! | [`Tier::Rag`] | retrieve + tree-summarize | [`Outcome::Success`] |
//! | [`Tier::DirectPrimary`] | raw question to the primary model | [`Outcome::Degraded`] |
//! | [`Tier::DirectFallback`] | raw question to the fallback model | [`Outcome::Degraded`] |
//! | [`Tier::Failed`] | none | [`Outcome::Failed`] (apology) |
//!
//! Any failure of a tier (no relevant chunks, an embedding or model error,
//! a blank reply, or the tier timeout) moves to the next one. The ladder is
//! encoded by the pure [`step`] function; [`Assistant::answer`] only runs
//! attempts and feeds their results to it.

use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{AssistantConfig, Config};
use crate::embedding;
use crate::llm::{self, ChatModel};
use crate::retrieve::{self, Retriever};
use crate::synth::TreeSummarizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Rag,
    DirectPrimary,
    DirectFallback,
    Failed,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Rag => "rag",
            Tier::DirectPrimary => "direct_primary",
            Tier::DirectFallback => "direct_fallback",
            Tier::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of answering one question.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Answered from the reference documents.
    Success(String),
    /// Answered by a direct model call without document context.
    Degraded { text: String, tier: Tier },
    /// Every tier failed.
    Failed,
}

impl Outcome {
    pub fn tier(&self) -> Tier {
        match self {
            Outcome::Success(_) => Tier::Rag,
            Outcome::Degraded { tier, .. } => *tier,
            Outcome::Failed => Tier::Failed,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Outcome::Success(text) | Outcome::Degraded { text, .. } => Some(text),
            Outcome::Failed => None,
        }
    }
}

/// What to do after an attempt at some tier.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Done(Outcome),
    Next(Tier),
}

/// Transition of the fallback ladder.
///
/// `attempt` is the text produced by the tier, or `None` if it failed.
/// Blank text counts as a failure.
pub fn step(tier: Tier, attempt: Option<String>) -> Step {
    let text = attempt.filter(|t| !t.trim().is_empty());
    match (tier, text) {
        (Tier::Rag, Some(text)) => Step::Done(Outcome::Success(text)),
        (Tier::Rag, None) => Step::Next(Tier::DirectPrimary),
        (Tier::DirectPrimary, Some(text)) => Step::Done(Outcome::Degraded {
            text,
            tier: Tier::DirectPrimary,
        }),
        (Tier::DirectPrimary, None) => Step::Next(Tier::DirectFallback),
        (Tier::DirectFallback, Some(text)) => Step::Done(Outcome::Degraded {
            text,
            tier: Tier::DirectFallback,
        }),
        (Tier::DirectFallback, None) | (Tier::Failed, _) => Step::Done(Outcome::Failed),
    }
}

/// The user-facing answer plus the tier that produced it.
///
/// `tier` is `None` when no tier ran (blank question).
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub answer: String,
    pub tier: Option<Tier>,
}

pub struct Assistant {
    retriever: Retriever,
    synthesizer: TreeSummarizer,
    primary: Arc<dyn ChatModel>,
    fallback: Arc<dyn ChatModel>,
    settings: AssistantConfig,
}

impl Assistant {
    /// Assemble an assistant from its collaborators. Synthesis uses the
    /// primary model.
    pub fn new(
        retriever: Retriever,
        primary: Arc<dyn ChatModel>,
        fallback: Arc<dyn ChatModel>,
        settings: AssistantConfig,
        max_context_chars: usize,
    ) -> Self {
        let synthesizer =
            TreeSummarizer::new(primary.clone(), max_context_chars, &settings.system_prompt);
        Self {
            retriever,
            synthesizer,
            primary,
            fallback,
            settings,
        }
    }

    /// Open the configured index and connect the configured services.
    ///
    /// Fails if the index is missing or was built with an embedder of a
    /// different dimensionality.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = embedding::create_embedder(&config.embedding)?;
        let index = retrieve::open_index(config, embedder.as_ref()).await?;
        let retriever = Retriever::new(
            embedder,
            Arc::new(index),
            config.retrieval.top_k,
            config.retrieval.similarity_threshold,
        );
        let (primary, fallback) = llm::create_chat_models(&config.llm)?;

        Ok(Self::new(
            retriever,
            primary,
            fallback,
            config.assistant.clone(),
            config.synthesis.max_context_chars,
        ))
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer a question. Never fails and never returns an empty string.
    pub async fn ask(&self, question: &str) -> String {
        self.reply(question).await.answer
    }

    pub async fn reply(&self, question: &str) -> Reply {
        if question.trim().is_empty() {
            return Reply {
                answer: self.settings.empty_question_reply.clone(),
                tier: None,
            };
        }

        let outcome = self.answer(question).await;
        let tier = outcome.tier();
        let answer = match outcome {
            Outcome::Success(text) | Outcome::Degraded { text, .. } => text,
            Outcome::Failed => self.settings.apology.clone(),
        };
        Reply {
            answer,
            tier: Some(tier),
        }
    }

    /// Walk the tier ladder for `question` and report how it ended.
    pub async fn answer(&self, question: &str) -> Outcome {
        let budget = Duration::from_secs(self.settings.tier_timeout_secs);
        let mut tier = Tier::Rag;

        loop {
            let attempt = match tokio::time::timeout(budget, self.attempt(tier, question)).await {
                Ok(Ok(text)) => Some(text),
                Ok(Err(e)) => {
                    warn!(tier = %tier, error = %e, "answer tier failed");
                    None
                }
                Err(_) => {
                    warn!(tier = %tier, timeout_secs = budget.as_secs(), "answer tier timed out");
                    None
                }
            };

            match step(tier, attempt) {
                Step::Done(outcome) => {
                    match &outcome {
                        Outcome::Failed => error!("all answer tiers failed"),
                        other => info!(tier = %other.tier(), "question answered"),
                    }
                    return outcome;
                }
                Step::Next(next) => tier = next,
            }
        }
    }

    async fn attempt(&self, tier: Tier, question: &str) -> Result<String> {
        match tier {
            Tier::Rag => {
                let result = self.retriever.retrieve_text(question).await?;
                if result.is_empty() {
                    bail!("no chunk scored above the similarity threshold");
                }
                self.synthesizer.synthesize(question, &result).await
            }
            Tier::DirectPrimary => Ok(self
                .primary
                .chat(&self.settings.system_prompt, question)
                .await?),
            Tier::DirectFallback => Ok(self
                .fallback
                .chat(&self.settings.system_prompt, question)
                .await?),
            Tier::Failed => bail!("no tier left"),
        }
    }
}

/// CLI entry point for `ecris ask`.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let assistant = Assistant::from_config(config).await?;
    let reply = assistant.reply(question).await;
    if let Some(tier) = reply.tier {
        info!(tier = %tier, "answer tier");
    }
    println!("{}", reply.answer);
    Ok(())
}

//! Deterministic stand-ins for the embedding and chat services.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ecris::embedding::Embedder;
use ecris::llm::{ChatModel, LlmError};

/// Bag-of-words embedding: each lowercase word adds one to a hashed bucket.
///
/// Texts sharing words get a positive cosine similarity; texts sharing no
/// words (and no bucket collisions) score zero.
pub fn hash_embed(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for b in word.to_lowercase().bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(0x0100_0000_01b3);
        }
        v[(h % dims as u64) as usize] += 1.0;
    }
    v
}

pub struct HashEmbedder {
    pub dims: usize,
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embed(t, self.dims)).collect())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }
    fn dims(&self) -> usize {
        64
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("embedding service unavailable")
    }
}

enum Behaviour {
    Reply(String),
    EchoPrompt,
    Fail,
    FailFirst(usize, String),
    Stall,
}

/// A chat model with a fixed behaviour that counts its calls.
pub struct ScriptedChat {
    name: String,
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl ScriptedChat {
    fn new(name: &str, behaviour: Behaviour) -> Self {
        Self {
            name: name.to_string(),
            behaviour,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always replies with `text`.
    pub fn replying(name: &str, text: &str) -> Self {
        Self::new(name, Behaviour::Reply(text.to_string()))
    }

    /// Replies with the user prompt it received, so answers built from
    /// retrieved context contain that context.
    pub fn echoing(name: &str) -> Self {
        Self::new(name, Behaviour::EchoPrompt)
    }

    /// Always fails as if the credential were rejected.
    pub fn failing(name: &str) -> Self {
        Self::new(name, Behaviour::Fail)
    }

    /// Fails its first `failures` calls, then replies with `text`.
    pub fn failing_then(name: &str, failures: usize, text: &str) -> Self {
        Self::new(name, Behaviour::FailFirst(failures, text.to_string()))
    }

    /// Never answers within any reasonable timeout.
    pub fn stalling(name: &str) -> Self {
        Self::new(name, Behaviour::Stall)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, _system: &str, user: &str) -> Result<String, LlmError> {
        let previous = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Reply(text) => Ok(text.clone()),
            Behaviour::FailFirst(failures, text) if previous >= *failures => Ok(text.clone()),
            Behaviour::FailFirst(..) => Err(LlmError::Network {
                message: "connection reset".to_string(),
            }),
            Behaviour::EchoPrompt => Ok(user.to_string()),
            Behaviour::Fail => Err(LlmError::Api {
                status: 401,
                message: "Invalid API Key".to_string(),
            }),
            Behaviour::Stall => {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Err(LlmError::EmptyReply)
            }
        }
    }
}

//! End-to-end behaviour of the library pipeline with deterministic fakes:
//! build → retrieve → synthesize → tier fallback.

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use common::{FailingEmbedder, HashEmbedder, ScriptedChat};
use ecris::assistant::{Assistant, Outcome, Tier};
use ecris::config::{Config, EmbeddingConfig, LlmConfig};
use ecris::embedding::{self, Embedder};
use ecris::index::{SqliteIndex, VectorIndex};
use ecris::ingest;
use ecris::llm;
use ecris::progress::NoProgress;
use ecris::retrieve::{self, Retriever};
use tempfile::TempDir;

const DIMS: usize = 64;
const CRISIS_DOC: &str = "Crisis Doc A. Always respond within 1 hour to a crisis.";
const QUESTION: &str = "How quickly should we respond to a crisis?";

fn write_doc(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

fn config_for(dir: &TempDir, docs: Vec<PathBuf>) -> Config {
    let mut config = Config::with_index(dir.path().join("data").join("ecris.sqlite"));
    config.documents.paths = docs;
    config
}

fn embedder() -> Arc<dyn Embedder> {
    Arc::new(HashEmbedder { dims: DIMS })
}

async fn build(config: &Config) -> ingest::BuildSummary {
    ingest::build_index(config, embedder().as_ref(), &NoProgress)
        .await
        .unwrap()
}

async fn assistant_over(
    config: &Config,
    primary: Arc<ScriptedChat>,
    fallback: Arc<ScriptedChat>,
) -> Assistant {
    let embedder = embedder();
    let index = retrieve::open_index(config, embedder.as_ref()).await.unwrap();
    let retriever = Retriever::new(
        embedder,
        Arc::new(index),
        config.retrieval.top_k,
        config.retrieval.similarity_threshold,
    );
    Assistant::new(
        retriever,
        primary,
        fallback,
        config.assistant.clone(),
        config.synthesis.max_context_chars,
    )
}

#[tokio::test]
async fn test_crisis_doc_answered_from_retrieved_context() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(&tmp, "crisis_a.txt", CRISIS_DOC);
    let config = config_for(&tmp, vec![doc]);

    let summary = build(&config).await;
    assert_eq!(summary.documents, 1);
    assert_eq!(summary.chunks, 1);

    let primary = Arc::new(ScriptedChat::echoing("primary"));
    let fallback = Arc::new(ScriptedChat::failing("fallback"));
    let assistant = assistant_over(&config, primary.clone(), fallback.clone()).await;

    match assistant.answer(QUESTION).await {
        Outcome::Success(text) => assert!(text.contains("Always respond within 1 hour")),
        other => panic!("expected a RAG answer, got {:?}", other),
    }
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 0);
}

#[tokio::test]
async fn test_empty_document_set_goes_straight_to_direct_primary() {
    let tmp = TempDir::new().unwrap();
    let config = config_for(&tmp, vec![]);

    let summary = build(&config).await;
    assert_eq!(summary.documents, 0);
    assert_eq!(summary.chunks, 0);

    let index = SqliteIndex::open(&config.index.path).await.unwrap();
    assert_eq!(index.len().await.unwrap(), 0);
    let hits = retrieve::retrieve(&index, &vec![1.0; DIMS], 5, 0.0)
        .await
        .unwrap();
    assert!(hits.is_empty());

    let primary = Arc::new(ScriptedChat::replying("primary", "direct answer"));
    let fallback = Arc::new(ScriptedChat::replying("fallback", "fallback answer"));
    let assistant = assistant_over(&config, primary.clone(), fallback.clone()).await;

    assert_eq!(
        assistant.answer(QUESTION).await,
        Outcome::Degraded {
            text: "direct answer".to_string(),
            tier: Tier::DirectPrimary
        }
    );
    // No synthesis call happened: the only primary call is the direct one.
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 0);
}

#[tokio::test]
async fn test_threshold_above_any_score_answers_from_direct_primary() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(&tmp, "crisis_a.txt", CRISIS_DOC);
    let mut config = config_for(&tmp, vec![doc]);
    config.retrieval.similarity_threshold = 1.5;
    build(&config).await;

    let primary = Arc::new(ScriptedChat::replying("primary", "direct answer"));
    let fallback = Arc::new(ScriptedChat::replying("fallback", "fallback answer"));
    let assistant = assistant_over(&config, primary, fallback).await;

    assert_eq!(assistant.ask(QUESTION).await, "direct answer");
    assert_eq!(
        assistant.answer(QUESTION).await.tier(),
        Tier::DirectPrimary
    );
}

#[tokio::test]
async fn test_primary_failure_falls_back_to_lighter_model() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(&tmp, "crisis_a.txt", CRISIS_DOC);
    let config = config_for(&tmp, vec![doc]);
    build(&config).await;

    let primary = Arc::new(ScriptedChat::failing("primary"));
    let fallback = Arc::new(ScriptedChat::replying("fallback", "fallback answer"));
    let assistant = assistant_over(&config, primary.clone(), fallback.clone()).await;

    assert_eq!(
        assistant.answer(QUESTION).await,
        Outcome::Degraded {
            text: "fallback answer".to_string(),
            tier: Tier::DirectFallback
        }
    );
    // Synthesis and the direct call both went to the primary model.
    assert_eq!(primary.calls(), 2);
    assert_eq!(fallback.calls(), 1);
}

#[tokio::test]
async fn test_synthesis_failure_answers_from_direct_primary() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(&tmp, "crisis_a.txt", CRISIS_DOC);
    let config = config_for(&tmp, vec![doc]);
    build(&config).await;

    let primary = Arc::new(ScriptedChat::failing_then("primary", 1, "direct answer"));
    let fallback = Arc::new(ScriptedChat::replying("fallback", "fallback answer"));
    let assistant = assistant_over(&config, primary.clone(), fallback.clone()).await;

    assert_eq!(
        assistant.answer(QUESTION).await,
        Outcome::Degraded {
            text: "direct answer".to_string(),
            tier: Tier::DirectPrimary
        }
    );
    assert_eq!(primary.calls(), 2);
    assert_eq!(fallback.calls(), 0);
}

#[tokio::test]
async fn test_query_embedding_failure_answers_from_direct_primary() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(&tmp, "crisis_a.txt", CRISIS_DOC);
    let config = config_for(&tmp, vec![doc]);
    build(&config).await;

    let failing: Arc<dyn Embedder> = Arc::new(FailingEmbedder);
    assert_eq!(failing.dims(), DIMS);
    let index = retrieve::open_index(&config, failing.as_ref()).await.unwrap();
    let retriever = Retriever::new(failing, Arc::new(index), 5, 0.3);

    let primary = Arc::new(ScriptedChat::replying("primary", "direct answer"));
    let fallback = Arc::new(ScriptedChat::replying("fallback", "fallback answer"));
    let assistant = Assistant::new(
        retriever,
        primary.clone(),
        fallback.clone(),
        config.assistant.clone(),
        config.synthesis.max_context_chars,
    );

    assert_eq!(
        assistant.answer(QUESTION).await,
        Outcome::Degraded {
            text: "direct answer".to_string(),
            tier: Tier::DirectPrimary
        }
    );
    // Retrieval failed before any synthesis call.
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 0);
}

#[tokio::test]
async fn test_missing_embedding_key_fails_only_the_retrieval_tier() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(&tmp, "crisis_a.txt", CRISIS_DOC);
    let mut config = config_for(&tmp, vec![doc]);
    build(&config).await;

    config.embedding = EmbeddingConfig {
        provider: "openai".to_string(),
        model: Some("hash-bow".to_string()),
        dims: Some(DIMS),
        url: Some("http://127.0.0.1:9/v1".to_string()),
        api_key_env: "ECRIS_PIPELINE_EMBED_KEY_NEVER_SET".to_string(),
        max_retries: 0,
        ..EmbeddingConfig::default()
    };
    assert!(Assistant::from_config(&config).await.is_ok());

    let remote = embedding::create_embedder(&config.embedding).unwrap();
    let index = retrieve::open_index(&config, remote.as_ref()).await.unwrap();
    let retriever = Retriever::new(remote, Arc::new(index), 5, 0.3);

    let primary = Arc::new(ScriptedChat::replying("primary", "direct answer"));
    let fallback = Arc::new(ScriptedChat::replying("fallback", "fallback answer"));
    let assistant = Assistant::new(
        retriever,
        primary.clone(),
        fallback,
        config.assistant.clone(),
        config.synthesis.max_context_chars,
    );

    assert_eq!(assistant.answer(QUESTION).await.tier(), Tier::DirectPrimary);
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn test_both_tiers_failing_returns_exactly_the_apology() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(&tmp, "crisis_a.txt", CRISIS_DOC);
    let config = config_for(&tmp, vec![doc]);
    build(&config).await;

    let primary = Arc::new(ScriptedChat::failing("primary"));
    let fallback = Arc::new(ScriptedChat::failing("fallback"));
    let assistant = assistant_over(&config, primary, fallback).await;

    assert_eq!(assistant.answer(QUESTION).await, Outcome::Failed);
    assert_eq!(assistant.ask(QUESTION).await, config.assistant.apology);
}

#[tokio::test]
async fn test_missing_credential_ends_in_apology() {
    let tmp = TempDir::new().unwrap();
    let config = config_for(&tmp, vec![]);
    build(&config).await;

    let llm_config = LlmConfig {
        base_url: "http://127.0.0.1:9/v1".to_string(),
        api_key_env: "ECRIS_PIPELINE_TEST_KEY_NEVER_SET".to_string(),
        api_key_file: None,
        ..LlmConfig::default()
    };
    let (primary, fallback) = llm::create_chat_models(&llm_config).unwrap();

    let embedder = embedder();
    let index = retrieve::open_index(&config, embedder.as_ref()).await.unwrap();
    let retriever = Retriever::new(embedder, Arc::new(index), 5, 0.3);
    let assistant = Assistant::new(
        retriever,
        primary,
        fallback,
        config.assistant.clone(),
        config.synthesis.max_context_chars,
    );

    let answer = assistant.ask(QUESTION).await;
    assert_eq!(answer, config.assistant.apology);
    assert!(!answer.is_empty());
}

#[tokio::test]
async fn test_blank_question_gets_prompt_without_calls() {
    let tmp = TempDir::new().unwrap();
    let config = config_for(&tmp, vec![]);
    build(&config).await;

    let primary = Arc::new(ScriptedChat::replying("primary", "x"));
    let fallback = Arc::new(ScriptedChat::replying("fallback", "y"));
    let assistant = assistant_over(&config, primary.clone(), fallback.clone()).await;

    let reply = assistant.reply("   ").await;
    assert_eq!(reply.answer, config.assistant.empty_question_reply);
    assert!(reply.tier.is_none());
    assert_eq!(primary.calls() + fallback.calls(), 0);
}

#[tokio::test]
async fn test_stalled_tiers_time_out() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(&tmp, "crisis_a.txt", CRISIS_DOC);
    let mut config = config_for(&tmp, vec![doc]);
    config.assistant.tier_timeout_secs = 1;
    build(&config).await;

    let primary = Arc::new(ScriptedChat::stalling("primary"));
    let fallback = Arc::new(ScriptedChat::replying("fallback", "fallback answer"));
    let assistant = assistant_over(&config, primary, fallback).await;

    assert_eq!(
        assistant.answer(QUESTION).await.tier(),
        Tier::DirectFallback
    );
}

#[tokio::test]
async fn test_unreadable_documents_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(&tmp, "crisis_a.txt", CRISIS_DOC);
    let missing = tmp.path().join("missing.pdf");
    let broken = write_doc(&tmp, "broken.pdf", "this is not a pdf");
    let config = config_for(&tmp, vec![doc, missing, broken]);

    let summary = build(&config).await;
    assert_eq!(summary.documents, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.chunks, 1);
}

#[tokio::test]
async fn test_failed_embedding_publishes_nothing() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(&tmp, "crisis_a.txt", CRISIS_DOC);
    let config = config_for(&tmp, vec![doc]);

    let err = ingest::build_index(&config, &FailingEmbedder, &NoProgress)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("embedding service unavailable"));
    assert!(!config.index.path.exists());
}

#[tokio::test]
async fn test_failed_rebuild_keeps_previous_index() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(&tmp, "crisis_a.txt", CRISIS_DOC);
    let config = config_for(&tmp, vec![doc]);
    build(&config).await;

    assert!(ingest::build_index(&config, &FailingEmbedder, &NoProgress)
        .await
        .is_err());

    let index = SqliteIndex::open(&config.index.path).await.unwrap();
    assert_eq!(index.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_append_adds_new_documents() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(&tmp, "crisis_a.txt", CRISIS_DOC);
    let config = config_for(&tmp, vec![doc]);
    build(&config).await;

    let extra = write_doc(
        &tmp,
        "stakeholders.md",
        "# Stakeholders\n\nBrief employees before the press release goes out.",
    );
    let summary = ingest::append_documents(&config, embedder().as_ref(), &[extra], &NoProgress)
        .await
        .unwrap();
    assert_eq!(summary.documents, 1);
    assert_eq!(summary.chunks, 1);

    let index = SqliteIndex::open(&config.index.path).await.unwrap();
    assert_eq!(index.len().await.unwrap(), 2);
}

#[tokio::test]
async fn test_index_built_with_other_dimensionality_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let doc = write_doc(&tmp, "crisis_a.txt", CRISIS_DOC);
    let config = config_for(&tmp, vec![doc]);
    build(&config).await;

    let other = HashEmbedder { dims: 32 };
    let err = retrieve::open_index(&config, &other).await.err().unwrap();
    assert!(err.to_string().contains("Rebuild with `ecris build`"));
}

#[tokio::test]
async fn test_long_document_is_reduced_over_several_calls() {
    let tmp = TempDir::new().unwrap();
    let body = (0..40)
        .map(|i| format!("Crisis step {} respond to the crisis calmly.", i))
        .collect::<Vec<_>>()
        .join(" ");
    let doc = write_doc(&tmp, "playbook.txt", &body);
    let mut config = config_for(&tmp, vec![doc]);
    config.chunking.chunk_size = 200;
    config.chunking.chunk_overlap = 20;
    config.synthesis.max_context_chars = 300;
    config.retrieval.similarity_threshold = 0.0;
    build(&config).await;

    let primary = Arc::new(ScriptedChat::replying("primary", "summary"));
    let fallback = Arc::new(ScriptedChat::failing("fallback"));
    let assistant = assistant_over(&config, primary.clone(), fallback).await;

    assert_eq!(
        assistant.answer(QUESTION).await,
        Outcome::Success("summary".to_string())
    );
    // Five retrieved chunks cannot share one 300-char context.
    assert!(primary.calls() > 1);
}

//! Retrieval-augmented answers with mock embedding and chat backends.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{
    FailingChat, FlakyEmbedder, GatedChat, RecordingChat, WordEmbedder, memory_kb, test_config,
};
use orinda_rag::document::SOURCE_KEY;
use orinda_rag::{Chunk, ErrorKind, KnowledgeBase, NO_CONTEXT, QueryPipeline, QueryStage};
use tokio_util::sync::CancellationToken;

const MODEL: &str = "llama3.2:latest";

fn chunk(source: &str, text: &str) -> Chunk {
    let mut metadata = HashMap::new();
    metadata.insert(SOURCE_KEY.to_string(), source.into());
    Chunk { text: text.to_string(), metadata }
}

async fn seeded_kb() -> Arc<KnowledgeBase> {
    let kb = memory_kb(Arc::new(WordEmbedder)).await;
    kb.add(
        vec![chunk("handbook.md", "paid leave policy"), chunk("it.md", "printer setup guide")],
        &CancellationToken::new(),
        |_, _| {},
    )
    .await
    .unwrap();
    kb
}

#[tokio::test]
async fn empty_store_still_asks_the_model() {
    let kb = memory_kb(Arc::new(WordEmbedder)).await;
    let chat = Arc::new(RecordingChat::default());
    let pipeline = QueryPipeline::new(kb, chat.clone(), &test_config());

    let answer =
        pipeline.answer("What is Orinda?", MODEL, &CancellationToken::new(), |_| {}).await.unwrap();

    assert_eq!(answer.response, "answer from llama3.2:latest");
    assert_eq!(answer.context, NO_CONTEXT);
    assert!(!answer.used_fallback);

    let prompts = chat.prompts().await;
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(NO_CONTEXT));
    assert!(prompts[0].contains("### User Query:\nWhat is Orinda?"));
}

#[tokio::test]
async fn relevant_chunks_are_cited() {
    let chat = Arc::new(RecordingChat::default());
    let pipeline = QueryPipeline::new(seeded_kb().await, chat.clone(), &test_config());

    let answer = pipeline
        .answer("paid leave policy", MODEL, &CancellationToken::new(), |_| {})
        .await
        .unwrap();

    assert!(!answer.used_fallback);
    assert!(answer.context.starts_with("[Source: handbook.md, Relevance: "));
    assert!(answer.context.ends_with("%]\npaid leave policy"));
    assert!(!answer.context.contains("printer"));
    assert!(chat.prompts().await[0].contains(&answer.context));
}

#[tokio::test]
async fn weak_matches_fall_back_to_best_results() {
    let chat = Arc::new(RecordingChat::default());
    let pipeline = QueryPipeline::new(seeded_kb().await, chat, &test_config());

    let answer = pipeline.answer("leave", MODEL, &CancellationToken::new(), |_| {}).await.unwrap();

    assert!(answer.used_fallback);
    let handbook = answer.context.find("[Source: handbook.md").unwrap();
    let it = answer.context.find("[Source: it.md").unwrap();
    assert!(handbook < it);
}

#[tokio::test]
async fn stages_are_reported_in_order() {
    let pipeline =
        QueryPipeline::new(seeded_kb().await, Arc::new(RecordingChat::default()), &test_config());

    let mut stages = Vec::new();
    pipeline.answer("printer", MODEL, &CancellationToken::new(), |s| stages.push(s)).await.unwrap();
    assert_eq!(stages, [QueryStage::Searching, QueryStage::Generating, QueryStage::Completed]);
}

#[tokio::test]
async fn blank_query_is_rejected_before_retrieval() {
    let chat = Arc::new(RecordingChat::default());
    let pipeline = QueryPipeline::new(seeded_kb().await, chat.clone(), &test_config());

    let err = pipeline.answer("   ", MODEL, &CancellationToken::new(), |_| {}).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyQuery);
    assert!(chat.prompts().await.is_empty());
}

#[tokio::test]
async fn disabled_store_is_not_initialized() {
    let kb = memory_kb(Arc::new(FlakyEmbedder::always_failing())).await;
    let chat = Arc::new(RecordingChat::default());
    let pipeline = QueryPipeline::new(kb, chat.clone(), &test_config());

    let mut stages = Vec::new();
    let err = pipeline
        .answer("leave", MODEL, &CancellationToken::new(), |s| stages.push(s))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInitialized);
    assert!(err.to_string().starts_with("Vector database not initialized"));
    assert!(stages.is_empty());
    assert!(chat.prompts().await.is_empty());
}

#[tokio::test]
async fn model_failure_is_a_model_error() {
    let pipeline = QueryPipeline::new(seeded_kb().await, Arc::new(FailingChat), &test_config());

    let err = pipeline.answer("leave", MODEL, &CancellationToken::new(), |_| {}).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Model);
    assert!(err.to_string().contains(MODEL));
}

#[tokio::test]
async fn cancellation_interrupts_generation() {
    let pipeline =
        QueryPipeline::new(seeded_kb().await, Arc::new(GatedChat::default()), &test_config());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let err = pipeline
        .answer("leave", MODEL, &cancel, move |stage| {
            if stage == QueryStage::Generating {
                trigger.cancel();
            }
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

//! Shared mocks for the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use orinda_rag::{ChatModel, EmbeddingProvider, KnowledgeBase, RagConfig, RagError, Result};
use tokio::sync::{Mutex, Notify};

pub const DIM: usize = 64;

/// Deterministic bag-of-words embeddings: texts sharing words point in similar directions.
pub struct WordEmbedder;

impl WordEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut emb = vec![0.0f32; DIM];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            emb[(hash % DIM as u64) as usize] += 1.0;
        }
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        emb
    }
}

#[async_trait]
impl EmbeddingProvider for WordEmbedder {
    fn name(&self) -> &str {
        "Mock/words"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vector(text))
    }
}

/// Fails the first `failures` calls, then behaves like [`WordEmbedder`].
pub struct FlakyEmbedder {
    failures: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new(failures: usize) -> Self {
        Self { failures: AtomicUsize::new(failures) }
    }

    pub fn always_failing() -> Self {
        Self::new(usize::MAX)
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    fn name(&self) -> &str {
        "Mock/flaky"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RagError::Embedding {
                provider: "Mock/flaky".into(),
                message: "connection refused".into(),
            });
        }
        Ok(WordEmbedder::vector(text))
    }
}

/// Succeeds for the first `successes` calls, then fails every call.
pub struct FailAfter {
    remaining: AtomicUsize,
}

impl FailAfter {
    pub fn new(successes: usize) -> Self {
        Self { remaining: AtomicUsize::new(successes) }
    }
}

#[async_trait]
impl EmbeddingProvider for FailAfter {
    fn name(&self) -> &str {
        "Mock/fail-after"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let left =
            self.remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match left {
            Ok(_) => Ok(WordEmbedder::vector(text)),
            Err(_) => Err(RagError::Embedding {
                provider: "Mock/fail-after".into(),
                message: "down".into(),
            }),
        }
    }
}

/// Answers the startup embedding check immediately, then holds every later call until
/// [`GatedEmbedder::open`]. `entered` is notified when a held call starts.
#[derive(Default)]
pub struct GatedEmbedder {
    calls: AtomicUsize,
    gate: Notify,
    pub entered: Notify,
}

impl GatedEmbedder {
    pub fn open(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl EmbeddingProvider for GatedEmbedder {
    fn name(&self) -> &str {
        "Mock/gated"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        Ok(WordEmbedder::vector(text))
    }
}

/// Records every prompt and answers with a fixed reply.
#[derive(Default)]
pub struct RecordingChat {
    pub calls: Mutex<Vec<(String, String)>>,
}

impl RecordingChat {
    pub async fn prompts(&self) -> Vec<String> {
        self.calls.lock().await.iter().map(|(_, prompt)| prompt.clone()).collect()
    }
}

#[async_trait]
impl ChatModel for RecordingChat {
    async fn chat(&self, model: &str, prompt: &str) -> Result<String> {
        self.calls.lock().await.push((model.to_string(), prompt.to_string()));
        Ok(format!("answer from {model}"))
    }
}

/// Blocks each call until [`GatedChat::open`] releases it.
#[derive(Default)]
pub struct GatedChat {
    gate: Notify,
}

impl GatedChat {
    pub fn open(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl ChatModel for GatedChat {
    async fn chat(&self, _model: &str, _prompt: &str) -> Result<String> {
        self.gate.notified().await;
        Ok("released".to_string())
    }
}

/// Always fails like an unreachable model server.
pub struct FailingChat;

#[async_trait]
impl ChatModel for FailingChat {
    async fn chat(&self, model: &str, _prompt: &str) -> Result<String> {
        Err(RagError::Model { model: model.to_string(), message: "connection refused".into() })
    }
}

pub fn test_config() -> RagConfig {
    RagConfig::builder().chunk_size(200).chunk_overlap(30).embed_batch_size(4).build().unwrap()
}

pub async fn memory_kb(embedder: Arc<dyn EmbeddingProvider>) -> Arc<KnowledgeBase> {
    Arc::new(KnowledgeBase::in_memory(&test_config(), embedder).await)
}

pub fn write_file(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// A `.docx` archive whose body holds one paragraph per entry.
pub fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;

    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );

    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer.start_file("word/document.xml", options).unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap();
    }
    buffer.into_inner()
}

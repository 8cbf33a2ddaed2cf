//! # orinda-cli
//!
//! Interactive terminal front end for the Orinda assistant.
//!
//! Lines starting with `/` are commands; anything else is sent to the
//! knowledge base as a question. Long-running work happens in the background
//! and reports back through [`orinda_rag::SessionEvent`]s, which
//! [`render_event`] turns into display lines.

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use clap::Parser;
use orinda_rag::{
    DocumentFormat, OllamaConfig, RagConfig, RagConfigBuilder, SessionEvent, StoreStatus,
    UploadedFile,
};

/// Chat models offered for selection.
pub const MODELS: [&str; 3] = ["llama3:70b", "llama3:latest", "llama3.2:latest"];

pub const DEFAULT_MODEL: &str = "llama3.2:latest";

#[derive(Parser, Debug, Clone)]
#[command(name = "orinda")]
#[command(
    about = "Ask questions about your documents with a local Ollama model",
    long_about = None
)]
#[command(version)]
pub struct Args {
    #[arg(short, long, default_value = DEFAULT_MODEL, value_parser = MODELS, help = "Chat model")]
    pub model: String,

    #[arg(long, help = "Directory holding the vector database")]
    pub persist_dir: Option<PathBuf>,

    #[arg(long, help = "Collection name")]
    pub collection: Option<String>,

    #[arg(long, help = "Ollama server URL (overrides OLLAMA_HOST)")]
    pub ollama_url: Option<String>,

    #[arg(long, help = "Embedding model served by Ollama")]
    pub embedding_model: Option<String>,

    #[arg(help = "Documents to ingest on startup")]
    pub files: Vec<PathBuf>,
}

impl Args {
    /// Environment configuration with command-line flags applied on top.
    pub fn rag_config(&self) -> anyhow::Result<RagConfig> {
        let mut builder = RagConfigBuilder::from_config(RagConfig::from_env()?);
        if let Some(dir) = &self.persist_dir {
            builder = builder.persist_dir(dir);
        }
        if let Some(name) = &self.collection {
            builder = builder.collection_name(name);
        }
        if let Some(model) = &self.embedding_model {
            builder = builder.embedding_model(model);
        }
        Ok(builder.build()?)
    }

    /// Ollama connection settings for `config`'s embedding model.
    pub fn ollama_config(&self, config: &RagConfig) -> OllamaConfig {
        let ollama = OllamaConfig::from_env().with_embedding_model(&config.embedding_model);
        match &self.ollama_url {
            Some(url) => ollama.with_base_url(url),
            None => ollama,
        }
    }
}

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload(Vec<PathBuf>),
    Files,
    Remove(String),
    Ask(String),
    /// Show the current model, or switch to the named one.
    Model(Option<String>),
    Cancel,
    Status,
    Formats,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Self::Ask(line.to_string())));
        };

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };

        let command = match name {
            "upload" | "add" => {
                let paths = split_words(argument)?;
                if paths.is_empty() {
                    bail!("usage: /upload <file> [file...]");
                }
                Self::Upload(paths.into_iter().map(PathBuf::from).collect())
            }
            "files" | "ls" => Self::Files,
            "remove" | "rm" => {
                let name = split_words(argument)?.join(" ");
                if name.is_empty() {
                    bail!("usage: /remove <file name>");
                }
                Self::Remove(name)
            }
            "ask" => Self::Ask(argument.to_string()),
            "model" if argument.is_empty() => Self::Model(None),
            "model" => {
                if !MODELS.contains(&argument) {
                    bail!("unknown model '{argument}' (choose from {})", MODELS.join(", "));
                }
                Self::Model(Some(argument.to_string()))
            }
            "cancel" => Self::Cancel,
            "status" => Self::Status,
            "formats" => Self::Formats,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => bail!("unknown command '/{other}' (try /help)"),
        };
        Ok(Some(command))
    }
}

/// Split on whitespace, keeping double-quoted runs together.
fn split_words(input: &str) -> anyhow::Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut started = false;

    for c in input.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                started = true;
            }
            c if c.is_whitespace() && !quoted => {
                if started {
                    words.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if quoted {
        bail!("unterminated quote in {input:?}");
    }
    if started {
        words.push(current);
    }
    Ok(words)
}

pub const HELP: &str = "\
Commands:
  /upload <file>...   ingest documents (quote paths with spaces)
  /files              list uploaded files
  /remove <file>      remove a file and its chunks
  /model [name]       show or switch the chat model
  /cancel             cancel running work
  /status             show knowledge base status
  /formats            list supported file types
  /quit               clear the collection and exit
Anything else is asked as a question.";

fn percent(fraction: f32) -> u32 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u32
}

/// Display text for a session event.
pub fn render_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::IngestProgress(progress) => {
            format!("[{:>3}%] {}", percent(progress.fraction), progress.stage)
        }
        SessionEvent::IngestCompleted(report) => report.status_message(),
        SessionEvent::IngestFailed { message } => format!("Error: {message}"),
        SessionEvent::QueryProgress(stage) => {
            format!("[{:>3}%] {stage}", percent(stage.progress()))
        }
        SessionEvent::Response { answer, .. } => format!("\n{}\n", answer.response.trim_end()),
        SessionEvent::QueryFailed { message } => format!("Error: {message}"),
        SessionEvent::Status(message) => message.clone(),
    }
}

pub fn render_files(files: &[UploadedFile]) -> String {
    if files.is_empty() {
        return "No files uploaded.".to_string();
    }
    files
        .iter()
        .enumerate()
        .map(|(i, file)| format!("{:>3}. {} ({} chunks)", i + 1, file.file_name, file.chunks))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_status(status: &StoreStatus, model: &str) -> String {
    match status {
        StoreStatus::Ready { records } => format!("Ready: {records} chunks stored. Model: {model}"),
        StoreStatus::Disabled { reason } => {
            format!(
                "Vector database not initialized: {reason}. Upload documents to retry. \
                 Model: {model}"
            )
        }
    }
}

pub fn render_formats() -> String {
    DocumentFormat::ALL
        .iter()
        .map(|format| {
            let extensions: Vec<String> =
                format.extensions().iter().map(|ext| format!(".{ext}")).collect();
            format!("  {:<15} {}", format.label(), extensions.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve `/upload` arguments against the working directory, rejecting
/// paths that do not exist.
pub fn resolve_paths(paths: Vec<PathBuf>) -> anyhow::Result<Vec<PathBuf>> {
    let mut resolved = Vec::with_capacity(paths.len());
    for path in paths {
        let absolute =
            std::path::absolute(&path).with_context(|| format!("invalid path {}", path.display()))?;
        if !absolute.is_file() {
            bail!("no such file: {}", path.display());
        }
        resolved.push(absolute);
    }
    Ok(resolved)
}

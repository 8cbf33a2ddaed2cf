use std::sync::Arc;

use anyhow::Result;
use clap::Parser as _;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

use orinda_cli::{
    Args, Command, HELP, MODELS, render_event, render_files, render_formats, render_status,
    resolve_paths,
};
use orinda_rag::{KnowledgeBase, OllamaClient, Session};

enum Input {
    Line(String),
    Interrupt,
    Eof,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orinda=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = args.rag_config()?;
    let ollama = Arc::new(OllamaClient::new(args.ollama_config(&config))?);
    let knowledge_base = Arc::new(KnowledgeBase::open_persistent(&config, ollama.clone()).await);
    let (session, mut events) = Session::new(knowledge_base, ollama, &config);
    let mut model = args.model.clone();

    println!("Orinda: ask questions about your documents. Type /help for commands.");
    println!("{}", render_status(&session.status().await?, &model));

    if !args.files.is_empty() {
        upload(&session, args.files.clone()).await;
    }

    let (input_tx, mut input) = mpsc::unbounded_channel();
    // rustyline blocks, so it gets its own thread rather than the runtime's blocking pool.
    std::thread::spawn(move || read_input(input_tx));

    loop {
        tokio::select! {
            line = input.recv() => match line {
                Some(Input::Line(line)) => match Command::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => run(&session, &mut model, command).await,
                    Ok(None) => {}
                    Err(e) => println!("Error: {e}"),
                },
                Some(Input::Interrupt) => {
                    if session.is_ingesting() || session.is_querying() {
                        session.cancel().await;
                        println!("Cancelling...");
                    } else {
                        println!("Press Ctrl-D or type /quit to exit.");
                    }
                }
                Some(Input::Eof) | None => break,
            },
            Some(event) = events.recv() => println!("{}", render_event(&event)),
        }
    }

    let removed = session.shutdown().await;
    info!(removed, "session closed");
    Ok(())
}

async fn run(session: &Session, model: &mut String, command: Command) {
    match command {
        Command::Upload(paths) => upload(session, paths).await,
        Command::Files => println!("{}", render_files(&session.uploaded_files().await)),
        Command::Remove(file_name) => {
            if let Err(e) = session.remove_file(&file_name).await {
                println!("Error removing {file_name}: {e}");
            }
        }
        Command::Ask(query) => {
            if let Err(e) = session.ask(query, model.as_str()).await {
                println!("{e}");
            }
        }
        Command::Model(None) => println!("Model: {model} (available: {})", MODELS.join(", ")),
        Command::Model(Some(selected)) => {
            *model = selected;
            println!("Model set to {model}");
        }
        Command::Cancel => session.cancel().await,
        Command::Status => match session.status().await {
            Ok(status) => println!("{}", render_status(&status, model)),
            Err(e) => println!("Error: {e}"),
        },
        Command::Formats => println!("Supported file types:\n{}", render_formats()),
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
}

async fn upload(session: &Session, paths: Vec<std::path::PathBuf>) {
    let paths = match resolve_paths(paths) {
        Ok(paths) => paths,
        Err(e) => {
            println!("Error: {e}");
            return;
        }
    };
    if let Err(e) = session.start_ingest(paths).await {
        println!("Error: {e}");
    }
}

fn read_input(tx: mpsc::UnboundedSender<Input>) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            warn!(error = %e, "line editor unavailable");
            let _ = tx.send(Input::Eof);
            return;
        }
    };

    loop {
        let input = match editor.readline("orinda> ") {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                Input::Line(line)
            }
            Err(ReadlineError::Interrupted) => Input::Interrupt,
            Err(ReadlineError::Eof) => Input::Eof,
            Err(e) => {
                warn!(error = %e, "failed to read input");
                Input::Eof
            }
        };
        let done = matches!(input, Input::Eof);
        if tx.send(input).is_err() || done {
            break;
        }
    }
}

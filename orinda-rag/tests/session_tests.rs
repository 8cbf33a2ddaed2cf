//! Background runs, single-flight rejection and event delivery.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    FailAfter, FailingChat, GatedChat, GatedEmbedder, RecordingChat, WordEmbedder, memory_kb,
    test_config, write_file,
};
use orinda_rag::{ChatModel, ErrorKind, Session, SessionEvent, StoreStatus, UploadedFile};
use tokio::sync::mpsc::UnboundedReceiver;

async fn session_with(chat: Arc<dyn ChatModel>) -> (Session, UnboundedReceiver<SessionEvent>) {
    let kb = memory_kb(Arc::new(WordEmbedder)).await;
    Session::new(kb, chat, &test_config())
}

/// Drain events until one matches, failing after a timeout.
async fn wait_for(
    events: &mut UnboundedReceiver<SessionEvent>,
    mut wanted: impl FnMut(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn second_query_is_rejected_while_first_runs() {
    let chat = Arc::new(GatedChat::default());
    let (session, mut events) = session_with(chat.clone()).await;

    let first = session.ask("what is the leave policy?", "llama3:latest").await.unwrap();
    assert!(session.is_querying());

    let err = session.ask("another question", "llama3:latest").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);

    chat.open();
    first.await.unwrap();
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::Response { .. })).await;
    let SessionEvent::Response { answer, .. } = event else { unreachable!() };
    assert_eq!(answer.response, "released");

    assert!(!session.is_querying());
    let second = session.ask("another question", "llama3:latest").await.unwrap();
    chat.open();
    second.await.unwrap();
}

#[tokio::test]
async fn blank_query_is_rejected_up_front() {
    let (session, _events) = session_with(Arc::new(RecordingChat::default())).await;
    let err = session.ask("  ", "llama3:latest").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyQuery);
    assert_eq!(err.to_string(), "Please enter a query.");
    assert!(!session.is_querying());
}

#[tokio::test]
async fn model_errors_arrive_as_response_text() {
    let (session, mut events) = session_with(Arc::new(FailingChat)).await;

    session.ask("hello", "llama3:70b").await.unwrap().await.unwrap();
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::Response { .. })).await;
    let SessionEvent::Response { query, answer } = event else { unreachable!() };
    assert_eq!(query, "hello");
    assert!(answer.response.starts_with("Error calling model 'llama3:70b'"));
}

#[tokio::test]
async fn ingest_updates_file_list_and_remove_deletes_records() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(dir.path(), "policy.md", "Paid leave is twenty days per year.");
    let b = write_file(dir.path(), "setup.md", "Install Ollama before starting.");
    let (session, mut events) = session_with(Arc::new(RecordingChat::default())).await;

    session.start_ingest(vec![a, b]).await.unwrap().await.unwrap();
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::IngestCompleted(_))).await;
    let SessionEvent::IngestCompleted(report) = event else { unreachable!() };
    assert_eq!(report.status_message(), "Successfully processed 2 documents from 2 files.");

    let files = session.uploaded_files().await;
    let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, ["policy.md", "setup.md"]);
    assert_eq!(session.status().await.unwrap(), StoreStatus::Ready { records: 2 });

    assert_eq!(session.remove_file("policy.md").await.unwrap(), 1);
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::Status(_))).await;
    let SessionEvent::Status(message) = event else { unreachable!() };
    assert_eq!(message, "Removed 'policy.md' from list.");
    assert_eq!(session.uploaded_files().await.len(), 1);
    assert_eq!(session.status().await.unwrap(), StoreStatus::Ready { records: 1 });
}

#[tokio::test]
async fn failed_ingest_is_reported_as_event() {
    let dir = tempfile::tempdir().unwrap();
    let bad = write_file(dir.path(), "notes.txt", "unsupported");
    let (session, mut events) = session_with(Arc::new(RecordingChat::default())).await;

    session.start_ingest(vec![bad]).await.unwrap().await.unwrap();
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::IngestFailed { .. })).await;
    let SessionEvent::IngestFailed { message } = event else { unreachable!() };
    assert_eq!(message, "No documents were successfully loaded.");
    assert!(!session.is_ingesting());
}

#[tokio::test]
async fn empty_selection_is_rejected() {
    let (session, _events) = session_with(Arc::new(RecordingChat::default())).await;
    let err = session.start_ingest(Vec::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoDocumentsLoaded);
}

#[tokio::test]
async fn shutdown_clears_the_collection() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(dir.path(), "policy.md", "Paid leave is twenty days per year.");
    let (session, _events) = session_with(Arc::new(RecordingChat::default())).await;

    session.start_ingest(vec![a]).await.unwrap().await.unwrap();
    assert_eq!(session.shutdown().await, 1);

    let results = session.knowledge_base().similarity_search("paid leave", 3).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn files_stored_before_a_failure_are_listed() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(dir.path(), "policy.md", "Paid leave is twenty days per year.");
    let b = write_file(dir.path(), "setup.md", "Install Ollama before starting.");

    // One success for the startup embedding check and one for the single chunk of policy.md.
    let kb = memory_kb(Arc::new(FailAfter::new(2))).await;
    let (session, mut events) =
        Session::new(kb, Arc::new(RecordingChat::default()), &test_config());

    session.start_ingest(vec![a, b]).await.unwrap().await.unwrap();
    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::IngestFailed { .. })).await;
    let SessionEvent::IngestFailed { message } = event else { unreachable!() };
    assert!(message.contains("down"), "{message}");

    assert_eq!(session.status().await.unwrap(), StoreStatus::Ready { records: 1 });
    assert_eq!(
        session.uploaded_files().await,
        [UploadedFile { file_name: "policy.md".into(), chunks: 1 }]
    );
}

#[tokio::test]
async fn shutdown_waits_for_running_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(dir.path(), "policy.md", "Paid leave is twenty days per year.");

    let embedder = Arc::new(GatedEmbedder::default());
    let kb = memory_kb(embedder.clone()).await;
    let (session, _events) = Session::new(kb, Arc::new(RecordingChat::default()), &test_config());

    let ingest = session.start_ingest(vec![a]).await.unwrap();
    embedder.entered.notified().await;

    let release = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        embedder.open();
    };
    let (removed, ()) = tokio::join!(session.shutdown(), release);

    assert!(!session.is_ingesting());
    assert_eq!(removed, 0);
    assert_eq!(session.knowledge_base().count().await.unwrap(), 0);
    ingest.await.unwrap();
}

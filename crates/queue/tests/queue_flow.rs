use extract::testing::MockBackend;
use extract::{Entity, EntityType, ExtractionResult, Relationship};
use ingest::FileInput;
use parking_lot::Mutex;
use queue::{AnalysisQueue, AnalysisTask, TaskId, TaskStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const ALICE_BOB_PARIS: &str = r#"{
    "entities": [
        {"name": "Alice", "type": "person", "aliases": [], "summary": "A person"},
        {"name": "Bob", "type": "person", "aliases": [], "summary": "A person"},
        {"name": "Paris", "type": "location", "aliases": [], "summary": "A city"}
    ],
    "relationships": [{"source": "Alice", "target": "Bob", "strength": 5}]
}"#;

fn queue_over(backend: &MockBackend) -> AnalysisQueue {
    AnalysisQueue::with_backend(Arc::new(backend.clone()))
}

fn person(name: &str) -> Entity {
    Entity::new(name, EntityType::Person)
}

/// Collects completed task ids in notification order.
fn record_completions(queue: &AnalysisQueue) -> (Arc<Mutex<Vec<TaskId>>>, queue::Subscription) {
    let completed = Arc::new(Mutex::new(Vec::new()));
    let subscription = {
        let completed = completed.clone();
        queue.on_task_completed(move |task: &AnalysisTask| completed.lock().push(task.id))
    };
    (completed, subscription)
}

#[tokio::test]
async fn test_alice_meets_bob_end_to_end() {
    let backend = MockBackend::new().with_raw(ALICE_BOB_PARIS);
    let queue = queue_over(&backend);

    let id = queue.queue_text_analysis("Alice met Bob in Paris.");
    queue.wait_idle().await;

    let task = queue.get_task(id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_ref().unwrap().entities.len(), 3);

    let context = queue.get_previous_results();
    let ids: Vec<_> = context.entities.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["person-alice", "person-bob", "location-paris"]);
    assert_eq!(context.relationships.len(), 1);
    assert_eq!(context.relationships[0].id, "rel-person-alice-person-bob");
    assert_eq!(context.relationships[0].strength, 5.0);

    assert_eq!(backend.calls()[0].text, "Alice met Bob in Paris.");
}

#[tokio::test]
async fn test_tasks_complete_in_fifo_order() {
    let backend = MockBackend::gated();
    let queue = queue_over(&backend);
    let (completed, _subscription) = record_completions(&queue);

    let t1 = queue.queue_text_analysis("one");
    backend.wait_for_calls(1).await;
    // T1 is processing while T2 and T3 join the queue.
    let t2 = queue.queue_text_analysis("two");
    let t3 = queue.queue_text_analysis("three");
    assert_eq!(queue.get_task(t1).unwrap().status, TaskStatus::Processing);

    backend.release(3);
    queue.wait_idle().await;

    assert_eq!(*completed.lock(), vec![t1, t2, t3]);
    let texts: Vec<_> = backend.calls().into_iter().map(|c| c.text).collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_context_is_read_at_dequeue_time() {
    let backend = MockBackend::gated()
        .with_result(ExtractionResult::new(
            vec![person("Alice")],
            vec![Relationship::new("person-alice", "person-bob", 3.0)],
        ))
        .with_result(ExtractionResult::new(
            vec![person("Alice").with_aliases(["Al"])],
            vec![Relationship::new("person-alice", "person-bob", 4.0)],
        ));
    let queue = queue_over(&backend);

    queue.queue_text_analysis("first");
    backend.wait_for_calls(1).await;
    // Enqueued before the first task finished.
    queue.queue_text_analysis("second");

    backend.release(2);
    queue.wait_idle().await;

    let calls = backend.calls();
    assert!(calls[0].previous.is_none());
    let seen = calls[1].previous.as_ref().unwrap();
    assert!(seen.entity("person-alice").is_some());

    let context = queue.get_previous_results();
    assert_eq!(context.entities.len(), 1);
    assert!(context.entities[0].aliases.contains("Al"));
    assert_eq!(
        context.relationship("rel-person-alice-person-bob").unwrap().strength,
        5.0
    );
}

#[tokio::test]
async fn test_failure_is_isolated() {
    let backend = MockBackend::new()
        .with_raw(r#"{"entities": [{"name": "Alice", "type": "person"}], "relationships": []}"#)
        .with_failure("entities missing")
        .with_raw(r#"{"entities": [{"name": "Bob", "type": "person"}], "relationships": []}"#);
    let queue = queue_over(&backend);
    let (completed, _subscription) = record_completions(&queue);

    let ok1 = queue.queue_text_analysis("one");
    let failed = queue.queue_text_analysis("two");
    let ok2 = queue.queue_text_analysis("three");
    queue.wait_idle().await;

    let failed = queue.get_task(failed).unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(
        failed.error.as_deref(),
        Some("malformed backend response: entities missing")
    );
    assert!(failed.result.is_none());

    assert_eq!(*completed.lock(), vec![ok1, ok2]);

    let ids: Vec<_> = queue
        .get_previous_results()
        .entities
        .iter()
        .map(|e| e.id.clone())
        .collect();
    assert_eq!(ids, vec!["person-alice", "person-bob"]);

    // Failed tasks stay in history.
    assert_eq!(queue.get_tasks().len(), 3);
    assert!(queue.active_tasks().is_empty());
}

#[tokio::test]
async fn test_previous_results_are_copies() {
    let backend = MockBackend::new()
        .with_result(ExtractionResult::new(
            vec![person("Alice")],
            vec![Relationship::new("person-alice", "person-bob", 3.0)],
        ))
        .with_result(ExtractionResult::new(
            vec![],
            vec![Relationship::new("person-alice", "person-bob", 4.0)],
        ));
    let queue = queue_over(&backend);

    queue.queue_text_analysis("first");
    queue.wait_idle().await;

    let mut copy = queue.get_previous_results();
    copy.entities.clear();
    copy.relationships[0].strength = 100.0;

    queue.queue_text_analysis("second");
    queue.wait_idle().await;

    let context = queue.get_previous_results();
    assert!(context.entity("person-alice").is_some());
    assert_eq!(context.relationships[0].strength, 5.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_flight_under_concurrent_adds() {
    let backend = MockBackend::new();
    let queue = queue_over(&backend);

    let max_processing = Arc::new(AtomicUsize::new(0));
    let _subscription = {
        let observer = queue.clone();
        let max_processing = max_processing.clone();
        queue.on_queue_changed(move || {
            let processing = observer
                .get_tasks()
                .iter()
                .filter(|t| t.status == TaskStatus::Processing)
                .count();
            max_processing.fetch_max(processing, Ordering::SeqCst);
        })
    };

    let mut producers = Vec::new();
    for producer in 0..8 {
        let queue = queue.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..10 {
                queue.queue_text_analysis(format!("producer {producer} item {i}"));
                tokio::task::yield_now().await;
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }
    queue.wait_idle().await;

    assert_eq!(max_processing.load(Ordering::SeqCst), 1);
    assert_eq!(backend.calls().len(), 80);
    assert!(queue
        .get_tasks()
        .iter()
        .all(|t| t.status == TaskStatus::Completed));
}

#[tokio::test]
async fn test_cancel_processing_task() {
    let backend = MockBackend::gated()
        .with_result(ExtractionResult::new(vec![person("Ghost")], vec![]))
        .with_result(ExtractionResult::new(vec![person("Alice")], vec![]));
    let queue = queue_over(&backend);
    let (completed, _subscription) = record_completions(&queue);

    let cancelled = queue.queue_text_analysis("first");
    let next = queue.queue_text_analysis("second");
    backend.wait_for_calls(1).await;

    queue.cancel_task(cancelled).unwrap();
    backend.wait_for_calls(2).await;
    backend.release(1);
    queue.wait_idle().await;

    assert_eq!(queue.get_task(cancelled).unwrap().status, TaskStatus::Cancelled);
    assert_eq!(queue.get_task(next).unwrap().status, TaskStatus::Completed);
    assert_eq!(*completed.lock(), vec![next]);

    let context = queue.get_previous_results();
    assert!(context.entity("person-ghost").is_none());
    assert!(context.entity("person-alice").is_some());
    assert!(queue.get_task(cancelled).unwrap().result.is_none());
}

#[tokio::test]
async fn test_completion_listener_sees_merged_context() {
    let backend = MockBackend::new()
        .with_result(ExtractionResult::new(vec![person("Alice")], vec![]))
        .with_result(ExtractionResult::new(vec![person("Bob")], vec![]));
    let queue = queue_over(&backend);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let _subscription = {
        let observer = queue.clone();
        let seen = seen.clone();
        queue.on_task_completed(move |_| {
            let ids: Vec<String> = observer
                .get_previous_results()
                .entities
                .into_iter()
                .map(|e| e.id)
                .collect();
            seen.lock().push(ids);
        })
    };

    queue.queue_text_analysis("first");
    queue.queue_text_analysis("second");
    queue.wait_idle().await;

    assert_eq!(
        *seen.lock(),
        vec![
            vec!["person-alice".to_string()],
            vec!["person-alice".to_string(), "person-bob".to_string()],
        ]
    );
}

#[tokio::test]
async fn test_cancel_pending_task_notifies_change() {
    let backend = MockBackend::gated();
    let queue = queue_over(&backend);

    let changes = Arc::new(AtomicUsize::new(0));
    let _subscription = {
        let changes = changes.clone();
        queue.on_queue_changed(move || {
            changes.fetch_add(1, Ordering::SeqCst);
        })
    };

    queue.queue_text_analysis("held");
    backend.wait_for_calls(1).await;
    let pending = queue.queue_text_analysis("waiting");
    let before = changes.load(Ordering::SeqCst);

    queue.cancel_task(pending).unwrap();

    assert_eq!(changes.load(Ordering::SeqCst), before + 1);
    assert_eq!(queue.get_task(pending).unwrap().status, TaskStatus::Cancelled);

    backend.release(1);
    queue.wait_idle().await;
    assert_eq!(backend.calls().len(), 1);
}

#[tokio::test]
async fn test_reset_while_processing_is_not_overwritten() {
    let backend = MockBackend::gated()
        .with_result(ExtractionResult::new(vec![person("Alice")], vec![]))
        .with_result(ExtractionResult::new(vec![person("Bob")], vec![]));
    let queue = queue_over(&backend);

    queue.queue_text_analysis("first");
    queue.queue_text_analysis("second");
    backend.release(1);
    // The second call starts only after the first merge.
    backend.wait_for_calls(2).await;

    queue.reset_previous_results();
    backend.release(1);
    queue.wait_idle().await;

    // The second task saw the old context, but its merge lands on the reset one.
    let calls = backend.calls();
    assert!(calls[1].previous.as_ref().unwrap().entity("person-alice").is_some());

    let ids: Vec<_> = queue
        .get_previous_results()
        .entities
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["person-bob"]);
}

#[tokio::test]
async fn test_unsubscribed_listener_is_not_called() {
    let backend = MockBackend::new();
    let queue = queue_over(&backend);

    let changes = Arc::new(AtomicUsize::new(0));
    let subscription = {
        let changes = changes.clone();
        queue.on_queue_changed(move || {
            changes.fetch_add(1, Ordering::SeqCst);
        })
    };
    let (completed, completion_subscription) = record_completions(&queue);

    queue.queue_text_analysis("one");
    queue.wait_idle().await;
    // Enqueue, processing start, processing end.
    assert_eq!(changes.load(Ordering::SeqCst), 3);
    assert_eq!(completed.lock().len(), 1);

    subscription.unsubscribe();
    completion_subscription.unsubscribe();
    queue.queue_text_analysis("two");
    queue.wait_idle().await;

    assert_eq!(changes.load(Ordering::SeqCst), 3);
    assert_eq!(completed.lock().len(), 1);
}

#[tokio::test]
async fn test_document_and_image_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let minutes = dir.path().join("minutes.txt");
    std::fs::write(&minutes, "Alice met Bob in Paris.").unwrap();

    let backend = MockBackend::new().with_raw(ALICE_BOB_PARIS);
    let queue = queue_over(&backend);

    let doc = queue.queue_document_analysis(FileInput::new(&minutes));
    let image = queue.queue_image_analysis(FileInput::new("holiday/louvre.jpg"));
    queue.wait_idle().await;

    assert_eq!(queue.get_task(doc).unwrap().status, TaskStatus::Completed);
    assert_eq!(queue.get_task(image).unwrap().status, TaskStatus::Completed);

    let calls = backend.calls();
    assert_eq!(calls[0].text, "Alice met Bob in Paris.");
    assert!(calls[1].text.contains("louvre.jpg"));
    assert_eq!(calls[1].previous.as_ref().unwrap().entities.len(), 3);
}

#[tokio::test]
async fn test_reset_clears_context_for_next_task() {
    let backend = MockBackend::new().with_raw(ALICE_BOB_PARIS);
    let queue = queue_over(&backend);

    queue.queue_text_analysis("Alice met Bob in Paris.");
    queue.wait_idle().await;
    queue.reset_previous_results();

    queue.queue_text_analysis("Nothing here.");
    queue.wait_idle().await;

    assert!(backend.calls()[1].previous.is_none());
    assert!(queue.get_previous_results().is_empty());
}

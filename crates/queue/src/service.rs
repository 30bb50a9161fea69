use chrono::Utc;
use extract::{merge, ExtractionBackend, ExtractionResult};
use futures::FutureExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::default_handlers;
use crate::error::{AnalysisError, Result};
use crate::handler::HandlerMap;
use crate::listeners::{Listeners, Subscription};
use crate::task::{AnalysisTask, TaskContent, TaskId, TaskStatus};

#[derive(Default)]
struct QueueState {
    /// Every task ever added, in insertion order.
    tasks: IndexMap<TaskId, AnalysisTask>,
    /// Ids waiting to run, oldest first. Cancelled ids are skipped on pop.
    pending: VecDeque<TaskId>,
    context: ExtractionResult,
    processing: bool,
    in_flight: Option<(TaskId, CancellationToken)>,
}

struct Shared {
    state: Mutex<QueueState>,
    handlers: HandlerMap,
    task_completed: Listeners<AnalysisTask>,
    queue_changed: Listeners<()>,
    idle: watch::Sender<bool>,
    runtime: Handle,
}

/// The sequential analysis queue.
///
/// Tasks run one at a time in the order they were added. Each handler sees
/// the context as it stood when its task was dequeued, so every merge is
/// visible to the next task. Shared state sits behind one mutex that is
/// never held across an `.await` or while listeners run, and the
/// `processing` flag is flipped under the lock that checks for pending work.
///
/// Clones share the same tasks and context.
#[derive(Clone)]
pub struct AnalysisQueue {
    shared: Arc<Shared>,
}

impl AnalysisQueue {
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime. Use [`AnalysisQueue::new_in`]
    /// to pass a runtime handle explicitly.
    pub fn new(handlers: HandlerMap) -> Self {
        Self::new_in(handlers, Handle::current())
    }

    /// A queue whose processing loop runs on `runtime`. Tasks can then be
    /// added from any thread.
    pub fn new_in(handlers: HandlerMap, runtime: Handle) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                handlers,
                task_completed: Listeners::new(),
                queue_changed: Listeners::new(),
                idle,
                runtime,
            }),
        }
    }

    /// A queue with the text, document and image adapters over `backend`.
    pub fn with_backend(backend: Arc<dyn ExtractionBackend>) -> Self {
        Self::new(default_handlers(backend))
    }

    /// Add a task and start processing if the queue is idle.
    ///
    /// Returns as soon as the task is stored.
    pub fn add_task(&self, content: TaskContent) -> TaskId {
        let task = AnalysisTask::new(content);
        let id = task.id;
        let kind = task.kind();

        let start = {
            let mut state = self.shared.state.lock();
            state.tasks.insert(id, task);
            state.pending.push_back(id);
            let start = !state.processing;
            if start {
                state.processing = true;
                self.shared.idle.send_replace(false);
            }
            start
        };

        debug!(task_id = %id, %kind, "Task queued");
        self.shared.queue_changed.notify(&());

        if start {
            let shared = Arc::clone(&self.shared);
            self.shared.runtime.spawn(shared.run());
        }
        id
    }

    /// Active tasks (pending or processing) in queue order, then finished
    /// tasks newest first.
    pub fn get_tasks(&self) -> Vec<AnalysisTask> {
        let state = self.shared.state.lock();
        let active = state.tasks.values().filter(|t| t.status.is_active());
        let finished = state.tasks.values().rev().filter(|t| t.status.is_terminal());
        active.chain(finished).cloned().collect()
    }

    /// Pending and processing tasks in queue order.
    pub fn active_tasks(&self) -> Vec<AnalysisTask> {
        let state = self.shared.state.lock();
        state
            .tasks
            .values()
            .filter(|t| t.status.is_active())
            .cloned()
            .collect()
    }

    pub fn get_task(&self, id: TaskId) -> Option<AnalysisTask> {
        self.shared.state.lock().tasks.get(&id).cloned()
    }

    pub fn is_processing(&self) -> bool {
        self.shared.state.lock().processing
    }

    /// A copy of the cumulative context.
    pub fn get_previous_results(&self) -> ExtractionResult {
        self.shared.state.lock().context.clone()
    }

    pub fn reset_previous_results(&self) {
        self.shared.state.lock().context = ExtractionResult::default();
        info!("Cumulative context reset");
        self.shared.queue_changed.notify(&());
    }

    /// Cancel a pending or processing task.
    ///
    /// A pending task is cancelled at once. A processing task has its handler
    /// abandoned; if the handler finishes first the task completes normally.
    pub fn cancel_task(&self, id: TaskId) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            let QueueState {
                tasks, in_flight, ..
            } = &mut *state;
            let task = tasks.get_mut(&id).ok_or(AnalysisError::TaskNotFound(id))?;

            match task.status {
                TaskStatus::Pending => {
                    task.status = TaskStatus::Cancelled;
                    task.finished_at = Some(Utc::now());
                    info!(task_id = %id, "Pending task cancelled");
                }
                TaskStatus::Processing => {
                    if let Some((_, token)) = in_flight.as_ref().filter(|(t, _)| *t == id) {
                        token.cancel();
                    }
                    // The processing loop records the transition.
                    return Ok(());
                }
                status => return Err(AnalysisError::TaskFinished { id, status }),
            }
        }

        self.shared.queue_changed.notify(&());
        Ok(())
    }

    /// Called once per successfully completed task, in completion order.
    pub fn on_task_completed(
        &self,
        callback: impl Fn(&AnalysisTask) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.task_completed.subscribe(callback)
    }

    /// Called after every enqueue, status change and context reset.
    pub fn on_queue_changed(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.shared.queue_changed.subscribe(move |_| callback())
    }

    /// Resolves once no task is pending or processing.
    pub async fn wait_idle(&self) {
        let mut idle = self.shared.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = idle.wait_for(|idle| *idle).await;
    }
}

impl Shared {
    async fn run(self: Arc<Self>) {
        while let Some((task, previous, cancel)) = self.start_next() {
            self.queue_changed.notify(&());

            let outcome = self.dispatch(&task, previous, cancel).await;

            if let Some(completed) = self.finish(task.id, outcome) {
                self.task_completed.notify(&completed);
            }
            self.queue_changed.notify(&());
        }
    }

    /// Move the oldest pending task to processing, or clear the
    /// single-flight flag if there is none.
    fn start_next(&self) -> Option<(AnalysisTask, ExtractionResult, CancellationToken)> {
        let mut state = self.state.lock();
        let QueueState { tasks, pending, .. } = &mut *state;

        let next = std::iter::from_fn(|| pending.pop_front()).find_map(|id| {
            tasks
                .get_full(&id)
                .filter(|(_, _, t)| t.status == TaskStatus::Pending)
                .map(|(index, _, _)| index)
        });
        let Some(index) = next else {
            state.processing = false;
            state.in_flight = None;
            self.idle.send_replace(true);
            return None;
        };

        let task = &mut state.tasks[index];
        task.status = TaskStatus::Processing;
        task.started_at = Some(Utc::now());
        let task = task.clone();

        info!(task_id = %task.id, kind = %task.kind(), "Processing task");

        let cancel = CancellationToken::new();
        state.in_flight = Some((task.id, cancel.clone()));
        Some((task, state.context.clone(), cancel))
    }

    async fn dispatch(
        &self,
        task: &AnalysisTask,
        previous: ExtractionResult,
        cancel: CancellationToken,
    ) -> Result<ExtractionResult> {
        let handler = self
            .handlers
            .get(task.kind())
            .ok_or(AnalysisError::NoHandler(task.kind()))?;

        let work = AssertUnwindSafe(handler.handle(task, previous)).catch_unwind();

        tokio::select! {
            _ = cancel.cancelled() => Err(AnalysisError::Cancelled),
            outcome = work => outcome.unwrap_or(Err(AnalysisError::HandlerPanicked)),
        }
    }

    /// Record the outcome. On success the result is merged into the context
    /// and a snapshot of the completed task is returned for listeners.
    fn finish(&self, id: TaskId, outcome: Result<ExtractionResult>) -> Option<AnalysisTask> {
        let mut state = self.state.lock();
        state.in_flight = None;

        let QueueState { tasks, context, .. } = &mut *state;
        let task = tasks.get_mut(&id)?;
        task.finished_at = Some(Utc::now());

        match outcome {
            Ok(result) => {
                *context = merge(context, &result);
                info!(
                    task_id = %id,
                    entities = result.entities.len(),
                    relationships = result.relationships.len(),
                    total_entities = context.entities.len(),
                    "Task completed"
                );
                task.status = TaskStatus::Completed;
                task.result = Some(result);
                Some(task.clone())
            }
            Err(AnalysisError::Cancelled) => {
                info!(task_id = %id, "Processing task cancelled");
                task.status = TaskStatus::Cancelled;
                None
            }
            Err(e) => {
                warn!(task_id = %id, error = %e, "Task failed");
                task.status = TaskStatus::Failed;
                task.error = Some(e.to_string());
                None
            }
        }
    }
}

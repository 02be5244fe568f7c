//! Bounded worker pool with a priority queue and optional rate limiting
//!
//! Tasks are boxed futures submitted under a priority. `max_workers` worker
//! loops pull the lowest-priority-value task from the queue, acquire a
//! concurrency slot, wait for the shared [`RateLimiter`] (when configured)
//! and run the task. Errors and panics are recorded on the task and never
//! take down a worker.
//!
//! Equal-priority tasks are served in submission order.

mod rate_limiter;
mod task;

pub use rate_limiter::RateLimiter;
pub use task::{Task, TaskFuture, TaskId, TaskPriority, TaskStatus};

use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::ModeLimits;
use crate::error::{Error, Result};

/// How long an idle worker sleeps before re-checking the queue
const DEQUEUE_POLL: Duration = Duration::from_millis(500);

/// Poll interval of `wait_for_task` / `wait_all`
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Poll interval while `stop` drains running tasks
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Default drain window for `stop`
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Observer invoked with the final snapshot of a task
pub type TaskCallback<T> = Arc<dyn Fn(&Task<T>) -> anyhow::Result<()> + Send + Sync>;

/// Counts of tasks by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Pending or queued
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    priority: TaskPriority,
    seq: u64,
    id: TaskId,
}

struct Registry<T> {
    tasks: HashMap<TaskId, Task<T>>,
    work: HashMap<TaskId, TaskFuture<T>>,
    queue: BinaryHeap<Reverse<QueueEntry>>,
    next_seq: u64,
}

struct Shared<T> {
    registry: Mutex<Registry<T>>,
    queued: Notify,
    slots: Arc<Semaphore>,
    rate_limiter: Option<RateLimiter>,
    on_complete: Mutex<Vec<TaskCallback<T>>>,
    on_error: Mutex<Vec<TaskCallback<T>>>,
}

struct Workers {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

/// Executes submitted async work with bounded concurrency
pub struct TaskScheduler<T> {
    max_workers: usize,
    shared: Arc<Shared<T>>,
    workers: Mutex<Option<Workers>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl<T: Clone + Send + 'static> TaskScheduler<T> {
    /// Create a scheduler with `max_workers` workers and an optional global rate limiter
    pub fn new(max_workers: usize, rate_limiter: Option<RateLimiter>) -> Result<Self> {
        if max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".to_string()));
        }
        Ok(Self {
            max_workers,
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry {
                    tasks: HashMap::new(),
                    work: HashMap::new(),
                    queue: BinaryHeap::new(),
                    next_seq: 0,
                }),
                queued: Notify::new(),
                slots: Arc::new(Semaphore::new(max_workers)),
                rate_limiter,
                on_complete: Mutex::new(Vec::new()),
                on_error: Mutex::new(Vec::new()),
            }),
            workers: Mutex::new(None),
        })
    }

    /// Scheduler sized by an engagement mode's concurrency and global rate
    pub fn for_mode(limits: &ModeLimits) -> Result<Self> {
        Self::new(
            limits.concurrency,
            Some(RateLimiter::new(limits.global, None)?),
        )
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn is_started(&self) -> bool {
        lock(&self.workers).is_some()
    }

    /// Spawn the worker loops. Calling it again while started does nothing.
    pub fn start(&self) {
        let mut workers = lock(&self.workers);
        if workers.is_some() {
            return;
        }

        let shutdown = CancellationToken::new();
        let handles = (0..self.max_workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    Arc::clone(&self.shared),
                    worker_id,
                    shutdown.clone(),
                ))
            })
            .collect();

        debug!("Task scheduler started with {} workers", self.max_workers);
        *workers = Some(Workers { handles, shutdown });
    }

    /// Queue a unit of work and return its id without waiting
    pub fn submit<F>(&self, name: impl Into<String>, work: F, priority: TaskPriority) -> TaskId
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let mut task = Task::new(name, priority);
        task.status = TaskStatus::Queued;
        let id = task.id.clone();

        {
            let mut registry = lock(&self.shared.registry);
            let seq = registry.next_seq;
            registry.next_seq += 1;
            registry.work.insert(id.clone(), Box::pin(work));
            registry.queue.push(Reverse(QueueEntry {
                priority,
                seq,
                id: id.clone(),
            }));
            registry.tasks.insert(id.clone(), task);
        }

        self.shared.queued.notify_one();
        id
    }

    /// Queue many units of work under one priority
    pub fn submit_batch<I>(&self, items: I, priority: TaskPriority) -> Vec<TaskId>
    where
        I: IntoIterator<Item = (String, TaskFuture<T>)>,
    {
        items
            .into_iter()
            .map(|(name, work)| self.submit(name, work, priority))
            .collect()
    }

    /// Snapshot of a task
    pub fn get_task(&self, id: &str) -> Option<Task<T>> {
        lock(&self.shared.registry).tasks.get(id).cloned()
    }

    /// Poll until the task is terminal or `timeout` elapses.
    ///
    /// On timeout the still-running snapshot is returned. `None` means the id is unknown.
    pub async fn wait_for_task(&self, id: &str, timeout: Option<Duration>) -> Option<Task<T>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        self.wait_until(id, deadline).await
    }

    /// Wait for several tasks under one shared deadline
    pub async fn wait_all(&self, ids: &[TaskId], timeout: Option<Duration>) -> Vec<Task<T>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = self.wait_until(id, deadline).await {
                tasks.push(task);
            }
        }
        tasks
    }

    async fn wait_until(&self, id: &str, deadline: Option<Instant>) -> Option<Task<T>> {
        loop {
            let task = self.get_task(id)?;
            if task.is_done() {
                return Some(task);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Some(task);
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    /// Cancel a task that no worker has claimed yet
    pub fn cancel_task(&self, id: &str) -> bool {
        let mut registry = lock(&self.shared.registry);
        let Some(task) = registry.tasks.get_mut(id) else {
            return false;
        };
        if !matches!(task.status, TaskStatus::Pending | TaskStatus::Queued) {
            return false;
        }
        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(Utc::now());
        registry.work.remove(id);
        debug!("Cancelled task {}", id);
        true
    }

    /// Register an observer for successfully completed tasks
    pub fn on_task_complete(&self, callback: TaskCallback<T>) {
        lock(&self.shared.on_complete).push(callback);
    }

    /// Register an observer for failed tasks
    pub fn on_task_error(&self, callback: TaskCallback<T>) {
        lock(&self.shared.on_error).push(callback);
    }

    pub fn statistics(&self) -> SchedulerStats {
        let registry = lock(&self.shared.registry);
        let mut stats = SchedulerStats {
            total: registry.tasks.len(),
            ..SchedulerStats::default()
        };
        for task in registry.tasks.values() {
            match task.status {
                TaskStatus::Pending | TaskStatus::Queued => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Stop dequeuing, optionally drain running tasks, then shut the workers down.
    ///
    /// Tasks still unfinished afterwards are marked cancelled.
    pub async fn stop(&self, wait: bool, timeout: Option<Duration>) {
        let Some(workers) = lock(&self.workers).take() else {
            return;
        };
        workers.shutdown.cancel();

        if wait {
            let drain = async {
                while self.statistics().running > 0 {
                    tokio::time::sleep(DRAIN_POLL).await;
                }
            };
            match timeout {
                Some(limit) => {
                    if tokio::time::timeout(limit, drain).await.is_err() {
                        warn!(
                            "Scheduler stop timed out after {:?} with tasks still running",
                            limit
                        );
                    }
                }
                None => drain.await,
            }
        }

        for handle in &workers.handles {
            handle.abort();
        }
        for handle in workers.handles {
            let _ = handle.await;
        }

        let abandoned = self.shared.cancel_unfinished();
        if abandoned > 0 {
            debug!("Scheduler stopped; {} unfinished tasks cancelled", abandoned);
        } else {
            debug!("Scheduler stopped");
        }
    }
}

impl<T> Drop for TaskScheduler<T> {
    fn drop(&mut self) {
        if let Some(workers) = lock(&self.workers).take() {
            workers.shutdown.cancel();
        }
    }
}

impl<T: Clone + Send + 'static> Shared<T> {
    /// Pop the next runnable entry and mark its task running
    fn claim_next(&self) -> Option<(TaskId, TaskFuture<T>)> {
        let mut registry = lock(&self.registry);
        while let Some(Reverse(entry)) = registry.queue.pop() {
            // Cancelled tasks have no work left
            let Some(work) = registry.work.remove(&entry.id) else {
                continue;
            };
            let Some(task) = registry.tasks.get_mut(&entry.id) else {
                continue;
            };
            if task.status == TaskStatus::Queued {
                task.status = TaskStatus::Running;
                task.started_at = Some(Utc::now());
                return Some((entry.id, work));
            }
        }
        None
    }

    fn finish(&self, id: &str, outcome: std::result::Result<T, String>) -> Option<Task<T>> {
        let mut registry = lock(&self.registry);
        let task = registry.tasks.get_mut(id)?;
        match outcome {
            Ok(value) => {
                task.status = TaskStatus::Completed;
                task.result = Some(value);
            }
            Err(message) => {
                task.status = TaskStatus::Failed;
                task.error = Some(message);
            }
        }
        task.completed_at = Some(Utc::now());
        Some(task.clone())
    }

    fn notify_observers(&self, task: &Task<T>) {
        let callbacks: Vec<TaskCallback<T>> = match task.status {
            TaskStatus::Completed => lock(&self.on_complete).clone(),
            TaskStatus::Failed => lock(&self.on_error).clone(),
            _ => return,
        };
        for callback in callbacks {
            match std::panic::catch_unwind(AssertUnwindSafe(|| callback(task))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Task callback for {} failed: {:#}", task.id, e),
                Err(_) => debug!("Task callback for {} panicked", task.id),
            }
        }
    }

    fn cancel_unfinished(&self) -> usize {
        let mut registry = lock(&self.registry);
        let now = Utc::now();
        let mut count = 0;
        for task in registry.tasks.values_mut() {
            if !task.status.is_terminal() {
                task.status = TaskStatus::Cancelled;
                task.error = Some("Scheduler stopped".to_string());
                task.completed_at = Some(now);
                count += 1;
            }
        }
        registry.work.clear();
        registry.queue.clear();
        count
    }
}

async fn worker_loop<T: Clone + Send + 'static>(
    shared: Arc<Shared<T>>,
    worker_id: usize,
    shutdown: CancellationToken,
) {
    debug!("Scheduler worker {} started", worker_id);

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let Some((id, work)) = shared.claim_next() else {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = shared.queued.notified() => {}
                _ = tokio::time::sleep(DEQUEUE_POLL) => {}
            }
            continue;
        };

        let permit = Arc::clone(&shared.slots).acquire_owned().await;

        if let Some(limiter) = &shared.rate_limiter {
            limiter.acquire().await;
        }

        let outcome = match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(payload) => Err(panic_message(payload.as_ref())),
        };
        drop(permit);

        if let Err(message) = &outcome {
            debug!("Task {} failed: {}", id, message);
        }

        if let Some(task) = shared.finish(&id, outcome) {
            shared.notify_observers(&task);
        }
    }

    debug!("Scheduler worker {} stopped", worker_id);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("Task panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("Task panicked: {}", message)
    } else {
        "Task panicked".to_string()
    }
}

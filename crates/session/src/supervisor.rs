//! Per-conversation compression workers.
//!
//! The supervisor owns a map from conversation id to the join handle of
//! that conversation's worker. `submit` pushes a task onto the durable queue
//! and starts a worker if none is registered. A worker pops tasks in FIFO
//! order and runs each through the [`Pipeline`] before taking the next, so
//! one conversation's working memory is only ever written by one task at a
//! time.
//!
//! A worker exits after `max_idle_loops` consecutive empty polls or
//! failures; only a successful task resets the count. An idle worker
//! re-checks the queue length while holding the registry lock before removing
//! itself. `submit` takes the same lock to decide whether to spawn, so a task
//! pushed during the exit is either seen by the exiting worker or picked up
//! by a freshly spawned one. A worker that gives up after failures leaves its
//! pending tasks queued for the next submission.
//!
//! Shutdown is observed between pops, so it waits for an in-flight pop to
//! return, at most `poll_timeout`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use recall_compression::Pipeline;
use recall_config::QueueConfig;
use recall_core::storage::TaskQueue;
use recall_core::{CompressionTask, EventBus, MemoryEvent};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct Shared {
    queue: Arc<dyn TaskQueue>,
    pipeline: Arc<Pipeline>,
    config: QueueConfig,
    workers: Mutex<HashMap<String, JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    events: Arc<EventBus>,
}

/// Spawns and tracks one worker per conversation.
#[derive(Clone)]
pub struct QueueSupervisor {
    shared: Arc<Shared>,
}

impl QueueSupervisor {
    pub fn new(queue: Arc<dyn TaskQueue>, pipeline: Arc<Pipeline>, config: QueueConfig) -> Self {
        Self::with_events(queue, pipeline, config, Arc::new(EventBus::default()))
    }

    pub fn with_events(
        queue: Arc<dyn TaskQueue>,
        pipeline: Arc<Pipeline>,
        config: QueueConfig,
        events: Arc<EventBus>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                queue,
                pipeline,
                config,
                workers: Mutex::new(HashMap::new()),
                shutdown,
                events,
            }),
        }
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.shared.events.clone()
    }

    /// Enqueue a task and make sure a worker is running for it.
    ///
    /// Never fails: a push error is logged and the task dropped.
    pub async fn submit(&self, task: CompressionTask) {
        let conversation_id = task.conversation_id.clone();

        if let Err(e) = self.shared.queue.push(&task).await {
            error!(conversation_id = %conversation_id, error = %e, "Failed to enqueue compression task, dropping it");
            return;
        }

        if self.is_shutting_down() {
            debug!(conversation_id = %conversation_id, "Shutting down, task left in queue");
            return;
        }

        let mut workers = self.shared.workers.lock().await;
        let running = workers
            .get(&conversation_id)
            .is_some_and(|handle| !handle.is_finished());
        if running {
            return;
        }

        let shared = self.shared.clone();
        let id = conversation_id.clone();
        let handle = tokio::spawn(async move { run_worker(shared, id).await });
        workers.insert(conversation_id.clone(), handle);
        debug!(conversation_id = %conversation_id, "Spawned compression worker");
    }

    /// Whether a worker is registered and still running.
    pub async fn is_active(&self, conversation_id: &str) -> bool {
        self.shared
            .workers
            .lock()
            .await
            .get(conversation_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn active_workers(&self) -> usize {
        self.shared
            .workers
            .lock()
            .await
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shared.shutdown.borrow()
    }

    /// Stop every worker between tasks and wait for them to exit.
    /// Queued tasks stay in the queue.
    pub async fn shutdown(&self) {
        self.shared.shutdown.send_replace(true);
        let handles: Vec<(String, JoinHandle<()>)> =
            self.shared.workers.lock().await.drain().collect();
        info!(workers = handles.len(), "Stopping compression workers");
        for (conversation_id, handle) in handles {
            if let Err(e) = handle.await {
                warn!(conversation_id = %conversation_id, error = %e, "Worker ended abnormally");
            }
        }
    }
}

async fn run_worker(shared: Arc<Shared>, conversation_id: String) {
    let config = &shared.config;
    let mut shutdown = shared.shutdown.subscribe();
    let mut strikes: u32 = 0;

    info!(conversation_id = %conversation_id, "Compression worker started");
    shared.events.publish(MemoryEvent::WorkerStarted {
        conversation_id: conversation_id.clone(),
        timestamp: Utc::now(),
    });

    let reason = loop {
        if *shutdown.borrow_and_update() {
            break "shutdown";
        }

        // Not raced against shutdown: a pop dropped mid-flight may already
        // have removed its task from a durable queue.
        let failed = match shared.queue.pop(&conversation_id, config.poll_timeout()).await {
            Ok(Some(task)) => match shared.pipeline.process(&task).await {
                Ok(()) => {
                    strikes = 0;
                    continue;
                }
                Err(e) => {
                    error!(conversation_id = %conversation_id, error = %e, "Compression task failed");
                    true
                }
            },
            Ok(None) => {
                debug!(conversation_id = %conversation_id, idle = strikes + 1, "Queue empty");
                false
            }
            Err(e) => {
                error!(conversation_id = %conversation_id, error = %e, "Failed to pop compression task");
                true
            }
        };
        strikes += 1;

        if strikes < config.max_idle_loops {
            if failed {
                tokio::time::sleep(config.error_backoff()).await;
            }
            continue;
        }

        let mut workers = shared.workers.lock().await;
        if failed {
            warn!(conversation_id = %conversation_id, strikes, "Too many consecutive failures, worker giving up");
            workers.remove(&conversation_id);
            break "failed";
        }
        match shared.queue.len(&conversation_id).await {
            Ok(pending) if pending > 0 => {
                debug!(conversation_id = %conversation_id, pending, "Tasks arrived while idling, staying up");
                strikes = 0;
            }
            _ => {
                workers.remove(&conversation_id);
                break "idle";
            }
        }
    };

    info!(conversation_id = %conversation_id, reason, "Compression worker stopped");
    shared.events.publish(MemoryEvent::WorkerStopped {
        conversation_id,
        reason: reason.to_string(),
        timestamp: Utc::now(),
    });
}

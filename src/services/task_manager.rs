use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::ScanKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    RootDomainScan,
    SubdomainScan,
}

impl From<ScanKind> for TaskType {
    fn from(kind: ScanKind) -> Self {
        match kind {
            ScanKind::RootDomain => TaskType::RootDomainScan,
            ScanKind::Subdomain => TaskType::SubdomainScan,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: Uuid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: f32, // 0.0 to 1.0
    pub message: Option<String>,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
}

impl TaskInfo {
    pub fn new(task_type: TaskType, metadata: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0.0,
            message: None,
            error: None,
            metadata,
        }
    }

    fn finish(&mut self, status: TaskStatus, error: Option<String>) {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.error = error;
        if status == TaskStatus::Completed {
            self.progress = 1.0;
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, TaskStatus::Pending | TaskStatus::Running)
    }

    pub fn is_finished(&self) -> bool {
        !self.is_active()
    }
}

/// Handle given to a running task for progress reporting.
pub struct TaskContext {
    pub task_id: Uuid,
    pub task_manager: Arc<TaskManager>,
}

impl TaskContext {
    pub async fn update_progress(&self, progress: f32, message: Option<String>) {
        self.task_manager
            .update_task_progress(self.task_id, progress, message)
            .await;
    }
}

pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send>>;

/// How long finished tasks stay queryable before they are pruned.
pub const DEFAULT_TASK_RETENTION_MINUTES: i64 = 60;

/// Readable text for a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs background work with a concurrency ceiling. Every submitted task stays
/// observable through [`TaskManager::get_task`] and joinable through
/// [`TaskManager::wait_for_all_tasks`].
pub struct TaskManager {
    max_concurrent: usize,
    retention: chrono::Duration,
    tasks: Arc<RwLock<HashMap<Uuid, TaskInfo>>>,
    active_handles: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
    concurrency_semaphore: Arc<Semaphore>,
}

impl TaskManager {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            max_concurrent,
            retention: chrono::Duration::minutes(DEFAULT_TASK_RETENTION_MINUTES),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            active_handles: Arc::new(Mutex::new(HashMap::new())),
            concurrency_semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Keep finished tasks for `retention` before pruning them.
    pub fn with_retention(mut self, retention: chrono::Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub async fn submit_task<F>(
        &self,
        task_type: TaskType,
        metadata: serde_json::Value,
        task_fn: F,
    ) -> Result<Uuid, ApiError>
    where
        F: FnOnce(TaskContext) -> TaskFuture + Send + 'static,
    {
        let task_info = TaskInfo::new(task_type, metadata);
        let task_id = task_info.id;

        self.tasks.write().await.insert(task_id, task_info);

        let task_manager = Arc::new(self.clone());
        let semaphore = self.concurrency_semaphore.clone();

        // Hold the handle map while spawning so a fast task cannot remove its
        // entry before it has been inserted.
        let mut handles = self.active_handles.lock().await;
        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    task_manager
                        .finish_task(task_id, TaskStatus::Cancelled, None)
                        .await;
                    return;
                }
            };

            task_manager.start_task(task_id).await;

            let context = TaskContext {
                task_id,
                task_manager: task_manager.clone(),
            };

            match AssertUnwindSafe(task_fn(context)).catch_unwind().await {
                Ok(Ok(())) => {
                    task_manager
                        .finish_task(task_id, TaskStatus::Completed, None)
                        .await
                }
                Ok(Err(e)) => {
                    task_manager
                        .finish_task(task_id, TaskStatus::Failed, Some(e.to_string()))
                        .await
                }
                Err(payload) => {
                    let message = format!("task panicked: {}", panic_message(payload.as_ref()));
                    task_manager
                        .finish_task(task_id, TaskStatus::Failed, Some(message))
                        .await
                }
            }

            task_manager.active_handles.lock().await.remove(&task_id);
            task_manager.cleanup_old_tasks(task_manager.retention).await;
        });
        handles.insert(task_id, handle);
        drop(handles);

        tracing::info!(task_id = %task_id, task_type = ?task_type, "submitted task");
        Ok(task_id)
    }

    pub async fn get_task(&self, task_id: Uuid) -> Option<TaskInfo> {
        self.tasks.read().await.get(&task_id).cloned()
    }

    pub async fn get_active_tasks(&self) -> Vec<TaskInfo> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|task| task.is_active())
            .cloned()
            .collect()
    }

    async fn start_task(&self, task_id: Uuid) {
        if let Some(task) = self.tasks.write().await.get_mut(&task_id) {
            task.status = TaskStatus::Running;
            task.started_at = Some(Utc::now());
            tracing::debug!(task_id = %task_id, "started task");
        }
    }

    async fn finish_task(&self, task_id: Uuid, status: TaskStatus, error: Option<String>) {
        if let Some(task) = self.tasks.write().await.get_mut(&task_id) {
            match &error {
                Some(e) => tracing::warn!(task_id = %task_id, error = %e, "task failed"),
                None => tracing::info!(task_id = %task_id, status = ?status, "task finished"),
            }
            task.finish(status, error);
        }
    }

    async fn update_task_progress(&self, task_id: Uuid, progress: f32, message: Option<String>) {
        if let Some(task) = self.tasks.write().await.get_mut(&task_id) {
            task.progress = progress.clamp(0.0, 1.0);
            task.message = message;
        }
    }

    /// Drop finished tasks that completed more than `max_age` ago.
    pub async fn cleanup_old_tasks(&self, max_age: chrono::Duration) -> usize {
        let cutoff_time = Utc::now() - max_age;
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| {
            !(task.is_finished() && task.completed_at.is_some_and(|completed| completed <= cutoff_time))
        });
        let removed_count = before - tasks.len();

        if removed_count > 0 {
            tracing::debug!(removed = removed_count, "pruned finished tasks");
        }
        removed_count
    }

    /// Wait for all active tasks to complete (tests and shutdown).
    pub async fn wait_for_all_tasks(&self) {
        loop {
            let active_count = self
                .tasks
                .read()
                .await
                .values()
                .filter(|task| task.is_active())
                .count();

            if active_count == 0 {
                break;
            }

            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    }

    /// Abort whatever is still running and mark it cancelled.
    pub async fn shutdown(&self) {
        tracing::info!("shutting down task manager");
        self.concurrency_semaphore.close();

        let drained: Vec<(Uuid, JoinHandle<()>)> =
            self.active_handles.lock().await.drain().collect();
        for (task_id, handle) in drained {
            handle.abort();
            let still_active = self
                .tasks
                .read()
                .await
                .get(&task_id)
                .is_some_and(|task| task.is_active());
            if still_active {
                self.finish_task(task_id, TaskStatus::Cancelled, None).await;
            }
        }

        tracing::info!("task manager shutdown complete");
    }
}

impl Clone for TaskManager {
    fn clone(&self) -> Self {
        Self {
            max_concurrent: self.max_concurrent,
            retention: self.retention,
            tasks: Arc::clone(&self.tasks),
            active_handles: Arc::clone(&self.active_handles),
            concurrency_semaphore: Arc::clone(&self.concurrency_semaphore),
        }
    }
}

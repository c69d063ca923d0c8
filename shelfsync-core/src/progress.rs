// Task progress registry backed by the `progress` collection
use crate::data::{DocumentStore, PROGRESS};
use crate::error::{CoreError, Result};
use crate::model::{Task, TaskStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Partial update for [`TaskRegistry::advance`]; unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub done: Option<usize>,
    pub total: Option<usize>,
    pub status: Option<TaskStatus>,
    pub error: Option<String>,
    pub summary: Option<String>,
    pub products_found: Option<usize>,
}

impl TaskUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn done(mut self, done: usize) -> Self {
        self.done = Some(done);
        self
    }

    pub fn total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn products_found(mut self, count: usize) -> Self {
        self.products_found = Some(count);
        self
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProgressDoc {
    #[serde(default)]
    tasks: HashMap<String, Task>,
}

/// Durable `task_id -> Task` map. Every call reads the collection and writes
/// it back in full.
#[derive(Clone)]
pub struct TaskRegistry {
    store: Arc<dyn DocumentStore>,
}

impl TaskRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn load_all(&self) -> Result<HashMap<String, Task>> {
        match self.store.load(PROGRESS)? {
            Some(doc) => Ok(serde_json::from_value::<ProgressDoc>(doc)?.tasks),
            None => Ok(HashMap::new()),
        }
    }

    fn save_all(&self, tasks: &HashMap<String, Task>) -> Result<()> {
        self.store.save(PROGRESS, &json!({ "tasks": tasks }))
    }

    pub fn create(&self, id: &str, kind: &str, total: usize) -> Result<Task> {
        let mut tasks = self.load_all()?;
        if tasks.contains_key(id) {
            return Err(CoreError::DuplicateTask(id.to_string()));
        }
        let task = Task::new(id, kind, total);
        tasks.insert(id.to_string(), task.clone());
        self.save_all(&tasks)?;
        debug!("Created task {} ({}, total {})", id, kind, total);
        Ok(task)
    }

    /// Apply a partial update.
    ///
    /// A transition into `running` from any other status clears the error
    /// list and allows `done` to restart; otherwise `done` never decreases.
    /// An error in the same update is appended after the clearing. Unknown
    /// ids get a placeholder task of kind `unknown`.
    pub fn advance(&self, id: &str, update: TaskUpdate) -> Result<Task> {
        let mut tasks = self.load_all()?;
        let task = tasks.entry(id.to_string()).or_insert_with(|| {
            warn!("Progress update for unknown task {}, creating it", id);
            Task::new(id, "unknown", 0)
        });

        let mut restarted = false;
        if let Some(status) = update.status {
            if status == TaskStatus::Running && task.status != TaskStatus::Running {
                task.errors.clear();
                restarted = true;
            }
            task.status = status;
        }
        if let Some(total) = update.total {
            task.total = total;
        }
        if let Some(done) = update.done {
            task.done = if restarted { done } else { done.max(task.done) };
        }
        if let Some(error) = update.error {
            task.errors.push(error);
        }
        if let Some(summary) = update.summary {
            task.summary = Some(summary);
        }
        if let Some(count) = update.products_found {
            task.products_found = Some(count);
        }
        task.updated_at = Utc::now();

        let snapshot = task.clone();
        self.save_all(&tasks)?;
        Ok(snapshot)
    }

    pub fn get(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.load_all()?.remove(id))
    }

    /// All tasks, newest first.
    pub fn list(&self) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self.load_all()?.into_values().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }
}

/// Per-unit outcome counter for a batch job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitTally {
    pub succeeded: usize,
    pub failed: usize,
}

impl UnitTally {
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// `failed` only when at least one unit ran and none succeeded.
    pub fn final_status(&self) -> TaskStatus {
        if self.failed > 0 && self.succeeded == 0 {
            TaskStatus::Failed
        } else {
            TaskStatus::Finished
        }
    }
}

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use data_model::{ApplicationId, TaskDescriptor, TaskId};
use tracing::debug;

/// Records tasks as created before they are launched, so they are visible
/// cluster-wide even if the launch is still in flight.
pub trait TaskTracker: Send + Sync {
    fn created(&self, application_id: &ApplicationId, task: &TaskDescriptor) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryTaskTracker {
    tasks_by_application: DashMap<ApplicationId, Vec<TaskDescriptor>>,
}

impl InMemoryTaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks_for(&self, application_id: &ApplicationId) -> Vec<TaskDescriptor> {
        self.tasks_by_application
            .get(application_id)
            .map(|tasks| tasks.value().clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, application_id: &ApplicationId, task_id: &TaskId) -> bool {
        self.tasks_by_application
            .get(application_id)
            .is_some_and(|tasks| tasks.iter().any(|task| &task.id == task_id))
    }

    pub fn count(&self) -> usize {
        self.tasks_by_application
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }
}

impl TaskTracker for InMemoryTaskTracker {
    fn created(&self, application_id: &ApplicationId, task: &TaskDescriptor) -> Result<()> {
        let mut tasks = self
            .tasks_by_application
            .entry(application_id.clone())
            .or_default();
        if tasks.iter().any(|existing| existing.id == task.id) {
            return Err(anyhow!(
                "task {} of application {} is already tracked",
                task.id,
                application_id
            ));
        }
        debug!(
            application_id = %application_id,
            task_id = %task.id,
            offer_id = %task.offer_id,
            "task created"
        );
        tasks.push(task.clone());
        Ok(())
    }
}

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use data_model::{Application, ApplicationId, Offer, TaskDescriptor};
use offer_matcher_utils::OptionInspectNone;
use tracing::{debug, trace};

use crate::task_factory::TaskFactory;

/// An application claimed from the queue together with the task built for it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedTask {
    pub application: Application,
    pub task: TaskDescriptor,
}

/// Source of pending work. `poll_matching` claims the application it returns,
/// so the same instance is never handed out twice, including to concurrently
/// processed batches.
pub trait ApplicationQueue: Send + Sync {
    fn poll_matching(&self, offer: &Offer) -> Result<Option<MatchedTask>>;
}

#[derive(Debug, Clone)]
struct QueuedApplication {
    application: Application,
    remaining: u32,
}

/// FIFO queue of applications with the number of instances still to launch.
pub struct InMemoryApplicationQueue {
    task_factory: Arc<dyn TaskFactory>,
    queue: Mutex<VecDeque<QueuedApplication>>,
}

impl InMemoryApplicationQueue {
    pub fn new(task_factory: Arc<dyn TaskFactory>) -> Self {
        Self {
            task_factory,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn add(&self, application: Application) -> Result<()> {
        if application.instances == 0 {
            debug!(
                application_id = %application.id,
                "application has no instances to launch, skipping"
            );
            return Ok(());
        }
        let mut queue = self.lock()?;
        if let Some(queued) = queue
            .iter_mut()
            .find(|queued| queued.application.id == application.id)
        {
            queued.remaining = queued.remaining.saturating_add(application.instances);
            queued.application = application;
            return Ok(());
        }
        queue.push_back(QueuedApplication {
            remaining: application.instances,
            application,
        });
        Ok(())
    }

    /// Instances of `application_id` still waiting for an offer.
    pub fn remaining(&self, application_id: &ApplicationId) -> Result<u32> {
        Ok(self
            .lock()?
            .iter()
            .find(|queued| &queued.application.id == application_id)
            .map(|queued| queued.remaining)
            .unwrap_or(0))
    }

    /// Total instances waiting across all applications.
    pub fn count(&self) -> Result<u64> {
        Ok(self
            .lock()?
            .iter()
            .map(|queued| queued.remaining as u64)
            .sum())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<QueuedApplication>>> {
        self.queue
            .lock()
            .map_err(|e| anyhow!("application queue lock poisoned: {}", e))
    }
}

impl ApplicationQueue for InMemoryApplicationQueue {
    fn poll_matching(&self, offer: &Offer) -> Result<Option<MatchedTask>> {
        let mut queue = self.lock()?;

        let mut matched = None;
        for (index, queued) in queue.iter().enumerate() {
            if let Some(task) = self.task_factory.new_task(&queued.application, offer)? {
                matched = Some((index, task));
                break;
            }
        }

        let Some((index, task)) = matched.inspect_none(|| {
            trace!(
                offer_id = %offer.id,
                queued = queue.len(),
                "no queued application fits the offer"
            )
        }) else {
            return Ok(None);
        };

        let application = queue[index].application.clone();
        queue[index].remaining -= 1;
        if queue[index].remaining == 0 {
            queue.remove(index);
        }
        Ok(Some(MatchedTask { application, task }))
    }
}

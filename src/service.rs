use std::sync::Arc;

use anyhow::Result;
use data_model::{Application, Offer};
use processor::{
    offer_matcher::{CommitSummary, OfferMatcher},
    queue::InMemoryApplicationQueue,
    task_factory::DefaultTaskFactory,
    task_tracker::InMemoryTaskTracker,
    transport::{OfferCommand, RecordingTransport},
};
use tracing::{debug, info};

use crate::{batch::OfferBatch, config::ServerConfig};

/// What a processed batch decided.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub summary: CommitSummary,
    pub commands: Vec<OfferCommand>,
    // Instances still queued after the batch.
    pub pending_instances: u64,
    // Tasks created across every batch this service has processed.
    pub tracked_tasks: usize,
}

pub struct Service {
    pub config: ServerConfig,
    pub queue: Arc<InMemoryApplicationQueue>,
    pub task_tracker: Arc<InMemoryTaskTracker>,
    pub offer_matcher: OfferMatcher,
}

impl Service {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let queue = Arc::new(InMemoryApplicationQueue::new(Arc::new(
            DefaultTaskFactory::new(),
        )));
        let task_tracker = Arc::new(InMemoryTaskTracker::new());
        let offer_matcher =
            OfferMatcher::new(&config.offer_matcher, queue.clone(), task_tracker.clone())?;
        Ok(Self {
            config,
            queue,
            task_tracker,
            offer_matcher,
        })
    }

    pub fn enqueue(&self, applications: Vec<Application>) -> Result<()> {
        for application in applications {
            info!(
                application_id = %application.id,
                instances = application.instances,
                "enqueueing application"
            );
            self.queue.add(application)?;
        }
        Ok(())
    }

    pub fn process_offers(&self, offers: Vec<Offer>) -> Result<BatchOutcome> {
        info!(
            offers = offers.len(),
            max_tasks_per_offer = self.config.offer_matcher.max_tasks_per_offer,
            "processing offer batch"
        );
        if self.queue.is_empty()? {
            debug!("no applications queued, every offer will be declined");
        }
        let transport = RecordingTransport::new();
        let summary = self.offer_matcher.process_offers(&transport, offers)?;
        Ok(BatchOutcome {
            summary,
            commands: transport.commands()?,
            pending_instances: self.queue.count()?,
            tracked_tasks: self.task_tracker.count(),
        })
    }

    pub fn run_batch(&self, batch: OfferBatch) -> Result<BatchOutcome> {
        self.enqueue(batch.applications)?;
        self.process_offers(batch.offers)
    }
}

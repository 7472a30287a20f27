use std::sync::Arc;

use anyhow::{anyhow, Result};
use data_model::{resources, Offer, TaskDescriptor};
use metrics::{offer_matcher::Metrics, Timer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::{
    offer_usage::{OfferUsage, UsagePartition},
    queue::{ApplicationQueue, MatchedTask},
    task_tracker::TaskTracker,
    transport::OfferTransport,
};

fn default_max_tasks_per_offer() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfferMatcherConfig {
    // Upper bound on matching rounds, and so on tasks packed onto one offer
    // per batch.
    #[serde(default = "default_max_tasks_per_offer")]
    pub max_tasks_per_offer: u32,
}

impl Default for OfferMatcherConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_offer: default_max_tasks_per_offer(),
        }
    }
}

impl OfferMatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_tasks_per_offer < 1 {
            return Err(anyhow!(
                "max_tasks_per_offer must be at least 1, got {}",
                self.max_tasks_per_offer
            ));
        }
        Ok(())
    }
}

/// Totals of one committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub offers_used: u64,
    pub offers_declined: u64,
    pub tasks_launched: u64,
}

/// Packs queued applications onto a batch of offers, one task per offer per
/// round, and answers every offer with a launch or a decline.
pub struct OfferMatcher {
    max_tasks_per_offer: u32,
    queue: Arc<dyn ApplicationQueue>,
    task_tracker: Arc<dyn TaskTracker>,
    metrics: Metrics,
}

impl OfferMatcher {
    pub fn new(
        config: &OfferMatcherConfig,
        queue: Arc<dyn ApplicationQueue>,
        task_tracker: Arc<dyn TaskTracker>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            max_tasks_per_offer: config.max_tasks_per_offer,
            queue,
            task_tracker,
            metrics: Metrics::new(),
        })
    }

    /// Matches the batch and commits the result through `transport`.
    ///
    /// Matching failures are contained per offer and end in a decline. A
    /// transport failure stops the commit and is returned; commands issued
    /// before it stay issued.
    #[tracing::instrument(skip_all, fields(offers = offers.len()))]
    pub fn process_offers(
        &self,
        transport: &dyn OfferTransport,
        offers: Vec<Offer>,
    ) -> Result<CommitSummary> {
        let partition = {
            let _timer = Timer::start(&self.metrics.match_offers_duration);
            self.match_offers(offers)
        };
        let _timer = Timer::start(&self.metrics.commit_duration);
        self.commit(transport, &partition)
    }

    /// Runs matching rounds until no offer is matchable or
    /// `max_tasks_per_offer` rounds have run.
    pub fn match_offers(&self, offers: Vec<Offer>) -> UsagePartition {
        let mut partition = UsagePartition::from_offers(offers);
        let mut rounds = 0;
        while partition.has_matchable() && rounds < self.max_tasks_per_offer {
            rounds += 1;
            partition = self.match_round(&partition);
            trace!(
                round = rounds,
                matchable = partition.matchable().len(),
                exhausted = partition.exhausted().len(),
                "matching round finished"
            );
        }
        debug!(
            rounds,
            offers = partition.len(),
            still_matchable = partition.matchable().len(),
            "offer matching finished"
        );
        partition
    }

    fn match_round(&self, partition: &UsagePartition) -> UsagePartition {
        partition
            .matchable()
            .iter()
            .fold(partition.next_round(), |next, usage| {
                match self.match_offer(usage) {
                    Ok(Some(updated)) => next.add_matchable(updated),
                    Ok(None) => next.add_exhausted(usage.clone()),
                    Err(err) => {
                        self.metrics.offer_match_errors.add(1, &[]);
                        warn!(
                            offer_id = %usage.offer_id(),
                            scheduled_tasks = usage.scheduled_tasks.len(),
                            "failed to match offer, treating it as exhausted: {:?}",
                            err
                        );
                        next.add_exhausted(usage.clone())
                    }
                }
            })
    }

    fn match_offer(&self, usage: &OfferUsage) -> Result<Option<OfferUsage>> {
        let Some(MatchedTask { application, task }) =
            self.queue.poll_matching(&usage.remaining_offer)?
        else {
            trace!(
                offer_id = %usage.offer_id(),
                remaining = resources::render(&usage.remaining_offer.resources),
                "no application matches the remaining offer"
            );
            return Ok(None);
        };

        self.task_tracker.created(&application.id, &task)?;
        debug!(
            offer_id = %usage.offer_id(),
            application_id = %application.id,
            task_id = %task.id,
            consumed = resources::render(&task.resources),
            "packed task onto offer"
        );
        Ok(Some(usage.add_task(task)))
    }

    /// Issues one launch per offer that received tasks and one decline per
    /// offer that did not, in partition order.
    #[tracing::instrument(skip_all, fields(offers = partition.len()))]
    pub fn commit(
        &self,
        transport: &dyn OfferTransport,
        partition: &UsagePartition,
    ) -> Result<CommitSummary> {
        if partition.is_empty() {
            debug!("empty offer batch, nothing to commit");
        }
        let mut summary = CommitSummary::default();
        for usage in partition.all() {
            if usage.has_tasks() {
                let tasks: Vec<TaskDescriptor> = usage.scheduled_tasks.iter().cloned().collect();
                let launched = tasks.len() as u64;
                debug!(
                    offer_id = %usage.offer_id(),
                    tasks = launched,
                    remaining = resources::render(&usage.remaining_offer.resources),
                    "launching tasks on offer"
                );
                transport.launch_tasks(usage.offer_id(), tasks)?;
                summary.offers_used += 1;
                summary.tasks_launched += launched;
                self.metrics.tasks_launched_per_offer.record(launched, &[]);
            } else {
                debug!(offer_id = %usage.offer_id(), "declining unused offer");
                transport.decline_offer(usage.offer_id())?;
                summary.offers_declined += 1;
            }
        }

        self.metrics.tasks_launched.add(summary.tasks_launched, &[]);
        self.metrics.offers_used.add(summary.offers_used, &[]);
        self.metrics.offers_declined.add(summary.offers_declined, &[]);
        info!(
            offers_used = summary.offers_used,
            offers_declined = summary.offers_declined,
            tasks_launched = summary.tasks_launched,
            "committed offer batch"
        );
        Ok(summary)
    }
}

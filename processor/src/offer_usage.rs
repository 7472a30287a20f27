use data_model::{Offer, OfferId, TaskDescriptor};

/// An offer together with the tasks packed onto it so far in the current
/// batch. `remaining_offer` is the original offer minus the consumption of
/// every task in `scheduled_tasks`.
///
/// Transitions never mutate; they return a new usage. The task list is an
/// `im::Vector`, so the copies share structure.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferUsage {
    pub remaining_offer: Offer,
    pub scheduled_tasks: im::Vector<TaskDescriptor>,
}

impl OfferUsage {
    pub fn new(offer: Offer) -> Self {
        Self {
            remaining_offer: offer,
            scheduled_tasks: im::Vector::new(),
        }
    }

    pub fn offer_id(&self) -> &OfferId {
        &self.remaining_offer.id
    }

    pub fn add_task(&self, task: TaskDescriptor) -> Self {
        let remaining_offer = self.remaining_offer.deduct(&task.resources);
        let mut scheduled_tasks = self.scheduled_tasks.clone();
        scheduled_tasks.push_back(task);
        Self {
            remaining_offer,
            scheduled_tasks,
        }
    }

    pub fn has_tasks(&self) -> bool {
        !self.scheduled_tasks.is_empty()
    }
}

/// Splits the usages of a batch into offers that may still take another task
/// and offers that are exhausted for the rest of the batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsagePartition {
    matchable: im::Vector<OfferUsage>,
    exhausted: im::Vector<OfferUsage>,
}

impl UsagePartition {
    /// Every offer starts out matchable.
    pub fn from_offers(offers: impl IntoIterator<Item = Offer>) -> Self {
        Self {
            matchable: offers.into_iter().map(OfferUsage::new).collect(),
            exhausted: im::Vector::new(),
        }
    }

    /// The starting point for the next round: no matchable usages yet and
    /// every usage exhausted so far carried over.
    pub fn next_round(&self) -> Self {
        Self {
            matchable: im::Vector::new(),
            exhausted: self.exhausted.clone(),
        }
    }

    pub fn add_matchable(&self, usage: OfferUsage) -> Self {
        let mut matchable = self.matchable.clone();
        matchable.push_back(usage);
        Self {
            matchable,
            exhausted: self.exhausted.clone(),
        }
    }

    pub fn add_exhausted(&self, usage: OfferUsage) -> Self {
        let mut exhausted = self.exhausted.clone();
        exhausted.push_back(usage);
        Self {
            matchable: self.matchable.clone(),
            exhausted,
        }
    }

    pub fn matchable(&self) -> &im::Vector<OfferUsage> {
        &self.matchable
    }

    pub fn exhausted(&self) -> &im::Vector<OfferUsage> {
        &self.exhausted
    }

    pub fn has_matchable(&self) -> bool {
        !self.matchable.is_empty()
    }

    /// Matchable usages followed by exhausted ones, each in insertion order.
    pub fn all(&self) -> impl Iterator<Item = &OfferUsage> {
        self.matchable.iter().chain(self.exhausted.iter())
    }

    pub fn len(&self) -> usize {
        self.matchable.len() + self.exhausted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use data_model::{
        resources::{self, CPUS, DEFAULT_ROLE, MEM},
        test_objects::tests::{mock_application, mock_offer, mock_task},
    };

    use super::*;

    #[test]
    fn test_add_task_deducts_and_appends() {
        let offer = mock_offer("offer-1", 4.0, 1024.0);
        let app = mock_application("web", 1.0, 256.0, 2);
        let usage = OfferUsage::new(offer.clone());

        let first = usage.add_task(mock_task(&app, &offer));
        let second = first.add_task(mock_task(&app, &first.remaining_offer));

        assert_eq!(second.scheduled_tasks.len(), 2);
        assert_eq!(
            resources::scalar(&second.remaining_offer.resources, CPUS, DEFAULT_ROLE),
            2.0
        );
        assert_eq!(
            resources::scalar(&second.remaining_offer.resources, MEM, DEFAULT_ROLE),
            512.0
        );

        // earlier values are untouched
        assert!(usage.scheduled_tasks.is_empty());
        assert_eq!(usage.remaining_offer, offer);
        assert_eq!(first.scheduled_tasks.len(), 1);
        assert_eq!(second.offer_id(), &offer.id);
    }

    #[test]
    fn test_add_task_matches_combined_deduction() {
        let offer = mock_offer("offer-1", 4.0, 1024.0);
        let small = mock_application("small", 0.5, 128.0, 1);
        let large = mock_application("large", 2.0, 512.0, 1);
        let t1 = mock_task(&small, &offer);
        let t2 = mock_task(&large, &offer);

        let sequential = OfferUsage::new(offer.clone())
            .add_task(t1.clone())
            .add_task(t2.clone());
        let combined: Vec<_> = t1
            .resources
            .iter()
            .chain(t2.resources.iter())
            .cloned()
            .collect();

        assert_eq!(sequential.remaining_offer, offer.deduct(&combined));
    }

    #[test]
    fn test_partition_ordering() {
        let partition = UsagePartition::from_offers(vec![
            mock_offer("a", 1.0, 1.0),
            mock_offer("b", 1.0, 1.0),
        ]);
        assert_eq!(partition.matchable().len(), 2);
        assert!(partition.exhausted().is_empty());

        let next = partition
            .next_round()
            .add_exhausted(OfferUsage::new(mock_offer("a", 1.0, 1.0)))
            .add_matchable(OfferUsage::new(mock_offer("b", 1.0, 1.0)))
            .add_exhausted(OfferUsage::new(mock_offer("c", 1.0, 1.0)));

        let ids: Vec<_> = next.all().map(|u| u.offer_id().get().to_string()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(next.len(), 3);

        // the round before is not affected
        assert_eq!(partition.len(), 2);
        assert!(partition.exhausted().is_empty());
    }

    #[test]
    fn test_next_round_carries_exhausted_only() {
        let partition = UsagePartition::default()
            .add_matchable(OfferUsage::new(mock_offer("a", 1.0, 1.0)))
            .add_exhausted(OfferUsage::new(mock_offer("b", 1.0, 1.0)));

        let next = partition.next_round();
        assert!(!next.has_matchable());
        assert_eq!(next.exhausted().len(), 1);
        assert_eq!(next.exhausted()[0].offer_id().get(), "b");
    }

    #[test]
    fn test_empty_partition() {
        let partition = UsagePartition::from_offers(Vec::<Offer>::new());
        assert!(partition.is_empty());
        assert!(!partition.has_matchable());
        assert_eq!(partition.all().count(), 0);
    }
}

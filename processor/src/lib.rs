pub mod offer_matcher;
pub mod offer_usage;
pub mod queue;
pub mod task_factory;
pub mod task_tracker;
pub mod transport;

use std::{fmt, sync::Mutex};

use anyhow::{anyhow, Result};
use data_model::{OfferId, TaskDescriptor};
use tracing::info;

/// The resource manager side of a batch: every offer gets exactly one launch
/// or decline.
pub trait OfferTransport {
    fn launch_tasks(&self, offer_id: &OfferId, tasks: Vec<TaskDescriptor>) -> Result<()>;

    fn decline_offer(&self, offer_id: &OfferId) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum OfferCommand {
    Launch {
        offer_id: OfferId,
        tasks: Vec<TaskDescriptor>,
    },
    Decline {
        offer_id: OfferId,
    },
}

impl OfferCommand {
    pub fn offer_id(&self) -> &OfferId {
        match self {
            OfferCommand::Launch { offer_id, .. } => offer_id,
            OfferCommand::Decline { offer_id } => offer_id,
        }
    }

    pub fn is_launch(&self) -> bool {
        matches!(self, OfferCommand::Launch { .. })
    }
}

impl fmt::Display for OfferCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferCommand::Launch { offer_id, tasks } => {
                let task_ids: Vec<&str> = tasks.iter().map(|task| task.id.get()).collect();
                write!(f, "launch {}: [{}]", offer_id, task_ids.join(", "))
            }
            OfferCommand::Decline { offer_id } => write!(f, "decline {}", offer_id),
        }
    }
}

/// Keeps every command in the order it was issued.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    commands: Mutex<Vec<OfferCommand>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Result<Vec<OfferCommand>> {
        Ok(self
            .commands
            .lock()
            .map_err(|e| anyhow!("transport lock poisoned: {}", e))?
            .clone())
    }

    fn record(&self, command: OfferCommand) -> Result<()> {
        self.commands
            .lock()
            .map_err(|e| anyhow!("transport lock poisoned: {}", e))?
            .push(command);
        Ok(())
    }
}

impl OfferTransport for RecordingTransport {
    fn launch_tasks(&self, offer_id: &OfferId, tasks: Vec<TaskDescriptor>) -> Result<()> {
        info!(
            offer_id = %offer_id,
            tasks = tasks.len(),
            task_ids = ?tasks.iter().map(|task| task.id.get()).collect::<Vec<_>>(),
            "launch tasks"
        );
        self.record(OfferCommand::Launch {
            offer_id: offer_id.clone(),
            tasks,
        })
    }

    fn decline_offer(&self, offer_id: &OfferId) -> Result<()> {
        info!(offer_id = %offer_id, "decline offer");
        self.record(OfferCommand::Decline {
            offer_id: offer_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use data_model::{
        test_objects::tests::{mock_application, mock_offer, mock_task},
        TaskId,
    };

    use super::*;

    #[test]
    fn test_records_commands_in_order() {
        let transport = RecordingTransport::new();
        let offer = mock_offer("offer-1", 4.0, 1024.0);
        let mut task = mock_task(&mock_application("web", 1.0, 128.0, 1), &offer);
        task.id = TaskId::from("web.1");

        transport.launch_tasks(&offer.id, vec![task]).unwrap();
        transport.decline_offer(&OfferId::from("offer-2")).unwrap();

        let commands = transport.commands().unwrap();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].is_launch());
        assert_eq!(commands[1].offer_id(), &OfferId::from("offer-2"));
        assert_eq!(commands[0].to_string(), "launch offer-1: [web.1]");
        assert_eq!(commands[1].to_string(), "decline offer-2");
    }
}

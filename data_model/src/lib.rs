pub mod resources;
pub mod test_objects;

use std::fmt::{self, Display};

use anyhow::{anyhow, Result};
use derive_builder::Builder;
use offer_matcher_utils::get_epoch_time_in_ms;
use resources::{default_role, Resource};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct OfferId(String);

impl Display for OfferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OfferId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn get(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OfferId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct AgentId(String);

impl Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AgentId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn get(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct ApplicationId(String);

impl Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ApplicationId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn get(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ApplicationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// `<application id>.<random suffix>`, so a task id always names its
    /// application.
    pub fn for_application(application_id: &ApplicationId) -> Self {
        Self(format!("{}.{}", application_id, nanoid::nanoid!()))
    }

    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Idle capacity on one agent, as advertised by the resource manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Builder)]
pub struct Offer {
    pub id: OfferId,
    pub agent_id: AgentId,
    #[builder(default)]
    #[serde(default)]
    pub hostname: String,
    #[builder(default)]
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Offer {
    /// The offer that is left after `consumed` has been carved out of it.
    pub fn deduct(&self, consumed: &[Resource]) -> Offer {
        Offer {
            id: self.id.clone(),
            agent_id: self.agent_id.clone(),
            hostname: self.hostname.clone(),
            resources: resources::deduct(&self.resources, consumed),
        }
    }
}

impl Display for Offer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Offer(id: {}, agent: {}, host: {}, resources: {})",
            self.id,
            self.agent_id,
            self.hostname,
            resources::render(&self.resources)
        )
    }
}

fn default_instances() -> u32 {
    1
}

/// A service definition. `instances` is how many tasks of it are wanted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Builder)]
pub struct Application {
    pub id: ApplicationId,
    #[builder(default)]
    #[serde(default)]
    pub cpus: f64,
    #[builder(default)]
    #[serde(default)]
    pub mem: f64,
    #[builder(default)]
    #[serde(default)]
    pub disk: f64,
    // Number of host ports each instance needs.
    #[builder(default)]
    #[serde(default)]
    pub ports: u32,
    #[builder(default = "1")]
    #[serde(default = "default_instances")]
    pub instances: u32,
    #[builder(default = "default_role()")]
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Builder)]
#[builder(build_fn(skip))]
pub struct TaskDescriptor {
    pub id: TaskId,
    pub application_id: ApplicationId,
    pub offer_id: OfferId,
    pub agent_id: AgentId,
    pub hostname: String,
    // Consumption carved out of the offer when this task is packed onto it.
    pub resources: Vec<Resource>,
    pub host_ports: Vec<u64>,
    pub created_at: u64,
}

impl TaskDescriptorBuilder {
    pub fn build(&self) -> Result<TaskDescriptor> {
        let application_id = self
            .application_id
            .clone()
            .ok_or(anyhow!("application id is not present"))?;
        let offer_id = self
            .offer_id
            .clone()
            .ok_or(anyhow!("offer id is not present"))?;
        let agent_id = self
            .agent_id
            .clone()
            .ok_or(anyhow!("agent id is not present"))?;
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| TaskId::for_application(&application_id));
        Ok(TaskDescriptor {
            id,
            application_id,
            offer_id,
            agent_id,
            hostname: self.hostname.clone().unwrap_or_default(),
            resources: self.resources.clone().unwrap_or_default(),
            host_ports: self.host_ports.clone().unwrap_or_default(),
            created_at: self.created_at.unwrap_or_else(get_epoch_time_in_ms),
        })
    }
}

impl Display for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Task(id: {}, application: {}, offer: {}, resources: {})",
            self.id,
            self.application_id,
            self.offer_id,
            resources::render(&self.resources)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Resource, CPUS, MEM};

    #[test]
    fn test_task_builder_derives_id_from_application() {
        let task = TaskDescriptorBuilder::default()
            .application_id(ApplicationId::from("web"))
            .offer_id(OfferId::from("offer-1"))
            .agent_id(AgentId::from("agent-1"))
            .resources(vec![Resource::scalar(CPUS, 1.0)])
            .build()
            .unwrap();

        assert!(task.id.get().starts_with("web."));
        assert!(task.created_at > 0);
        assert!(task.host_ports.is_empty());
    }

    #[test]
    fn test_task_builder_requires_offer() {
        let result = TaskDescriptorBuilder::default()
            .application_id(ApplicationId::from("web"))
            .agent_id(AgentId::from("agent-1"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_offer_deduct_keeps_identity() {
        let offer = OfferBuilder::default()
            .id(OfferId::from("offer-1"))
            .agent_id(AgentId::from("agent-1"))
            .hostname("host-1".to_string())
            .resources(vec![Resource::scalar(CPUS, 2.0), Resource::scalar(MEM, 64.0)])
            .build()
            .unwrap();

        let remaining = offer.deduct(&[Resource::scalar(CPUS, 0.5)]);
        assert_eq!(remaining.id, offer.id);
        assert_eq!(remaining.agent_id, offer.agent_id);
        assert_eq!(
            remaining.resources,
            vec![Resource::scalar(CPUS, 1.5), Resource::scalar(MEM, 64.0)]
        );
        // the original offer is untouched
        assert_eq!(resources::scalar(&offer.resources, CPUS, "*"), 2.0);
    }

    #[test]
    fn test_application_defaults_from_yaml() {
        let app: Application = serde_yaml::from_str("id: web\ncpus: 0.5\nmem: 128").unwrap();
        assert_eq!(app.id, ApplicationId::from("web"));
        assert_eq!(app.instances, 1);
        assert_eq!(app.ports, 0);
        assert_eq!(app.role, "*");
    }
}

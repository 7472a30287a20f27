use anyhow::Result;
use data_model::{
    resources::{self, Resource, ValueRange, CPUS, DISK, MEM, PORTS},
    Application,
    Offer,
    TaskDescriptor,
    TaskDescriptorBuilder,
};
use tracing::trace;

/// Decides whether an application fits an offer and, if it does, builds the
/// task that would run it there.
pub trait TaskFactory: Send + Sync {
    fn new_task(&self, application: &Application, offer: &Offer) -> Result<Option<TaskDescriptor>>;
}

/// Fits on scalar cpus/mem/disk and on the number of host ports, all
/// restricted to resources of the application's role.
#[derive(Debug, Default)]
pub struct DefaultTaskFactory {}

impl DefaultTaskFactory {
    pub fn new() -> Self {
        Self {}
    }
}

impl TaskFactory for DefaultTaskFactory {
    fn new_task(&self, application: &Application, offer: &Offer) -> Result<Option<TaskDescriptor>> {
        let mut consumption: Vec<Resource> = [
            (CPUS, application.cpus),
            (MEM, application.mem),
            (DISK, application.disk),
        ]
        .into_iter()
        .filter(|(_, amount)| *amount > 0.0)
        .map(|(name, amount)| Resource::scalar(name, amount).with_role(&application.role))
        .collect();

        if !resources::contains(&offer.resources, &consumption) {
            trace!(
                application_id = %application.id,
                offer_id = %offer.id,
                offered = resources::render(&offer.resources),
                "offer does not have enough scalar resources"
            );
            return Ok(None);
        }

        let Some(host_ports) = pick_ports(offer, application.ports, &application.role) else {
            trace!(
                application_id = %application.id,
                offer_id = %offer.id,
                requested_ports = application.ports,
                "offer does not have enough ports"
            );
            return Ok(None);
        };
        if !host_ports.is_empty() {
            consumption.push(
                Resource::ranges(PORTS, to_ranges(&host_ports)).with_role(&application.role),
            );
        }

        let task = TaskDescriptorBuilder::default()
            .application_id(application.id.clone())
            .offer_id(offer.id.clone())
            .agent_id(offer.agent_id.clone())
            .hostname(offer.hostname.clone())
            .resources(consumption)
            .host_ports(host_ports)
            .build()?;
        Ok(Some(task))
    }
}

// Lowest `count` distinct ports of the offer, or None if it has fewer.
// Overlapping ranges are walked once.
fn pick_ports(offer: &Offer, count: u32, role: &str) -> Option<Vec<u64>> {
    let count = count as usize;
    let mut available = resources::ranges(&offer.resources, PORTS, role);
    available.sort_by_key(|range| range.begin);

    let mut ports: Vec<u64> = Vec::with_capacity(count);
    for range in &available {
        let start = match ports.last() {
            Some(&last) => range.begin.max(last + 1),
            None => range.begin,
        };
        ports.extend((start..=range.end).take(count - ports.len()));
        if ports.len() == count {
            break;
        }
    }
    (ports.len() == count).then_some(ports)
}

// Collapses sorted ports into contiguous ranges.
fn to_ranges(ports: &[u64]) -> Vec<ValueRange> {
    let mut ranges: Vec<ValueRange> = Vec::new();
    for &port in ports {
        match ranges.last_mut() {
            Some(last) if last.end + 1 == port => last.end = port,
            _ => ranges.push(ValueRange::new(port, port)),
        }
    }
    ranges
}

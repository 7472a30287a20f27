pub mod tests {
    use crate::{
        resources::{Resource, ValueRange, CPUS, MEM, PORTS},
        AgentId,
        Application,
        ApplicationBuilder,
        ApplicationId,
        Offer,
        OfferBuilder,
        OfferId,
        TaskDescriptor,
        TaskDescriptorBuilder,
    };

    pub const TEST_AGENT_ID: &str = "test_agent_1";
    pub const TEST_HOSTNAME: &str = "test-host-1";
    pub const TEST_PORT_RANGE: (u64, u64) = (31000, 31009);

    pub fn mock_offer(id: &str, cpus: f64, mem: f64) -> Offer {
        OfferBuilder::default()
            .id(OfferId::from(id))
            .agent_id(AgentId::from(TEST_AGENT_ID))
            .hostname(TEST_HOSTNAME.to_string())
            .resources(vec![
                Resource::scalar(CPUS, cpus),
                Resource::scalar(MEM, mem),
                Resource::ranges(
                    PORTS,
                    vec![ValueRange::new(TEST_PORT_RANGE.0, TEST_PORT_RANGE.1)],
                ),
            ])
            .build()
            .unwrap()
    }

    pub fn mock_application(id: &str, cpus: f64, mem: f64, instances: u32) -> Application {
        ApplicationBuilder::default()
            .id(ApplicationId::from(id))
            .cpus(cpus)
            .mem(mem)
            .instances(instances)
            .build()
            .unwrap()
    }

    /// A task for `application` consuming only its scalar cpu and memory.
    pub fn mock_task(application: &Application, offer: &Offer) -> TaskDescriptor {
        TaskDescriptorBuilder::default()
            .application_id(application.id.clone())
            .offer_id(offer.id.clone())
            .agent_id(offer.agent_id.clone())
            .hostname(offer.hostname.clone())
            .resources(vec![
                Resource::scalar(CPUS, application.cpus),
                Resource::scalar(MEM, application.mem),
            ])
            .build()
            .unwrap()
    }
}

//! `outputs` subcommand

use super::{
    client::{load_config, Ecs},
    elb::Elb,
    load_stack, ControlPlane, Target,
};
use crate::{rollout::Observation, stack::Stack, Error};
use std::{collections::BTreeMap, path::Path};
use tracing::warn;

/// Live identifiers looked up from AWS.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Live {
    pub cluster_arn: Option<String>,
    pub service: Option<Observation>,
    pub load_balancer_arn: Option<String>,
    pub load_balancer_dns_name: Option<String>,
    pub target_group_arn: Option<String>,
}

/// Merges the static outputs of `stack` with whatever could be resolved live.
pub fn collect(stack: &Stack, live: Live) -> BTreeMap<String, String> {
    let mut outputs = stack.outputs_template();
    let mut insert = |key: &str, value: Option<String>| {
        if let Some(value) = value {
            outputs.insert(key.to_string(), value);
        }
    };
    insert("cluster_arn", live.cluster_arn);
    insert("load_balancer_arn", live.load_balancer_arn);
    insert("load_balancer_dns_name", live.load_balancer_dns_name);
    insert("target_group_arn", live.target_group_arn);
    if let Some(service) = live.service {
        insert("service_arn", service.service_arn);
        insert("task_definition_arn", Some(service.task_definition));
    }
    outputs
}

/// Prints the stack outputs as YAML
pub async fn outputs(config: &Path) -> Result<(), Error> {
    let stack = load_stack(config)?;
    let sdk = load_config(stack.region.clone()).await;
    let ecs = Ecs::new(&sdk);
    let elb = Elb::new(&sdk);
    let target = Target::from(&stack);

    let cluster_arn = ecs.cluster_arn(&target.cluster).await?;
    let service = match ecs.describe_service(&target.cluster, &target.service).await {
        Ok(observation) => Some(observation),
        Err(Error::ServiceNotFound { cluster, service }) => {
            warn!(cluster, service, "service not found");
            None
        }
        Err(e) => return Err(e),
    };
    let load_balancer = elb.load_balancer(&stack.edge.load_balancer).await?;
    let target_group_arn = elb.target_group_arn(&stack.edge.target_group.name).await?;

    let outputs = collect(
        &stack,
        Live {
            cluster_arn,
            service,
            load_balancer_arn: load_balancer.as_ref().map(|lb| lb.arn.clone()),
            load_balancer_dns_name: load_balancer.map(|lb| lb.dns_name),
            target_group_arn,
        },
    );
    print!("{}", serde_yaml::to_string(&outputs)?);
    Ok(())
}

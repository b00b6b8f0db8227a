//! `validate` subcommand

use super::load_stack;
use crate::Error;
use std::path::Path;
use tracing::{debug, info};

/// Checks a stack file without contacting AWS and logs the derived layout
pub fn validate(config: &Path) -> Result<(), Error> {
    let stack = load_stack(config)?;
    for placement in stack.network.subnet_layout() {
        info!(
            availability_zone = placement.availability_zone.as_str(),
            public = %placement.public,
            private = %placement.private,
            "subnets"
        );
    }
    let desired = stack.workload.scaling.desired_count;
    for (provider, tasks) in stack.cluster.placement(desired) {
        info!(provider = provider.as_str(), tasks, "capacity provider placement");
    }
    debug!(
        log_group = stack.workload.log_group().as_str(),
        policy = %stack.access.task_policy_document(),
        "task role"
    );
    info!(
        name = stack.name.as_str(),
        cpu = stack.workload.cpu,
        memory = stack.workload.memory,
        desired,
        "stack is valid"
    );
    Ok(())
}

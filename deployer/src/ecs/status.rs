//! `status` subcommand

use super::{
    client::{load_config, Ecs},
    load_stack, ControlPlane, Target,
};
use crate::{render::Definition, rollout::RolloutState, Error};
use std::path::Path;
use tracing::info;

/// Logs the service's deployments and whether it is settled on its task definition
pub async fn status(config: &Path) -> Result<(), Error> {
    let stack = load_stack(config)?;
    let sdk = load_config(stack.region.clone()).await;
    let ecs = Ecs::new(&sdk);
    let target = Target::from(&stack);

    let observation = ecs.describe_service(&target.cluster, &target.service).await?;
    for deployment in &observation.deployments {
        info!(
            id = deployment.id.as_str(),
            status = deployment.status.as_str(),
            task_definition = deployment.task_definition.as_str(),
            desired = deployment.desired,
            running = deployment.running,
            pending = deployment.pending,
            failed = deployment.failed,
            progress = ?deployment.progress,
            reason = deployment.reason.as_deref(),
            "deployment"
        );
    }
    let image = ecs
        .describe_task_definition(&observation.task_definition)
        .await?
        .and_then(|d| d.container_image(&target.container).map(String::from));
    let state = RolloutState::observe(&observation, &observation.task_definition);
    info!(
        service = target.service.as_str(),
        state = %state,
        task_definition = observation.task_definition.as_str(),
        image = image.as_deref(),
        desired = observation.desired,
        running = observation.running,
        pending = observation.pending,
        "service status"
    );
    Ok(())
}

//! `deploy` subcommand

use super::{
    build::build_image,
    client::{load_config, Ecs},
    execute, load_stack, Target, Wait,
};
use crate::{history::History, Error};
use std::path::Path;
use tracing::info;

/// Builds the image for the checked out commit, pushes it and rolls it out
pub async fn deploy(config: &Path, commit: Option<&str>) -> Result<(), Error> {
    // Validate before building anything
    let stack = load_stack(config)?;
    let sdk = load_config(stack.region.clone()).await;
    let image = build_image(&stack, commit, Some(&sdk)).await?;
    info!(image = %image, "deploying");

    // Roll out the unique tag
    let history = History::open(&stack.name)?;
    let observation = execute(
        &Ecs::new(&sdk),
        &Target::from(&stack),
        &image,
        Wait::from(&stack.deploy),
        &history,
    )
    .await?;
    info!(
        service = stack.workload.service.as_str(),
        task_definition = observation.task_definition.as_str(),
        running = observation.running,
        "deployment complete"
    );
    Ok(())
}

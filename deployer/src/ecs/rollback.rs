//! `rollback` subcommand

use super::{
    client::{load_config, Ecs},
    execute, load_stack,
    registry::Registry,
    ControlPlane, Target, Wait,
};
use crate::{
    history::{History, RolloutRecord},
    image::{ImageRef, ImageTag, LATEST_TAG},
    render::Definition,
    Error,
};
use std::path::Path;
use tracing::info;

/// Chooses the tag to roll back to.
///
/// An explicit tag wins, then the last steady rollout that is not `current`, then the
/// newest pushed build that is not `current`. The chosen tag must exist in `available`.
pub fn select_tag(
    name: &str,
    explicit: Option<&str>,
    previous: Option<RolloutRecord>,
    current: &str,
    available: &[String],
) -> Result<String, Error> {
    let selected = match (explicit, previous) {
        (Some(LATEST_TAG), _) => return Err(Error::InvalidImageTag(LATEST_TAG.to_string())),
        (Some(tag), _) => tag.to_string(),
        (None, Some(record)) => record.tag,
        (None, None) => ImageTag::latest(
            available
                .iter()
                .map(String::as_str)
                .filter(|tag| *tag != current),
        )
        .map(|tag| tag.to_string())
        .ok_or_else(|| Error::NoPreviousRollout(name.to_string()))?,
    };
    if !available.iter().any(|tag| *tag == selected) {
        return Err(Error::ImageTagNotFound(selected));
    }
    Ok(selected)
}

/// Rolls the service back to an image that was already pushed
pub async fn rollback(config: &Path, tag: Option<&str>) -> Result<(), Error> {
    let stack = load_stack(config)?;
    let sdk = load_config(stack.region.clone()).await;
    let ecs = Ecs::new(&sdk);
    let target = Target::from(&stack);

    // Find what is running now
    let current = ecs
        .describe_task_definition(&target.family)
        .await?
        .ok_or_else(|| Error::TaskDefinitionNotFound(target.family.clone()))?;
    let current = current
        .container_image(&target.container)
        .and_then(|uri| ImageRef::parse(uri).ok())
        .map(|image| image.tag().to_string())
        .unwrap_or_default();

    // Pick a target that still exists in the registry
    let repository = ImageRef::new(&stack.deploy.repository, LATEST_TAG)?;
    let available = Registry::new(&sdk).tags(repository.name()).await?;
    let history = History::open(&stack.name)?;
    let previous = if tag.is_none() {
        history.previous_successful(&current)?
    } else {
        None
    };
    let selected = select_tag(&stack.name, tag, previous, &current, &available)?;
    let image = repository.with_tag(&selected)?;
    info!(from = current.as_str(), to = selected.as_str(), "rolling back");

    let observation = execute(&ecs, &target, &image, Wait::from(&stack.deploy), &history).await?;
    info!(
        service = stack.workload.service.as_str(),
        task_definition = observation.task_definition.as_str(),
        "rollback complete"
    );
    Ok(())
}

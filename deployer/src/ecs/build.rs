//! `build` subcommand

use super::{
    client::load_config,
    load_stack,
    registry::{self, Registry},
    unix_now,
};
use crate::{
    image::{ImageRef, ImageTag, LATEST_TAG},
    stack::Stack,
    Error,
};
use aws_config::SdkConfig;
use std::path::Path;
use tracing::info;

/// Builds the image for `commit`, returning its reference.
///
/// The image is pushed to the registry when `sdk` is provided.
pub(super) async fn build_image(
    stack: &Stack,
    commit: Option<&str>,
    sdk: Option<&SdkConfig>,
) -> Result<ImageRef, Error> {
    let deploy = &stack.deploy;
    let commit = registry::resolve_commit(commit).await?;
    let tag = ImageTag::new(&commit, unix_now()?)?;
    let image = ImageRef::new(&deploy.repository, &tag.to_string())?;
    info!(image = %image, push = sdk.is_some(), "building");

    registry::build(&deploy.context, deploy.dockerfile.as_deref(), &image.uri()).await?;
    let Some(sdk) = sdk else {
        return Ok(image);
    };
    let credentials = Registry::new(sdk).credentials().await?;
    registry::login(image.registry(), &credentials).await?;
    registry::push(&image.uri()).await?;
    if deploy.publish_latest {
        let latest = image.with_tag(LATEST_TAG)?;
        registry::tag(&image.uri(), &latest.uri()).await?;
        registry::push(&latest.uri()).await?;
    }
    Ok(image)
}

/// Validates the stack and builds its image without rolling anything out
pub async fn build(config: &Path, commit: Option<&str>, push: bool) -> Result<(), Error> {
    let stack = load_stack(config)?;
    let sdk = if push {
        Some(load_config(stack.region.clone()).await)
    } else {
        None
    };
    let image = build_image(&stack, commit, sdk.as_ref()).await?;
    info!(image = %image, pushed = push, "build complete");
    Ok(())
}

//! `scale` subcommand

use super::{
    client::{load_config, Ecs},
    load_stack, scale_service, Target,
};
use crate::Error;
use std::path::Path;

/// Sets the service's desired task count
pub async fn scale(config: &Path, count: u32) -> Result<(), Error> {
    let stack = load_stack(config)?;

    // Reject out of range counts before loading credentials
    stack.workload.scaling.check_desired(count)?;
    let sdk = load_config(stack.region.clone()).await;
    scale_service(
        &Ecs::new(&sdk),
        &Target::from(&stack),
        &stack.workload.scaling,
        count,
    )
    .await
}

//! `render` subcommand

use crate::{
    render::{render, strip_read_only},
    Error,
};
use serde_json::Value;
use std::{fs, path::Path};
use tracing::info;

/// Renders a task definition file for `image`, writing to `output` (or stdout).
///
/// Accepts both a bare task definition and the `{"taskDefinition": ...}` envelope
/// returned by `aws ecs describe-task-definition`. Fields the control plane generates are
/// only removed when `strip` is set.
pub fn render_file(
    task_definition: &Path,
    container: &str,
    image: &str,
    strip: bool,
    output: Option<&Path>,
) -> Result<(), Error> {
    if image.trim().is_empty() {
        return Err(Error::InvalidImageReference(image.to_string()));
    }
    let contents = fs::read_to_string(task_definition)?;
    let mut document: Value = serde_json::from_str(&contents)?;
    if let Some(inner) = document.get_mut("taskDefinition").map(Value::take) {
        document = inner;
    }

    let mut rendered = render(&document, container, image)?;
    if strip {
        strip_read_only(&mut rendered);
    }
    let rendered = serde_json::to_string_pretty(&rendered)?;
    match output {
        Some(path) => {
            fs::write(path, format!("{rendered}\n"))?;
            info!(path = ?path, image, "wrote task definition");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

//! Swap the image of one container in a task definition document.
//!
//! Documents use the same JSON shape as `aws ecs describe-task-definition`. Key order is
//! preserved, so the rendered document serializes to the same bytes as the input apart
//! from the replaced image.

use crate::Error;
use serde_json::Value;

/// Fields returned by the control plane that registration rejects.
pub const READ_ONLY_FIELDS: &[&str] = &[
    "taskDefinitionArn",
    "revision",
    "status",
    "requiresAttributes",
    "compatibilities",
    "registeredAt",
    "registeredBy",
    "deregisteredAt",
];

const CONTAINER_DEFINITIONS: &str = "containerDefinitions";

/// A task definition whose container images can be swapped.
///
/// Implemented for JSON documents and for the control plane's own representation, so a
/// rollout never has to convert between the two.
pub trait Definition: Clone + Send + Sync {
    /// Returns the image of the container named `container`, if present.
    fn container_image(&self, container: &str) -> Option<&str>;

    /// Returns a copy, ready to be registered, where `container` runs `image`.
    fn with_image(&self, container: &str, image: &str) -> Result<Self, Error>;
}

impl Definition for Value {
    fn container_image(&self, container: &str) -> Option<&str> {
        container_image(self, container)
    }

    fn with_image(&self, container: &str, image: &str) -> Result<Self, Error> {
        let mut rendered = render(self, container, image)?;
        strip_read_only(&mut rendered);
        Ok(rendered)
    }
}

/// Returns the index of the only container named `container`.
pub fn find_container<'a, I>(names: I, container: &str) -> Result<usize, Error>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let matches: Vec<usize> = names
        .into_iter()
        .enumerate()
        .filter(|(_, name)| *name == Some(container))
        .map(|(i, _)| i)
        .collect();
    match matches.as_slice() {
        [] => Err(Error::ContainerNotFound(container.to_string())),
        [index] => Ok(*index),
        _ => Err(Error::DuplicateContainer(
            container.to_string(),
            matches.len(),
        )),
    }
}

/// Returns a copy of `document` where the container named `container` uses `image`.
///
/// Exactly one container must carry the name; zero or multiple matches are errors.
pub fn render(document: &Value, container: &str, image: &str) -> Result<Value, Error> {
    let mut rendered = document.clone();
    let definitions = rendered
        .get_mut(CONTAINER_DEFINITIONS)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| {
            Error::InvalidTaskDefinition(format!("missing {CONTAINER_DEFINITIONS} array"))
        })?;
    let index = find_container(
        definitions
            .iter()
            .map(|definition| definition.get("name").and_then(Value::as_str)),
        container,
    )?;

    let definition = definitions[index].as_object_mut().ok_or_else(|| {
        Error::InvalidTaskDefinition(format!("container {container} is not an object"))
    })?;
    definition.insert("image".to_string(), Value::String(image.to_string()));
    Ok(rendered)
}

/// Removes the fields in [READ_ONLY_FIELDS] so the document can be registered.
pub fn strip_read_only(document: &mut Value) {
    if let Some(object) = document.as_object_mut() {
        for field in READ_ONLY_FIELDS {
            // `shift_remove` keeps the remaining keys in order
            object.shift_remove(*field);
        }
    }
}

/// Returns the image of the container named `container`, if present.
pub fn container_image<'a>(document: &'a Value, container: &str) -> Option<&'a str> {
    document
        .get(CONTAINER_DEFINITIONS)?
        .as_array()?
        .iter()
        .find(|definition| definition.get("name").and_then(Value::as_str) == Some(container))?
        .get("image")?
        .as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TASK_DEFINITION: &str = r#"{
  "taskDefinitionArn": "arn:aws:ecs:us-east-1:123456789012:task-definition/nodejs-app:7",
  "family": "nodejs-app",
  "containerDefinitions": [
    {
      "name": "nodejs-app",
      "image": "repo:old",
      "cpu": 0,
      "essential": true,
      "portMappings": [
        {
          "containerPort": 3000,
          "hostPort": 3000,
          "protocol": "tcp"
        }
      ],
      "environment": [
        {
          "name": "NODE_ENV",
          "value": "production"
        }
      ]
    },
    {
      "name": "log-router",
      "image": "amazon/aws-for-fluent-bit:stable",
      "essential": false
    }
  ],
  "networkMode": "awsvpc",
  "revision": 7,
  "status": "ACTIVE",
  "requiresCompatibilities": [
    "FARGATE"
  ],
  "cpu": "256",
  "memory": "512"
}"#;

    fn document() -> Value {
        serde_json::from_str(TASK_DEFINITION).unwrap()
    }

    #[test]
    fn test_render_only_changes_image() {
        let input = document();
        let rendered = render(&input, "nodejs-app", "repo:abc123-169000").unwrap();

        // Everything but the target image is untouched
        let expected = TASK_DEFINITION.replace("\"repo:old\"", "\"repo:abc123-169000\"");
        assert_eq!(serde_json::to_string_pretty(&rendered).unwrap(), expected);

        // The input is not modified
        assert_eq!(input, document());
        assert_eq!(
            container_image(&rendered, "log-router"),
            Some("amazon/aws-for-fluent-bit:stable")
        );
    }

    #[test]
    fn test_render_same_image() {
        let input = document();
        let rendered = render(&input, "nodejs-app", "repo:old").unwrap();
        assert_eq!(rendered, input);
    }

    #[test]
    fn test_render_missing_container() {
        assert!(matches!(
            render(&document(), "worker", "repo:new"),
            Err(Error::ContainerNotFound(name)) if name == "worker"
        ));
    }

    #[test]
    fn test_render_duplicate_container() {
        let mut input = document();
        input["containerDefinitions"][1]["name"] = json!("nodejs-app");
        assert!(matches!(
            render(&input, "nodejs-app", "repo:new"),
            Err(Error::DuplicateContainer(name, 2)) if name == "nodejs-app"
        ));
    }

    #[test]
    fn test_render_without_containers() {
        let input = json!({ "family": "nodejs-app" });
        assert!(matches!(
            render(&input, "nodejs-app", "repo:new"),
            Err(Error::InvalidTaskDefinition(_))
        ));
    }

    #[test]
    fn test_render_without_image_field() {
        let mut input = document();
        input["containerDefinitions"][0]
            .as_object_mut()
            .unwrap()
            .shift_remove("image");
        let rendered = render(&input, "nodejs-app", "repo:new").unwrap();
        assert_eq!(container_image(&rendered, "nodejs-app"), Some("repo:new"));
    }

    #[test]
    fn test_definition_with_image() {
        let rendered = document().with_image("nodejs-app", "repo:new").unwrap();
        assert_eq!(rendered.container_image("nodejs-app"), Some("repo:new"));
        for field in READ_ONLY_FIELDS {
            assert!(rendered.get(*field).is_none(), "{field} was kept");
        }
    }

    #[test]
    fn test_find_container() {
        let names = [Some("log-router"), None, Some("nodejs-app")];
        assert_eq!(find_container(names, "nodejs-app").unwrap(), 2);
        assert!(matches!(
            find_container(names, "worker"),
            Err(Error::ContainerNotFound(_))
        ));
        assert!(matches!(
            find_container([Some("a"), Some("a")], "a"),
            Err(Error::DuplicateContainer(_, 2))
        ));
    }

    #[test]
    fn test_strip_read_only() {
        let mut input = document();
        strip_read_only(&mut input);
        let keys: Vec<&str> = input
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(
            keys,
            vec![
                "family",
                "containerDefinitions",
                "networkMode",
                "requiresCompatibilities",
                "cpu",
                "memory"
            ]
        );
    }
}

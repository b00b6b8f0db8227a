#![cfg(feature = "aws")]

use fargate_deployer::{
    ecs::{self, mocks, ControlPlane, Target, Wait},
    history::History,
    image::{ImageRef, ImageTag},
    render::{container_image, strip_read_only, READ_ONLY_FIELDS},
    rollout::RolloutState,
    stack::Stack,
    Error,
};
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tempfile::tempdir;

const REPOSITORY: &str = "123456789012.dkr.ecr.us-east-1.amazonaws.com/nodejs-app";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn task_definition() -> Value {
    let contents = fs::read_to_string(fixture("task-definition.json")).unwrap();
    let mut document: Value = serde_json::from_str(&contents).unwrap();
    document["taskDefinition"].take()
}

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
      "secrets": [
        {
          "name": "DATABASE_URL",
          "valueFrom": "arn:aws:secretsmanager:us-east-1:123456789012:secret:db"
        }
      ]
    }
  ],
  "networkMode": "awsvpc",
  "revision": 7,
  "status": "ACTIVE",
  "requiresCompatibilities": [
    "FARGATE"
  ],
  "runtimePlatform": {
    "cpuArchitecture": "ARM64",
    "operatingSystemFamily": "LINUX"
  },
  "cpu": "256",
  "memory": "512"
}
"#;

#[test]
fn test_fixture_stack_is_valid() {
    let stack = Stack::load(&fixture("stack.yaml")).unwrap();
    stack.validate().unwrap();
    ecs::validate(&fixture("stack.yaml")).unwrap();

    let target = Target::from(&stack);
    assert_eq!(target.cluster, "nodejs-cluster");
    assert_eq!(target.container, "nodejs-app");
    assert_eq!(
        Wait::from(&stack.deploy),
        Wait {
            timeout: Duration::from_secs(600),
            interval: Duration::from_secs(15),
        }
    );
}

#[test]
fn test_render_file_only_changes_image() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("task-definition.json");
    let output = dir.path().join("rendered.json");
    fs::write(&input, TASK_DEFINITION).unwrap();
    ecs::render_file(
        &input,
        "nodejs-app",
        "repo:abc123-169000",
        false,
        Some(output.as_path()),
    )
    .unwrap();

    let expected = TASK_DEFINITION.replace("\"repo:old\"", "\"repo:abc123-169000\"");
    assert_eq!(fs::read_to_string(&output).unwrap(), expected);
}

#[test]
fn test_render_file_strip_read_only() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("rendered.json");
    let image = format!("{REPOSITORY}:abc123-169000");
    ecs::render_file(
        &fixture("task-definition.json"),
        "nodejs-app",
        &image,
        true,
        Some(output.as_path()),
    )
    .unwrap();

    let rendered: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(container_image(&rendered, "nodejs-app"), Some(image.as_str()));
    for field in READ_ONLY_FIELDS {
        assert!(rendered.get(*field).is_none(), "{field} was not stripped");
    }

    // Everything else is carried over as-is, in order
    let mut expected = task_definition();
    expected["containerDefinitions"][0]["image"] = Value::String(image.clone());
    strip_read_only(&mut expected);
    assert_eq!(
        serde_json::to_string_pretty(&rendered).unwrap(),
        serde_json::to_string_pretty(&expected).unwrap()
    );
}

#[test]
fn test_render_file_keeps_envelope_contents() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("rendered.json");
    ecs::render_file(
        &fixture("task-definition.json"),
        "nodejs-app",
        "repo:abc123-169000",
        false,
        Some(output.as_path()),
    )
    .unwrap();

    let rendered: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let mut expected = task_definition();
    expected["containerDefinitions"][0]["image"] = Value::String("repo:abc123-169000".into());
    assert_eq!(rendered, expected);
}

#[test]
fn test_render_file_empty_image() {
    let result = ecs::render_file(
        &fixture("task-definition.json"),
        "nodejs-app",
        " ",
        false,
        None,
    );
    assert!(matches!(result, Err(Error::InvalidImageReference(_))));
}

#[test]
fn test_render_file_missing_container() {
    let result = ecs::render_file(
        &fixture("task-definition.json"),
        "worker",
        &format!("{REPOSITORY}:abc123-169000"),
        false,
        None,
    );
    assert!(matches!(result, Err(Error::ContainerNotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn test_deploy_fixture() {
    let dir = tempdir().unwrap();
    let stack = Stack::load(&fixture("stack.yaml")).unwrap();
    let history = History::new(dir.path().join("rollouts"));
    let plane = mocks::ControlPlane::new(
        task_definition(),
        stack.workload.scaling.desired_count,
        mocks::Behavior::Stabilize { after: 4 },
    );

    let tag = ImageTag::new("abc123def", 169_000).unwrap();
    let image = ImageRef::new(&stack.deploy.repository, &tag.to_string()).unwrap();
    let observation = ecs::execute(
        &plane,
        &Target::from(&stack),
        &image,
        Wait::from(&stack.deploy),
        &history,
    )
    .await
    .unwrap();
    assert_eq!(observation.running, 2);

    // The new revision is what the service runs
    let live = plane
        .describe_task_definition(&stack.workload.family)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        container_image(&live, "nodejs-app"),
        Some(format!("{REPOSITORY}:abc123d-169000").as_str())
    );
    assert_eq!(live["taskDefinitionArn"], observation.task_definition.as_str());

    let records = history.load().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, RolloutState::Steady);
    assert_eq!(records[0].image, image.uri());
}

#[tokio::test]
async fn test_scale_fixture_bounds() {
    let stack = Stack::load(&fixture("stack.yaml")).unwrap();
    let plane = mocks::ControlPlane::new(task_definition(), 2, mocks::Behavior::Stall);
    let target = Target::from(&stack);

    let result = ecs::scale_service(&plane, &target, &stack.workload.scaling, 0).await;
    assert!(matches!(result, Err(Error::DesiredCountOutOfRange { .. })));
    assert!(plane.updates().is_empty());

    ecs::scale_service(&plane, &target, &stack.workload.scaling, 1)
        .await
        .unwrap();
    assert_eq!(plane.updates()[0].desired_count, Some(1));
}

#[tokio::test]
async fn test_build_validates_before_building() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("stack.yaml");
    let stack = fs::read_to_string(fixture("stack.yaml")).unwrap().replace(
        "private_subnets: [10.0.1.0/24, 10.0.2.0/24]",
        "private_subnets: [10.0.1.0/24]",
    );
    fs::write(&config, stack).unwrap();

    let result = ecs::build(&config, Some("abc123def"), false).await;
    assert!(matches!(
        result,
        Err(Error::SubnetCountMismatch { kind: "private", .. })
    ));
}

#[tokio::test]
async fn test_build_rejects_invalid_commit() {
    let result = ecs::build(&fixture("stack.yaml"), Some("not-a-commit"), false).await;
    assert!(matches!(result, Err(Error::InvalidCommit(_))));
}

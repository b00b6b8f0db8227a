//! Roll container images out to an ECS service.
//!
//! Every subcommand loads the stack file, validates it and then talks to the control
//! plane through [ControlPlane]. The rollout itself ([submit] then [wait_for_steady]) is
//! generic over the control plane so it can be driven by [mocks::ControlPlane] in tests.

use crate::{
    history::{History, RolloutRecord},
    image::ImageRef,
    render::Definition,
    rollout::{Observation, RolloutState},
    stack::{Deploy, Scaling, Stack},
    Error,
};
use std::{
    fmt,
    future::Future,
    path::Path,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, info, warn};

mod build;
pub use build::build;
mod client;
pub use client::{load_config, Ecs, Revision};
mod deploy;
pub use deploy::deploy;
mod elb;
mod history;
pub use history::history;
pub mod mocks;
mod outputs;
pub use outputs::outputs;
mod registry;
mod render;
pub use render::render_file;
mod rollback;
pub use rollback::rollback;
mod scale;
pub use scale::scale;
mod status;
pub use status::status;
mod validate;
pub use validate::validate;

pub const CMD: &str = "ecs";
pub const VALIDATE_CMD: &str = "validate";
pub const RENDER_CMD: &str = "render";
pub const BUILD_CMD: &str = "build";
pub const DEPLOY_CMD: &str = "deploy";
pub const ROLLBACK_CMD: &str = "rollback";
pub const SCALE_CMD: &str = "scale";
pub const STATUS_CMD: &str = "status";
pub const OUTPUTS_CMD: &str = "outputs";
pub const HISTORY_CMD: &str = "history";

/// ECS API calls that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcsOperation {
    DescribeTaskDefinition,
    RegisterTaskDefinition,
    UpdateService,
    DescribeServices,
    DescribeClusters,
}

impl fmt::Display for EcsOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DescribeTaskDefinition => "DescribeTaskDefinition",
            Self::RegisterTaskDefinition => "RegisterTaskDefinition",
            Self::UpdateService => "UpdateService",
            Self::DescribeServices => "DescribeServices",
            Self::DescribeClusters => "DescribeClusters",
        };
        f.write_str(s)
    }
}

/// ECR API calls that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcrOperation {
    GetAuthorizationToken,
    ListImages,
}

impl fmt::Display for EcrOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GetAuthorizationToken => "GetAuthorizationToken",
            Self::ListImages => "ListImages",
        };
        f.write_str(s)
    }
}

/// Elastic Load Balancing API calls that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElbOperation {
    DescribeLoadBalancers,
    DescribeTargetGroups,
}

impl fmt::Display for ElbOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DescribeLoadBalancers => "DescribeLoadBalancers",
            Self::DescribeTargetGroups => "DescribeTargetGroups",
        };
        f.write_str(s)
    }
}

/// Change submitted to a service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceUpdate {
    pub task_definition: Option<String>,
    pub desired_count: Option<u32>,
}

/// Control plane operations needed to roll out and scale a service.
pub trait ControlPlane: Send + Sync {
    /// Task definitions as the control plane describes and registers them.
    type TaskDefinition: Definition;

    /// Returns the latest active revision of a family (or the revision named by an ARN),
    /// or `None` if it does not exist.
    fn describe_task_definition(
        &self,
        task_definition: &str,
    ) -> impl Future<Output = Result<Option<Self::TaskDefinition>, Error>> + Send;

    /// Registers a new revision and returns its ARN.
    fn register_task_definition(
        &self,
        definition: &Self::TaskDefinition,
    ) -> impl Future<Output = Result<String, Error>> + Send;

    fn update_service(
        &self,
        cluster: &str,
        service: &str,
        update: &ServiceUpdate,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn describe_service(
        &self,
        cluster: &str,
        service: &str,
    ) -> impl Future<Output = Result<Observation, Error>> + Send;
}

/// The service a rollout targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub cluster: String,
    pub service: String,
    pub family: String,
    pub container: String,
}

impl From<&Stack> for Target {
    fn from(stack: &Stack) -> Self {
        Self {
            cluster: stack.cluster.name.clone(),
            service: stack.workload.service.clone(),
            family: stack.workload.family.clone(),
            container: stack.workload.container.name.clone(),
        }
    }
}

/// How long and how often to poll for steady state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Wait {
    pub timeout: Duration,
    pub interval: Duration,
}

impl From<&Deploy> for Wait {
    fn from(deploy: &Deploy) -> Self {
        Self {
            timeout: Duration::from_secs(deploy.stability_timeout),
            interval: Duration::from_secs(deploy.poll_interval.max(1)),
        }
    }
}

/// Loads the stack at `config` and checks it before anything is sent to AWS.
fn load_stack(config: &Path) -> Result<Stack, Error> {
    let stack = Stack::load(config)?;
    stack.validate()?;
    debug!(name = stack.name.as_str(), path = ?config, "loaded stack");
    Ok(stack)
}

/// Seconds since the UNIX epoch.
pub fn unix_now() -> Result<u64, Error> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Registers a copy of the live task definition that runs `image` and points the
/// service at it, returning the new revision's ARN.
pub async fn submit<P: ControlPlane>(
    plane: &P,
    target: &Target,
    image: &str,
) -> Result<String, Error> {
    // Never fall back to a fabricated definition
    let current = plane
        .describe_task_definition(&target.family)
        .await?
        .ok_or_else(|| Error::TaskDefinitionNotFound(target.family.clone()))?;
    info!(family = target.family.as_str(), "fetched task definition");

    let rendered = current.with_image(&target.container, image)?;
    info!(
        container = target.container.as_str(),
        image, "rendered task definition"
    );

    let task_definition = plane.register_task_definition(&rendered).await?;
    info!(
        task_definition = task_definition.as_str(),
        "registered task definition"
    );

    plane
        .update_service(
            &target.cluster,
            &target.service,
            &ServiceUpdate {
                task_definition: Some(task_definition.clone()),
                desired_count: None,
            },
        )
        .await?;
    info!(
        cluster = target.cluster.as_str(),
        service = target.service.as_str(),
        task_definition = task_definition.as_str(),
        "updated service"
    );
    Ok(task_definition)
}

/// Polls the service until the rollout of `task_definition` is steady, failed or the
/// timeout elapses.
pub async fn wait_for_steady<P: ControlPlane>(
    plane: &P,
    target: &Target,
    task_definition: &str,
    wait: Wait,
) -> Result<Observation, Error> {
    let deadline = tokio::time::Instant::now()
        .checked_add(wait.timeout)
        .ok_or_else(|| {
            Error::InvalidDeploy(format!("timeout of {}s is too long", wait.timeout.as_secs()))
        })?;
    let mut state = RolloutState::Pending;
    loop {
        let observation = plane
            .describe_service(&target.cluster, &target.service)
            .await?;
        let observed = RolloutState::observe(&observation, task_definition);
        if !state.can_transition(observed) {
            // Another rollout replaced ours as the primary deployment
            let primary = observation
                .primary()
                .map(|d| d.task_definition.clone())
                .unwrap_or_default();
            return Err(Error::RolloutSuperseded {
                service: target.service.clone(),
                task_definition: primary,
            });
        }
        if observed != state {
            info!(
                service = target.service.as_str(),
                from = %state,
                to = %observed,
                "rollout state changed"
            );
            state = observed;
        }
        match state {
            RolloutState::Steady => return Ok(observation),
            RolloutState::Failed => {
                let reason = observation
                    .primary()
                    .and_then(|d| d.reason.clone())
                    .unwrap_or_else(|| "deployment failed".to_string());
                return Err(Error::RolloutFailed {
                    service: target.service.clone(),
                    reason,
                });
            }
            RolloutState::Pending | RolloutState::InProgress => {}
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Err(Error::RolloutTimeout {
                service: target.service.clone(),
                timeout_secs: wait.timeout.as_secs(),
            });
        }
        debug!(
            running = observation.running,
            desired = observation.desired,
            pending = observation.pending,
            deployments = observation.deployments.len(),
            "waiting for steady state"
        );
        tokio::time::sleep(wait.interval.min(deadline - now)).await;
    }
}

/// Rolls `image` out to the target and records the outcome in `history`.
///
/// Failures are recorded and returned; nothing is rolled back.
pub async fn execute<P: ControlPlane>(
    plane: &P,
    target: &Target,
    image: &ImageRef,
    wait: Wait,
    history: &History,
) -> Result<Observation, Error> {
    let started_at = unix_now()?;
    let uri = image.uri();
    let (task_definition, result) = match submit(plane, target, &uri).await {
        Ok(task_definition) => {
            let result = wait_for_steady(plane, target, &task_definition, wait).await;
            (Some(task_definition), result)
        }
        Err(err) => (None, Err(err)),
    };

    let record = RolloutRecord {
        tag: image.tag().to_string(),
        image: uri,
        task_definition,
        state: if result.is_ok() {
            RolloutState::Steady
        } else {
            RolloutState::Failed
        },
        started_at,
        finished_at: unix_now()?,
        error: result.as_ref().err().map(|e| e.to_string()),
    };
    match history.record(&record) {
        Ok(path) => debug!(path = ?path, "recorded rollout"),
        Err(err) if result.is_err() => warn!(error = ?err, "failed to record rollout"),
        Err(err) => return Err(err),
    }
    result
}

/// Sets the desired task count after checking it against the scaling bounds.
pub async fn scale_service<P: ControlPlane>(
    plane: &P,
    target: &Target,
    scaling: &Scaling,
    count: u32,
) -> Result<(), Error> {
    scaling.check_desired(count)?;
    plane
        .update_service(
            &target.cluster,
            &target.service,
            &ServiceUpdate {
                task_definition: None,
                desired_count: Some(count),
            },
        )
        .await?;
    info!(
        service = target.service.as_str(),
        desired = count,
        "updated desired count"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rollout::PRIMARY;
    use mocks::Behavior;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    const IMAGE: &str = "123456789012.dkr.ecr.us-east-1.amazonaws.com/nodejs-app";

    fn history(dir: &TempDir) -> History {
        History::new(dir.path().join("rollouts"))
    }

    fn target() -> Target {
        Target {
            cluster: "nodejs-cluster".into(),
            service: "nodejs-app-service".into(),
            family: "nodejs-app".into(),
            container: "nodejs-app".into(),
        }
    }

    fn definition() -> Value {
        json!({
            "family": "nodejs-app",
            "containerDefinitions": [{
                "name": "nodejs-app",
                "image": format!("{IMAGE}:old"),
                "essential": true,
                "portMappings": [{ "containerPort": 3000, "protocol": "tcp" }],
            }],
            "networkMode": "awsvpc",
            "requiresCompatibilities": ["FARGATE"],
            "cpu": "256",
            "memory": "512",
        })
    }

    fn wait() -> Wait {
        Wait {
            timeout: Duration::from_secs(600),
            interval: Duration::from_secs(15),
        }
    }

    fn image() -> ImageRef {
        ImageRef::new(IMAGE, "abc123-169000").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollout_steady() {
        let dir = tempfile::tempdir().unwrap();
        let plane = mocks::ControlPlane::new(definition(), 2, Behavior::Stabilize { after: 3 });
        let observation = execute(&plane, &target(), &image(), wait(), &history(&dir))
            .await
            .unwrap();

        // The service converged on the new revision
        let expected = mocks::task_definition_arn("nodejs-app", 2);
        assert_eq!(observation.task_definition, expected);
        assert_eq!(observation.deployments.len(), 1);
        assert_eq!(observation.deployments[0].status, PRIMARY);

        // Only the image changed
        let registered = plane.registered();
        assert_eq!(registered.len(), 1);
        let mut expected_document = definition();
        expected_document["containerDefinitions"][0]["image"] =
            json!(format!("{IMAGE}:abc123-169000"));
        assert_eq!(registered[0], expected_document);

        // The service was pointed at it exactly once
        assert_eq!(
            plane.updates(),
            vec![ServiceUpdate {
                task_definition: Some(expected.clone()),
                desired_count: None,
            }]
        );

        let records = history(&dir).load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, RolloutState::Steady);
        assert_eq!(records[0].tag, "abc123-169000");
        assert_eq!(records[0].task_definition, Some(expected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollout_strips_read_only_fields() {
        let dir = tempfile::tempdir().unwrap();
        let plane = mocks::ControlPlane::new(definition(), 2, Behavior::Stabilize { after: 0 });
        execute(&plane, &target(), &image(), wait(), &history(&dir))
            .await
            .unwrap();

        // The mock serves its stored revision with read-only fields attached
        let registered = plane.registered();
        assert!(registered[0].get("taskDefinitionArn").is_none());
        assert!(registered[0].get("revision").is_none());
        assert!(registered[0].get("status").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollout_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let plane = mocks::ControlPlane::new(definition(), 2, Behavior::Stall);
        let started = tokio::time::Instant::now();
        let result = execute(&plane, &target(), &image(), wait(), &history(&dir)).await;
        assert!(matches!(
            result,
            Err(Error::RolloutTimeout {
                timeout_secs: 600,
                ..
            })
        ));

        // The deadline is honored, not overshot by a full interval
        assert_eq!(started.elapsed(), Duration::from_secs(600));

        let records = history(&dir).load().unwrap();
        assert_eq!(records[0].state, RolloutState::Failed);
        assert!(records[0].error.as_ref().unwrap().contains("steady state"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollout_failed() {
        let dir = tempfile::tempdir().unwrap();
        let plane = mocks::ControlPlane::new(
            definition(),
            2,
            Behavior::Fail {
                after: 2,
                reason: "circuit breaker triggered".into(),
            },
        );
        let result = execute(&plane, &target(), &image(), wait(), &history(&dir)).await;
        assert!(matches!(
            result,
            Err(Error::RolloutFailed { reason, .. }) if reason == "circuit breaker triggered"
        ));
        assert_eq!(history(&dir).load().unwrap()[0].state, RolloutState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollout_superseded() {
        let dir = tempfile::tempdir().unwrap();
        let plane = mocks::ControlPlane::new(definition(), 2, Behavior::Supersede { after: 2 });
        let result = execute(&plane, &target(), &image(), wait(), &history(&dir)).await;
        assert!(matches!(result, Err(Error::RolloutSuperseded { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_too_long() {
        let plane = mocks::ControlPlane::new(definition(), 2, Behavior::Stall);
        let wait = Wait {
            timeout: Duration::MAX,
            interval: Duration::from_secs(15),
        };
        let result = wait_for_steady(&plane, &target(), "nodejs-app:2", wait).await;
        assert!(matches!(result, Err(Error::InvalidDeploy(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_task_definition() {
        let dir = tempfile::tempdir().unwrap();
        let plane = mocks::ControlPlane::new(definition(), 2, Behavior::Stabilize { after: 0 });
        let mut target = target();
        target.family = "worker".into();
        let result = execute(&plane, &target, &image(), wait(), &history(&dir)).await;
        assert!(matches!(
            result,
            Err(Error::TaskDefinitionNotFound(family)) if family == "worker"
        ));

        // Nothing was submitted
        assert!(plane.registered().is_empty());
        assert!(plane.updates().is_empty());
        let records = history(&dir).load().unwrap();
        assert_eq!(records[0].task_definition, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_container() {
        let dir = tempfile::tempdir().unwrap();
        let mut document = definition();
        let container = document["containerDefinitions"][0].clone();
        document["containerDefinitions"]
            .as_array_mut()
            .unwrap()
            .push(container);
        let plane = mocks::ControlPlane::new(document, 2, Behavior::Stabilize { after: 0 });
        let result = execute(&plane, &target(), &image(), wait(), &history(&dir)).await;
        assert!(matches!(result, Err(Error::DuplicateContainer(_, 2))));
        assert!(plane.registered().is_empty());
    }

    #[tokio::test]
    async fn test_scale_within_bounds() {
        let plane = mocks::ControlPlane::new(definition(), 2, Behavior::Stabilize { after: 0 });
        let scaling = crate::stack::tests::stack().workload.scaling;
        scale_service(&plane, &target(), &scaling, 4).await.unwrap();
        assert_eq!(
            plane.updates(),
            vec![ServiceUpdate {
                task_definition: None,
                desired_count: Some(4),
            }]
        );
        let observation = plane
            .describe_service("nodejs-cluster", "nodejs-app-service")
            .await
            .unwrap();
        assert_eq!(observation.desired, 4);
    }

    #[tokio::test]
    async fn test_scale_rejected_before_submission() {
        let plane = mocks::ControlPlane::new(definition(), 2, Behavior::Stabilize { after: 0 });
        let scaling = crate::stack::tests::stack().workload.scaling;
        let result = scale_service(&plane, &target(), &scaling, 5).await;
        assert!(matches!(
            result,
            Err(Error::DesiredCountOutOfRange {
                desired: 5,
                min: 1,
                max: 4
            })
        ));
        assert!(plane.updates().is_empty());
    }
}

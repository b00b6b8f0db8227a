//! AWS ECS SDK function wrappers

use super::{ControlPlane, EcsOperation, ServiceUpdate};
use crate::{
    render::{find_container, Definition},
    rollout::{Deployment, Observation, Progress},
    Error,
};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_ecs::{
    config::retry::ReconnectMode,
    operation::{
        describe_task_definition::DescribeTaskDefinitionError,
        register_task_definition::{
            builders::RegisterTaskDefinitionInputBuilder, RegisterTaskDefinitionInput,
        },
    },
    types::{DeploymentRolloutState, Tag, TaskDefinition, TaskDefinitionField},
    Client as EcsClient,
};
use std::time::Duration;
use tracing::debug;

/// Message ECS attaches to the client error returned for an unknown task definition
const MISSING_TASK_DEFINITION: &str = "Unable to describe task definition";

/// Loads the shared AWS configuration for `region`
pub async fn load_config(region: String) -> SdkConfig {
    let retry = aws_config::retry::RetryConfig::adaptive()
        .with_max_attempts(10)
        .with_initial_backoff(Duration::from_millis(500))
        .with_max_backoff(Duration::from_secs(30))
        .with_reconnect_mode(ReconnectMode::ReconnectOnTransientError);
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region))
        .retry_config(retry)
        .load()
        .await
}

/// A task definition as described by ECS, along with the tags it was registered with.
#[derive(Clone, Debug, PartialEq)]
pub struct Revision {
    pub definition: TaskDefinition,
    pub tags: Vec<Tag>,
}

impl Definition for Revision {
    fn container_image(&self, container: &str) -> Option<&str> {
        self.definition
            .container_definitions()
            .iter()
            .find(|c| c.name() == Some(container))?
            .image()
    }

    fn with_image(&self, container: &str, image: &str) -> Result<Self, Error> {
        let mut revision = self.clone();
        let containers = revision
            .definition
            .container_definitions
            .as_mut()
            .ok_or_else(|| {
                Error::InvalidTaskDefinition("missing containerDefinitions".to_string())
            })?;
        let index = find_container(containers.iter().map(|c| c.name()), container)?;
        containers[index].image = Some(image.to_string());
        Ok(revision)
    }
}

/// Builds the registration of `revision`, carrying over every writable field.
fn registration(revision: &Revision) -> RegisterTaskDefinitionInputBuilder {
    let definition = revision.definition.clone();
    let tags = if revision.tags.is_empty() {
        None
    } else {
        Some(revision.tags.clone())
    };
    RegisterTaskDefinitionInput::builder()
        .set_family(definition.family)
        .set_task_role_arn(definition.task_role_arn)
        .set_execution_role_arn(definition.execution_role_arn)
        .set_network_mode(definition.network_mode)
        .set_container_definitions(definition.container_definitions)
        .set_volumes(definition.volumes)
        .set_placement_constraints(definition.placement_constraints)
        .set_requires_compatibilities(definition.requires_compatibilities)
        .set_cpu(definition.cpu)
        .set_memory(definition.memory)
        .set_tags(tags)
        .set_pid_mode(definition.pid_mode)
        .set_ipc_mode(definition.ipc_mode)
        .set_proxy_configuration(definition.proxy_configuration)
        .set_inference_accelerators(definition.inference_accelerators)
        .set_ephemeral_storage(definition.ephemeral_storage)
        .set_runtime_platform(definition.runtime_platform)
        .set_enable_fault_injection(definition.enable_fault_injection)
}

/// Returns true if a describe failure means the task definition does not exist.
///
/// ECS reports both unknown task definitions and some permission problems as client
/// errors, so only the former's message counts.
fn is_missing(error: &DescribeTaskDefinitionError) -> bool {
    match error {
        DescribeTaskDefinitionError::ClientException(e) => e
            .message()
            .is_some_and(|m| m.contains(MISSING_TASK_DEFINITION)),
        _ => false,
    }
}

/// Converts a service deployment reported by ECS.
fn deployment(deployment: &aws_sdk_ecs::types::Deployment) -> Deployment {
    let count = |c: i32| u32::try_from(c).unwrap_or(0);
    Deployment {
        id: deployment.id().unwrap_or_default().to_string(),
        status: deployment.status().unwrap_or_default().to_string(),
        task_definition: deployment.task_definition().unwrap_or_default().to_string(),
        desired: count(deployment.desired_count()),
        running: count(deployment.running_count()),
        pending: count(deployment.pending_count()),
        failed: count(deployment.failed_tasks()),
        progress: deployment.rollout_state().and_then(|s| match s {
            DeploymentRolloutState::InProgress => Some(Progress::InProgress),
            DeploymentRolloutState::Completed => Some(Progress::Completed),
            DeploymentRolloutState::Failed => Some(Progress::Failed),
            _ => None,
        }),
        reason: deployment.rollout_state_reason().map(String::from),
    }
}

/// ECS control plane backed by the AWS SDK.
#[derive(Clone)]
pub struct Ecs {
    client: EcsClient,
}

impl Ecs {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: EcsClient::new(config),
        }
    }

    /// Returns the ARN of an active cluster named `name`.
    pub async fn cluster_arn(&self, name: &str) -> Result<Option<String>, Error> {
        let output = self
            .client
            .describe_clusters()
            .clusters(name)
            .send()
            .await
            .map_err(|e| Error::AwsEcs {
                operation: EcsOperation::DescribeClusters,
                source: Box::new(aws_sdk_ecs::Error::from(e.into_service_error())),
            })?;
        Ok(output
            .clusters()
            .iter()
            .find(|c| c.status() == Some("ACTIVE"))
            .and_then(|c| c.cluster_arn())
            .map(String::from))
    }
}

impl ControlPlane for Ecs {
    type TaskDefinition = Revision;

    async fn describe_task_definition(
        &self,
        task_definition: &str,
    ) -> Result<Option<Revision>, Error> {
        let output = match self
            .client
            .describe_task_definition()
            .task_definition(task_definition)
            .include(TaskDefinitionField::Tags)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let service_err = e.into_service_error();
                if is_missing(&service_err) {
                    debug!(task_definition, "task definition not found");
                    return Ok(None);
                }
                return Err(Error::AwsEcs {
                    operation: EcsOperation::DescribeTaskDefinition,
                    source: Box::new(aws_sdk_ecs::Error::from(service_err)),
                });
            }
        };
        Ok(output.task_definition().map(|definition| Revision {
            definition: definition.clone(),
            tags: output.tags().to_vec(),
        }))
    }

    async fn register_task_definition(&self, revision: &Revision) -> Result<String, Error> {
        let family = revision.definition.family().unwrap_or_default();
        let output = registration(revision)
            .send_with(&self.client)
            .await
            .map_err(|e| Error::AwsEcs {
                operation: EcsOperation::RegisterTaskDefinition,
                source: Box::new(aws_sdk_ecs::Error::from(e.into_service_error())),
            })?;
        output
            .task_definition()
            .and_then(|d| d.task_definition_arn())
            .map(String::from)
            .ok_or_else(|| {
                Error::InvalidTaskDefinition(format!("registration of {family} returned no arn"))
            })
    }

    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        update: &ServiceUpdate,
    ) -> Result<(), Error> {
        self.client
            .update_service()
            .cluster(cluster)
            .service(service)
            .set_task_definition(update.task_definition.clone())
            .set_desired_count(
                update
                    .desired_count
                    .map(|c| i32::try_from(c).unwrap_or(i32::MAX)),
            )
            .send()
            .await
            .map_err(|e| Error::AwsEcs {
                operation: EcsOperation::UpdateService,
                source: Box::new(aws_sdk_ecs::Error::from(e.into_service_error())),
            })?;
        Ok(())
    }

    async fn describe_service(&self, cluster: &str, service: &str) -> Result<Observation, Error> {
        let output = self
            .client
            .describe_services()
            .cluster(cluster)
            .services(service)
            .send()
            .await
            .map_err(|e| Error::AwsEcs {
                operation: EcsOperation::DescribeServices,
                source: Box::new(aws_sdk_ecs::Error::from(e.into_service_error())),
            })?;

        // Deleted services linger as INACTIVE
        let not_found = || Error::ServiceNotFound {
            cluster: cluster.to_string(),
            service: service.to_string(),
        };
        let description = output.services().first().ok_or_else(not_found)?;
        if description.status() == Some("INACTIVE") {
            return Err(not_found());
        }

        let count = |c: i32| u32::try_from(c).unwrap_or(0);
        Ok(Observation {
            service_arn: description.service_arn().map(String::from),
            task_definition: description.task_definition().unwrap_or_default().to_string(),
            desired: count(description.desired_count()),
            running: count(description.running_count()),
            pending: count(description.pending_count()),
            deployments: description.deployments().iter().map(deployment).collect(),
        })
    }
}

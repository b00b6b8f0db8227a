//! Validate a Fargate service stack and roll new container images out to it.
//!
//! A stack file (YAML) describes the network, cluster, IAM roles, load balancer and
//! workload that back a single ECS service. The [stack] module checks that description
//! against the invariants the provisioning tool does not enforce on its own (subnet
//! layout, capacity provider weights, Fargate task shapes, scaling bounds).
//!
//! Rolling out a new image is a linear pipeline:
//!
//! 1. build and push an image under a unique [image::ImageTag],
//! 2. fetch the live task definition,
//! 3. [render::render] a copy that only differs in the target container's image,
//! 4. register it, point the service at it and wait for the [rollout::RolloutState]
//!    to settle.
//!
//! Any failing step aborts the run. Nothing is retried or rolled back automatically.
//!
//! # Status
//!
//! `fargate-deployer` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

use std::io::Error as IoError;
use thiserror::Error;

pub mod history;
pub mod image;
pub mod render;
pub mod rollout;
pub mod stack;

cfg_if::cfg_if! {
    if #[cfg(feature = "aws")] {
        pub mod ecs;
    }
}

/// Errors that can occur when validating a stack or rolling out a service.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid cidr: {0}")]
    InvalidCidr(String),
    #[error("no availability zones")]
    NoAvailabilityZones,
    #[error("duplicate availability zone: {0}")]
    DuplicateAvailabilityZone(String),
    #[error("{kind} subnet count ({subnets}) does not match availability zone count ({zones})")]
    SubnetCountMismatch {
        kind: &'static str,
        subnets: usize,
        zones: usize,
    },
    #[error("subnet {0} is outside the vpc cidr {1}")]
    SubnetOutsideVpc(String, String),
    #[error("subnets overlap: {0} and {1}")]
    SubnetOverlap(String, String),
    #[error("no capacity providers")]
    NoCapacityProviders,
    #[error("duplicate capacity provider: {0}")]
    DuplicateCapacityProvider(String),
    #[error("only one capacity provider may define a base, found {0}")]
    MultipleBaseProviders(usize),
    #[error("capacity provider weights sum to zero")]
    ZeroCapacityWeight,
    #[error("invalid role: {0}")]
    InvalidRole(String),
    #[error("execution role {0} is missing the task execution policy")]
    MissingExecutionPolicy(String),
    #[error("invalid policy statement: {0}")]
    InvalidPolicyStatement(String),
    #[error("invalid target group: {0}")]
    InvalidTargetGroup(String),
    #[error("invalid health check: {0}")]
    InvalidHealthCheck(String),
    #[error("target group port {target_group} does not match container port {container}")]
    PortMismatch { target_group: u16, container: u16 },
    #[error("invalid task shape: cpu={cpu} memory={memory}")]
    InvalidTaskShape { cpu: u32, memory: u32 },
    #[error("desired count {desired} outside of [{min}, {max}]")]
    DesiredCountOutOfRange { desired: u32, min: u32, max: u32 },
    #[error("invalid scaling: {0}")]
    InvalidScaling(String),
    #[error("invalid deploy settings: {0}")]
    InvalidDeploy(String),
    #[error("invalid task definition: {0}")]
    InvalidTaskDefinition(String),
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error("container {0} matched {1} definitions")]
    DuplicateContainer(String, usize),
    #[error("invalid image tag: {0}")]
    InvalidImageTag(String),
    #[error("invalid image reference: {0}")]
    InvalidImageReference(String),
    #[error("invalid commit: {0}")]
    InvalidCommit(String),
    #[error("task definition not found: {0}")]
    TaskDefinitionNotFound(String),
    #[error("service not found: {cluster}/{service}")]
    ServiceNotFound { cluster: String, service: String },
    #[error("rollout of {service} failed: {reason}")]
    RolloutFailed { service: String, reason: String },
    #[error("rollout of {service} did not reach steady state within {timeout_secs}s")]
    RolloutTimeout { service: String, timeout_secs: u64 },
    #[error("rollout of {service} superseded by {task_definition}")]
    RolloutSuperseded {
        service: String,
        task_definition: String,
    },
    #[error("no previous successful rollout for {0}")]
    NoPreviousRollout(String),
    #[error("image tag not found: {0}")]
    ImageTagNotFound(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("home directory not set")]
    HomeNotSet,
    #[error("io error: {0}")]
    Io(#[from] IoError),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("clock error: {0}")]
    Clock(#[from] std::time::SystemTimeError),
    #[cfg(feature = "aws")]
    #[error("ecs error during {operation}: {source}")]
    AwsEcs {
        operation: ecs::EcsOperation,
        #[source]
        source: Box<aws_sdk_ecs::Error>,
    },
    #[cfg(feature = "aws")]
    #[error("ecr error during {operation}: {source}")]
    AwsEcr {
        operation: ecs::EcrOperation,
        #[source]
        source: Box<aws_sdk_ecr::Error>,
    },
    #[cfg(feature = "aws")]
    #[error("elb error during {operation}: {source}")]
    AwsElb {
        operation: ecs::ElbOperation,
        #[source]
        source: Box<aws_sdk_elasticloadbalancingv2::Error>,
    },
    #[cfg(feature = "aws")]
    #[error("aws build error: {0}")]
    AwsBuild(#[from] aws_sdk_ecs::error::BuildError),
    #[cfg(feature = "aws")]
    #[error("invalid registry authorization token")]
    InvalidAuthorizationToken,
    #[cfg(feature = "aws")]
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

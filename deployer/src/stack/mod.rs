//! Stack file describing the infrastructure behind one Fargate service.
//!
//! Sections are declared in dependency order: the network hosts the cluster, roles are
//! assumed by tasks, the load balancer fronts the service and the workload ties the
//! task definition, service and autoscaling policies together.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs::File, path::Path};

pub mod access;
pub mod cluster;
pub mod edge;
pub mod network;
pub mod workload;

pub use access::{Access, Effect, ExecutionRole, PolicyStatement, TaskRole};
pub use cluster::{CapacityProvider, CapacityProviderName, Cluster};
pub use edge::{Edge, HealthCheck, TargetGroup, TargetType};
pub use network::{Cidr, Network, SubnetPlacement};
pub use workload::{Container, Scaling, TaskShape, Workload};

/// Default time to wait for a rollout to reach steady state (in seconds)
pub const DEFAULT_STABILITY_TIMEOUT: u64 = 600;

/// Default interval between service polls (in seconds)
pub const DEFAULT_POLL_INTERVAL: u64 = 15;

/// Upper bound on the stability timeout and poll interval (in seconds)
pub const MAX_WAIT: u64 = 24 * 60 * 60;

fn default_stability_timeout() -> u64 {
    DEFAULT_STABILITY_TIMEOUT
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL
}

fn default_context() -> String {
    ".".to_string()
}

/// How images are built and rolled out.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Deploy {
    /// Registry repository URI (without tag)
    pub repository: String,
    /// Docker build context
    #[serde(default = "default_context")]
    pub context: String,
    /// Dockerfile path, defaults to `{context}/Dockerfile`
    #[serde(default)]
    pub dockerfile: Option<String>,
    /// Also push the image under the floating `latest` tag
    ///
    /// The rollout never references `latest`.
    #[serde(default)]
    pub publish_latest: bool,
    #[serde(default = "default_stability_timeout")]
    pub stability_timeout: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Deploy {
    pub fn validate(&self) -> Result<(), Error> {
        if self.repository.is_empty() {
            return Err(Error::InvalidDeploy("repository is empty".to_string()));
        }
        for (field, value) in [
            ("stability_timeout", self.stability_timeout),
            ("poll_interval", self.poll_interval),
        ] {
            if value > MAX_WAIT {
                return Err(Error::InvalidDeploy(format!(
                    "{field} ({value}s) exceeds {MAX_WAIT}s"
                )));
            }
        }
        Ok(())
    }
}

/// The full stack description.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Stack {
    pub name: String,
    pub region: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub network: Network,
    pub cluster: Cluster,
    pub access: Access,
    pub edge: Edge,
    pub workload: Workload,
    pub deploy: Deploy,
}

impl Stack {
    /// Loads a stack from a YAML file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }

    /// Checks every section, in dependency order, stopping at the first violation.
    pub fn validate(&self) -> Result<(), Error> {
        self.network.validate()?;
        self.cluster.validate()?;
        self.access.validate()?;
        self.edge.validate()?;
        self.workload.validate()?;
        self.deploy.validate()?;

        // The target group forwards straight to the container (awsvpc)
        if self.edge.target_group.port != self.workload.container.port {
            return Err(Error::PortMismatch {
                target_group: self.edge.target_group.port,
                container: self.workload.container.port,
            });
        }
        Ok(())
    }

    /// Outputs that are known without asking the control plane.
    pub fn outputs_template(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("region".to_string(), self.region.clone()),
            ("vpc_cidr".to_string(), self.network.cidr.to_string()),
            ("cluster_name".to_string(), self.cluster.name.clone()),
            ("service_name".to_string(), self.workload.service.clone()),
            (
                "task_definition_family".to_string(),
                self.workload.family.clone(),
            ),
            (
                "container_name".to_string(),
                self.workload.container.name.clone(),
            ),
            (
                "load_balancer_name".to_string(),
                self.edge.load_balancer.clone(),
            ),
            (
                "target_group_name".to_string(),
                self.edge.target_group.name.clone(),
            ),
            (
                "execution_role_name".to_string(),
                self.access.execution_role.name.clone(),
            ),
            (
                "task_role_name".to_string(),
                self.access.task_role.name.clone(),
            ),
        ])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const STACK: &str = r#"
name: nodejs-app
region: us-east-1
tags:
  project: nodejs-app
network:
  cidr: 10.0.0.0/16
  availability_zones: [us-east-1a, us-east-1b]
  public_subnets: [10.0.101.0/24, 10.0.102.0/24]
  private_subnets: [10.0.1.0/24, 10.0.2.0/24]
cluster:
  name: nodejs-cluster
  capacity_providers:
    - name: FARGATE
      weight: 1
      base: 1
    - name: FARGATE_SPOT
      weight: 4
access:
  execution_role:
    name: nodejs-app-execution
  task_role:
    name: nodejs-app-task
    statements:
      - actions: ["s3:GetObject"]
        resources: ["arn:aws:s3:::nodejs-app-assets/*"]
edge:
  load_balancer: nodejs-app-alb
  listener_port: 80
  target_group:
    name: nodejs-app-tg
    port: 3000
    health_check:
      path: /health
workload:
  family: nodejs-app
  service: nodejs-app-service
  cpu: 256
  memory: 512
  image: 123456789012.dkr.ecr.us-east-1.amazonaws.com/nodejs-app:initial
  container:
    name: nodejs-app
    port: 3000
    environment:
      NODE_ENV: production
  scaling:
    min_capacity: 1
    max_capacity: 4
    desired_count: 2
deploy:
  repository: 123456789012.dkr.ecr.us-east-1.amazonaws.com/nodejs-app
  context: app
"#;

    pub(crate) fn stack() -> Stack {
        serde_yaml::from_str(STACK).unwrap()
    }

    #[test]
    fn test_parse_defaults() {
        let stack = stack();
        assert!(stack.network.nat_gateway);
        assert_eq!(stack.deploy.stability_timeout, DEFAULT_STABILITY_TIMEOUT);
        assert_eq!(stack.deploy.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(!stack.deploy.publish_latest);
        assert_eq!(stack.edge.target_group.health_check.interval, 30);
        stack.validate().unwrap();
    }

    #[test]
    fn test_port_mismatch() {
        let mut stack = stack();
        stack.edge.target_group.port = 8080;
        assert!(matches!(
            stack.validate(),
            Err(Error::PortMismatch {
                target_group: 8080,
                container: 3000
            })
        ));
    }

    #[test]
    fn test_validation_order() {
        // Network errors surface before workload errors
        let mut stack = stack();
        stack.network.private_subnets.pop();
        stack.workload.scaling.desired_count = 10;
        assert!(matches!(
            stack.validate(),
            Err(Error::SubnetCountMismatch { kind: "private", .. })
        ));
    }

    #[test]
    fn test_stability_timeout_bounded() {
        let mut stack = stack();
        stack.deploy.stability_timeout = MAX_WAIT;
        stack.validate().unwrap();

        stack.deploy.stability_timeout = u64::MAX;
        assert!(matches!(
            stack.validate(),
            Err(Error::InvalidDeploy(reason)) if reason.starts_with("stability_timeout")
        ));
    }

    #[test]
    fn test_poll_interval_bounded() {
        let mut stack = stack();
        stack.deploy.poll_interval = MAX_WAIT + 1;
        assert!(matches!(
            stack.validate(),
            Err(Error::InvalidDeploy(reason)) if reason.starts_with("poll_interval")
        ));
    }

    #[test]
    fn test_outputs_template() {
        let outputs = stack().outputs_template();
        assert_eq!(outputs["cluster_name"], "nodejs-cluster");
        assert_eq!(outputs["vpc_cidr"], "10.0.0.0/16");
        assert_eq!(outputs["target_group_name"], "nodejs-app-tg");
    }
}

//! IAM roles assumed by the ECS agent (execution) and by the workload (task).

use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Managed policy that lets the ECS agent pull images and write logs
pub const TASK_EXECUTION_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";

/// IAM policy language version
const POLICY_VERSION: &str = "2012-10-17";

fn default_managed_policies() -> Vec<String> {
    vec![TASK_EXECUTION_POLICY_ARN.to_string()]
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PolicyStatement {
    #[serde(default)]
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl PolicyStatement {
    fn validate(&self) -> Result<(), Error> {
        if self.actions.is_empty() {
            return Err(Error::InvalidPolicyStatement("no actions".into()));
        }
        if self.resources.is_empty() {
            return Err(Error::InvalidPolicyStatement("no resources".into()));
        }
        for action in &self.actions {
            if action == "*" {
                continue;
            }
            let valid = match action.split_once(':') {
                Some((service, name)) => {
                    !service.is_empty()
                        && service
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '-')
                        && !name.is_empty()
                        && !name.contains(':')
                }
                None => false,
            };
            if !valid {
                return Err(Error::InvalidPolicyStatement(format!(
                    "malformed action: {action}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ExecutionRole {
    pub name: String,
    #[serde(default = "default_managed_policies")]
    pub managed_policies: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TaskRole {
    pub name: String,
    #[serde(default)]
    pub statements: Vec<PolicyStatement>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Access {
    pub execution_role: ExecutionRole,
    pub task_role: TaskRole,
}

impl Access {
    pub fn validate(&self) -> Result<(), Error> {
        for name in [&self.execution_role.name, &self.task_role.name] {
            if name.is_empty() {
                return Err(Error::InvalidRole("empty role name".into()));
            }
        }
        if self.execution_role.name == self.task_role.name {
            return Err(Error::InvalidRole(format!(
                "execution and task role share the name {}",
                self.task_role.name
            )));
        }
        if !self
            .execution_role
            .managed_policies
            .iter()
            .any(|p| p == TASK_EXECUTION_POLICY_ARN)
        {
            return Err(Error::MissingExecutionPolicy(
                self.execution_role.name.clone(),
            ));
        }
        for statement in &self.task_role.statements {
            statement.validate()?;
        }
        Ok(())
    }

    /// Renders the task role's statements as an IAM policy document.
    pub fn task_policy_document(&self) -> Value {
        let statements: Vec<Value> = self
            .task_role
            .statements
            .iter()
            .map(|s| {
                json!({
                    "Effect": match s.effect {
                        Effect::Allow => "Allow",
                        Effect::Deny => "Deny",
                    },
                    "Action": s.actions,
                    "Resource": s.resources,
                })
            })
            .collect();
        json!({
            "Version": POLICY_VERSION,
            "Statement": statements,
        })
    }
}

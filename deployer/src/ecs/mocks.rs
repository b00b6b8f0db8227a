//! In-memory control plane for exercising rollouts without AWS.

use super::ServiceUpdate;
use crate::{
    rollout::{Deployment, Observation, Progress, PRIMARY},
    Error,
};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, sync::Mutex};

/// ARN of revision `revision` of `family` in the mock account.
pub fn task_definition_arn(family: &str, revision: u32) -> String {
    format!("arn:aws:ecs:us-east-1:000000000000:task-definition/{family}:{revision}")
}

/// How the service reacts to a new task definition.
#[derive(Clone, Debug)]
pub enum Behavior {
    /// Converge after `after` polls.
    Stabilize { after: usize },
    /// Report the deployment as failed after `after` polls.
    Fail { after: usize, reason: String },
    /// Never converge.
    Stall,
    /// Start another deployment after `after` polls.
    Supersede { after: usize },
}

struct State {
    /// Registered revisions per family, oldest first
    definitions: BTreeMap<String, Vec<Value>>,
    registered: Vec<Value>,
    updates: Vec<ServiceUpdate>,
    current: String,
    previous: Option<String>,
    desired: u32,
    polls: usize,
}

pub struct ControlPlane {
    behavior: Behavior,
    state: Mutex<State>,
}

impl ControlPlane {
    /// Creates a control plane whose service runs revision 1 of `document` with
    /// `desired` tasks.
    pub fn new(document: Value, desired: u32, behavior: Behavior) -> Self {
        let family = document
            .get("family")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let current = task_definition_arn(&family, 1);
        let mut definitions = BTreeMap::new();
        definitions.insert(family, vec![document]);
        Self {
            behavior,
            state: Mutex::new(State {
                definitions,
                registered: Vec::new(),
                updates: Vec::new(),
                current,
                previous: None,
                desired,
                polls: 0,
            }),
        }
    }

    /// Documents submitted for registration, in order.
    pub fn registered(&self) -> Vec<Value> {
        self.state.lock().unwrap().registered.clone()
    }

    /// Service updates submitted, in order.
    pub fn updates(&self) -> Vec<ServiceUpdate> {
        self.state.lock().unwrap().updates.clone()
    }

    fn deployment(status: &str, task_definition: &str, desired: u32, running: u32) -> Deployment {
        Deployment {
            id: format!("ecs-svc/{}", task_definition.rsplit('/').next().unwrap_or_default()),
            status: status.to_string(),
            task_definition: task_definition.to_string(),
            desired,
            running,
            pending: desired - running,
            failed: 0,
            progress: Some(if running == desired {
                Progress::Completed
            } else {
                Progress::InProgress
            }),
            reason: None,
        }
    }
}

impl super::ControlPlane for ControlPlane {
    type TaskDefinition = Value;

    async fn describe_task_definition(&self, family: &str) -> Result<Option<Value>, Error> {
        let state = self.state.lock().unwrap();
        let Some(revisions) = state.definitions.get(family) else {
            return Ok(None);
        };
        let Some(latest) = revisions.last() else {
            return Ok(None);
        };

        // Attach the fields the control plane adds on describe
        let revision = revisions.len() as u32;
        let mut document = Map::new();
        document.insert(
            "taskDefinitionArn".to_string(),
            Value::String(task_definition_arn(family, revision)),
        );
        if let Some(object) = latest.as_object() {
            document.extend(object.clone());
        }
        document.insert("revision".to_string(), Value::from(revision));
        document.insert("status".to_string(), Value::String("ACTIVE".to_string()));
        Ok(Some(Value::Object(document)))
    }

    async fn register_task_definition(&self, document: &Value) -> Result<String, Error> {
        let family = document
            .get("family")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidTaskDefinition("missing family".to_string()))?;
        let mut state = self.state.lock().unwrap();
        state.registered.push(document.clone());
        let revisions = state.definitions.entry(family.to_string()).or_default();
        revisions.push(document.clone());
        Ok(task_definition_arn(family, revisions.len() as u32))
    }

    async fn update_service(
        &self,
        _cluster: &str,
        _service: &str,
        update: &ServiceUpdate,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.updates.push(update.clone());
        if let Some(count) = update.desired_count {
            state.desired = count;
        }
        if let Some(task_definition) = &update.task_definition {
            state.previous = Some(state.current.clone());
            state.current = task_definition.clone();
            state.polls = 0;
        }
        Ok(())
    }

    async fn describe_service(&self, cluster: &str, service: &str) -> Result<Observation, Error> {
        let mut state = self.state.lock().unwrap();
        let desired = state.desired;
        let polls = state.polls;
        state.polls += 1;

        let settled = vec![Self::deployment(PRIMARY, &state.current, desired, desired)];
        let converging = |previous: &str| {
            vec![
                Self::deployment(PRIMARY, &state.current, desired, 0),
                Self::deployment("ACTIVE", previous, desired, desired),
            ]
        };
        let deployments = match (&state.previous, &self.behavior) {
            (None, _) => settled,
            (Some(_), Behavior::Stabilize { after }) if polls >= *after => settled,
            (Some(previous), Behavior::Fail { after, reason }) if polls >= *after => {
                let mut deployments = converging(previous);
                deployments[0].progress = Some(Progress::Failed);
                deployments[0].reason = Some(reason.clone());
                deployments
            }
            (Some(previous), Behavior::Supersede { after }) if polls >= *after => {
                let mut deployments = converging(previous);
                deployments[0].status = "ACTIVE".to_string();
                deployments.insert(
                    0,
                    Self::deployment(PRIMARY, &format!("{}-next", state.current), desired, 0),
                );
                deployments
            }
            (Some(previous), _) => converging(previous),
        };

        let running = deployments.iter().map(|d| d.running).sum();
        Ok(Observation {
            service_arn: Some(format!(
                "arn:aws:ecs:us-east-1:000000000000:service/{cluster}/{service}"
            )),
            task_definition: deployments[0].task_definition.clone(),
            desired,
            running,
            pending: deployments.iter().map(|d| d.pending).sum(),
            deployments,
        })
    }
}

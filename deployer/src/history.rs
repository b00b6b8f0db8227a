//! Local ledger of rollouts, used to pick a rollback target.

use crate::{rollout::RolloutState, Error};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

/// Directory (under `$HOME`) holding per-deployment state
pub const DEPLOYER_DIRECTORY: &str = ".fargate_deployer";

/// Subdirectory holding rollout records
pub const ROLLOUTS_DIRECTORY: &str = "rollouts";

/// Returns `$HOME/.fargate_deployer[/name]`.
pub fn deployer_directory(name: Option<&str>) -> Result<PathBuf, Error> {
    let home = std::env::var("HOME").map_err(|_| Error::HomeNotSet)?;
    let base = PathBuf::from(home).join(DEPLOYER_DIRECTORY);
    Ok(match name {
        Some(name) => base.join(name),
        None => base,
    })
}

/// Outcome of one rollout.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RolloutRecord {
    pub tag: String,
    pub image: String,
    /// Registered task definition, if the run got that far
    pub task_definition: Option<String>,
    pub state: RolloutState,
    pub started_at: u64,
    pub finished_at: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Rollout records of a single deployment, stored one YAML file per run.
pub struct History {
    directory: PathBuf,
}

impl History {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    /// Opens the history of the deployment `name` under [deployer_directory].
    pub fn open(name: &str) -> Result<Self, Error> {
        Ok(Self::new(
            deployer_directory(Some(name))?.join(ROLLOUTS_DIRECTORY),
        ))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Persists a record, returning the path it was written to.
    pub fn record(&self, record: &RolloutRecord) -> Result<PathBuf, Error> {
        fs::create_dir_all(&self.directory)?;
        let path = self
            .directory
            .join(format!("{}-{}.yaml", record.started_at, record.tag));
        let file = File::create(&path)?;
        serde_yaml::to_writer(file, record)?;
        Ok(path)
    }

    /// Loads every record, newest first.
    pub fn load(&self) -> Result<Vec<RolloutRecord>, Error> {
        if !self.directory.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let file = File::open(&path)?;
            records.push(serde_yaml::from_reader::<_, RolloutRecord>(file)?);
        }
        records.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.tag.cmp(&a.tag))
        });
        Ok(records)
    }

    /// Most recent steady rollout whose tag differs from `current`.
    pub fn previous_successful(&self, current: &str) -> Result<Option<RolloutRecord>, Error> {
        Ok(self
            .load()?
            .into_iter()
            .find(|r| r.state == RolloutState::Steady && r.tag != current))
    }
}

//! Task definition shape, service and target-tracking autoscaling.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Memory (MiB) allowed for each Fargate CPU size: (cpu, min, max, step).
const FARGATE_SHAPES: &[(u32, u32, u32, u32)] = &[
    (256, 512, 512, 512),
    (256, 1024, 2048, 1024),
    (512, 1024, 4096, 1024),
    (1024, 2048, 8192, 1024),
    (2048, 4096, 16384, 1024),
    (4096, 8192, 30720, 1024),
    (8192, 16384, 61440, 4096),
    (16384, 32768, 122880, 8192),
];

/// CPU units and memory (MiB) of a Fargate task.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskShape {
    pub cpu: u32,
    pub memory: u32,
}

impl TaskShape {
    pub fn validate(&self) -> Result<(), Error> {
        let supported = FARGATE_SHAPES.iter().any(|&(cpu, min, max, step)| {
            cpu == self.cpu
                && (min..=max).contains(&self.memory)
                && (self.memory - min) % step == 0
        });
        if !supported {
            return Err(Error::InvalidTaskShape {
                cpu: self.cpu,
                memory: self.memory,
            });
        }
        Ok(())
    }

    /// Every supported shape, smallest first.
    pub fn all() -> impl Iterator<Item = TaskShape> {
        FARGATE_SHAPES.iter().flat_map(|&(cpu, min, max, step)| {
            (min..=max)
                .step_by(step as usize)
                .map(move |memory| TaskShape { cpu, memory })
        })
    }
}

fn default_target() -> f64 {
    70.0
}

fn default_cooldown() -> u64 {
    300
}

fn default_log_stream_prefix() -> String {
    "ecs".to_string()
}

/// Target-tracking autoscaling keyed on CPU and memory utilisation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Scaling {
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub desired_count: u32,
    #[serde(default = "default_target")]
    pub cpu_target: f64,
    #[serde(default = "default_target")]
    pub memory_target: f64,
    /// Seconds
    #[serde(default = "default_cooldown")]
    pub scale_in_cooldown: u64,
    /// Seconds
    #[serde(default = "default_cooldown")]
    pub scale_out_cooldown: u64,
}

impl Scaling {
    /// Rejects a desired count outside of `[min_capacity, max_capacity]`.
    pub fn check_desired(&self, desired: u32) -> Result<(), Error> {
        if desired < self.min_capacity || desired > self.max_capacity {
            return Err(Error::DesiredCountOutOfRange {
                desired,
                min: self.min_capacity,
                max: self.max_capacity,
            });
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_capacity == 0 {
            return Err(Error::InvalidScaling("max_capacity must be positive".into()));
        }
        if self.min_capacity > self.max_capacity {
            return Err(Error::InvalidScaling(format!(
                "min_capacity ({}) exceeds max_capacity ({})",
                self.min_capacity, self.max_capacity
            )));
        }
        for (name, target) in [
            ("cpu_target", self.cpu_target),
            ("memory_target", self.memory_target),
        ] {
            if !(target > 0.0 && target <= 100.0) {
                return Err(Error::InvalidScaling(format!(
                    "{name} must be within (0, 100]: {target}"
                )));
            }
        }
        self.check_desired(self.desired_count)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// CloudWatch log group, defaults to `/ecs/{family}`
    #[serde(default)]
    pub log_group: Option<String>,
    #[serde(default = "default_log_stream_prefix")]
    pub log_stream_prefix: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Workload {
    pub family: String,
    pub service: String,
    pub cpu: u32,
    pub memory: u32,
    /// Image the task definition is first registered with
    pub image: String,
    pub container: Container,
    pub scaling: Scaling,
}

impl Workload {
    pub fn shape(&self) -> TaskShape {
        TaskShape {
            cpu: self.cpu,
            memory: self.memory,
        }
    }

    pub fn log_group(&self) -> String {
        self.container
            .log_group
            .clone()
            .unwrap_or_else(|| format!("/ecs/{}", self.family))
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.container.name.is_empty() {
            return Err(Error::InvalidTaskDefinition("empty container name".into()));
        }
        if self.container.port == 0 {
            return Err(Error::InvalidTaskDefinition(
                "container port must be non-zero".into(),
            ));
        }
        self.shape().validate()?;
        self.scaling.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn scaling() -> Scaling {
        Scaling {
            min_capacity: 1,
            max_capacity: 4,
            desired_count: 2,
            cpu_target: default_target(),
            memory_target: default_target(),
            scale_in_cooldown: default_cooldown(),
            scale_out_cooldown: default_cooldown(),
        }
    }

    #[test_case(256, 512; "smallest")]
    #[test_case(256, 2048; "small max")]
    #[test_case(1024, 3072; "stepped")]
    #[test_case(4096, 30720; "large max")]
    #[test_case(16384, 122880; "largest")]
    fn test_shape(cpu: u32, memory: u32) {
        TaskShape { cpu, memory }.validate().unwrap();
    }

    #[test_case(256, 4096; "too much memory")]
    #[test_case(256, 1536; "between small sizes")]
    #[test_case(512, 512; "too little memory")]
    #[test_case(8192, 18432; "off step")]
    #[test_case(300, 1024; "unknown cpu")]
    fn test_shape_invalid(cpu: u32, memory: u32) {
        assert!(matches!(
            TaskShape { cpu, memory }.validate(),
            Err(Error::InvalidTaskShape { .. })
        ));
    }

    #[test]
    fn test_all_shapes_valid() {
        let shapes: Vec<_> = TaskShape::all().collect();
        assert_eq!(shapes[0], TaskShape { cpu: 256, memory: 512 });
        for shape in shapes {
            shape.validate().unwrap();
        }
    }

    #[test_case(0, false; "below min")]
    #[test_case(1, true; "min")]
    #[test_case(4, true; "max")]
    #[test_case(5, false; "above max")]
    fn test_check_desired(desired: u32, ok: bool) {
        let result = scaling().check_desired(desired);
        assert_eq!(result.is_ok(), ok);
        if !ok {
            assert!(matches!(
                result,
                Err(Error::DesiredCountOutOfRange { min: 1, max: 4, .. })
            ));
        }
    }

    #[test]
    fn test_inverted_bounds() {
        let mut scaling = scaling();
        scaling.min_capacity = 5;
        assert!(matches!(scaling.validate(), Err(Error::InvalidScaling(_))));
    }

    #[test_case(0.0; "zero")]
    #[test_case(120.0; "over")]
    #[test_case(f64::NAN; "nan")]
    fn test_invalid_target(target: f64) {
        let mut scaling = scaling();
        scaling.memory_target = target;
        assert!(matches!(scaling.validate(), Err(Error::InvalidScaling(_))));
    }
}

//! Application load balancer, target group and listener in front of the service.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Allowed healthy/unhealthy threshold counts
const THRESHOLD_RANGE: RangeInclusive<u32> = 2..=10;

/// Allowed health check interval (in seconds)
const INTERVAL_RANGE: RangeInclusive<u32> = 5..=300;

/// Allowed health check timeout (in seconds)
const TIMEOUT_RANGE: RangeInclusive<u32> = 2..=120;

/// HTTP codes a matcher may reference
const MATCHER_CODES: RangeInclusive<u16> = 200..=499;

fn default_path() -> String {
    "/".to_string()
}

fn default_interval() -> u32 {
    30
}

fn default_timeout() -> u32 {
    5
}

fn default_healthy_threshold() -> u32 {
    3
}

fn default_unhealthy_threshold() -> u32 {
    3
}

fn default_matcher() -> String {
    "200".to_string()
}

fn default_protocol() -> String {
    "HTTP".to_string()
}

fn default_listener_port() -> u16 {
    80
}

/// Periodic HTTP GET check used to mark targets healthy.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HealthCheck {
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
    #[serde(default = "default_matcher")]
    pub matcher: String,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: default_path(),
            interval: default_interval(),
            timeout: default_timeout(),
            healthy_threshold: default_healthy_threshold(),
            unhealthy_threshold: default_unhealthy_threshold(),
            matcher: default_matcher(),
        }
    }
}

impl HealthCheck {
    pub fn validate(&self) -> Result<(), Error> {
        if !self.path.starts_with('/') {
            return Err(Error::InvalidHealthCheck(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        for (name, value) in [
            ("healthy_threshold", self.healthy_threshold),
            ("unhealthy_threshold", self.unhealthy_threshold),
        ] {
            if !THRESHOLD_RANGE.contains(&value) {
                return Err(Error::InvalidHealthCheck(format!(
                    "{name} must be within {THRESHOLD_RANGE:?}: {value}"
                )));
            }
        }
        if !INTERVAL_RANGE.contains(&self.interval) {
            return Err(Error::InvalidHealthCheck(format!(
                "interval must be within {INTERVAL_RANGE:?}: {}",
                self.interval
            )));
        }
        if !TIMEOUT_RANGE.contains(&self.timeout) {
            return Err(Error::InvalidHealthCheck(format!(
                "timeout must be within {TIMEOUT_RANGE:?}: {}",
                self.timeout
            )));
        }
        if self.timeout >= self.interval {
            return Err(Error::InvalidHealthCheck(format!(
                "timeout ({}) must be less than interval ({})",
                self.timeout, self.interval
            )));
        }
        validate_matcher(&self.matcher)
    }
}

/// Accepts `200`, `200,202` or `200-299`.
fn validate_matcher(matcher: &str) -> Result<(), Error> {
    let invalid = || Error::InvalidHealthCheck(format!("invalid matcher: {matcher}"));
    let code = |s: &str| -> Result<u16, Error> {
        let code = s.trim().parse::<u16>().map_err(|_| invalid())?;
        if !MATCHER_CODES.contains(&code) {
            return Err(invalid());
        }
        Ok(code)
    };
    if let Some((low, high)) = matcher.split_once('-') {
        if code(low)? > code(high)? {
            return Err(invalid());
        }
        return Ok(());
    }
    for part in matcher.split(',') {
        code(part)?;
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    #[default]
    Ip,
    Instance,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TargetGroup {
    pub name: String,
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub target_type: TargetType,
    #[serde(default)]
    pub health_check: HealthCheck,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub load_balancer: String,
    #[serde(default = "default_listener_port")]
    pub listener_port: u16,
    pub target_group: TargetGroup,
}

impl Edge {
    pub fn validate(&self) -> Result<(), Error> {
        // Fargate tasks use awsvpc networking and register by IP
        if self.target_group.target_type != TargetType::Ip {
            return Err(Error::InvalidTargetGroup(format!(
                "{} must use target type ip",
                self.target_group.name
            )));
        }
        if self.target_group.port == 0 || self.listener_port == 0 {
            return Err(Error::InvalidTargetGroup("port must be non-zero".into()));
        }
        if !matches!(self.target_group.protocol.as_str(), "HTTP" | "HTTPS") {
            return Err(Error::InvalidTargetGroup(format!(
                "unsupported protocol: {}",
                self.target_group.protocol
            )));
        }
        self.target_group.health_check.validate()
    }
}

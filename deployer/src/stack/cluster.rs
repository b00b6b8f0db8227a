//! ECS cluster backed by the Fargate capacity providers.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CapacityProviderName {
    #[serde(rename = "FARGATE")]
    Fargate,
    #[serde(rename = "FARGATE_SPOT")]
    FargateSpot,
}

impl CapacityProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fargate => "FARGATE",
            Self::FargateSpot => "FARGATE_SPOT",
        }
    }
}

impl fmt::Display for CapacityProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry of the cluster's default capacity provider strategy.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CapacityProvider {
    pub name: CapacityProviderName,
    pub weight: u32,
    /// Tasks always placed on this provider before weights apply
    #[serde(default)]
    pub base: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Cluster {
    pub name: String,
    pub capacity_providers: Vec<CapacityProvider>,
    #[serde(default)]
    pub container_insights: bool,
}

impl Cluster {
    pub fn validate(&self) -> Result<(), Error> {
        if self.capacity_providers.is_empty() {
            return Err(Error::NoCapacityProviders);
        }
        for (i, provider) in self.capacity_providers.iter().enumerate() {
            if self.capacity_providers[..i]
                .iter()
                .any(|p| p.name == provider.name)
            {
                return Err(Error::DuplicateCapacityProvider(provider.name.to_string()));
            }
        }
        let based = self
            .capacity_providers
            .iter()
            .filter(|p| p.base > 0)
            .count();
        if based > 1 {
            return Err(Error::MultipleBaseProviders(based));
        }
        if self.capacity_providers.iter().all(|p| p.weight == 0) {
            return Err(Error::ZeroCapacityWeight);
        }
        Ok(())
    }

    /// Splits `tasks` across the capacity providers.
    ///
    /// The provider with a base receives up to `base` tasks first. The remainder is split
    /// in proportion to the weights, handing leftover tasks to the largest fractional
    /// shares (earlier providers win ties).
    pub fn placement(&self, tasks: u32) -> BTreeMap<CapacityProviderName, u32> {
        let mut placement: BTreeMap<CapacityProviderName, u32> = self
            .capacity_providers
            .iter()
            .map(|p| (p.name, 0))
            .collect();

        let mut remaining = tasks;
        if let Some(based) = self.capacity_providers.iter().find(|p| p.base > 0) {
            let count = based.base.min(remaining);
            *placement.entry(based.name).or_default() += count;
            remaining -= count;
        }

        let total: u64 = self
            .capacity_providers
            .iter()
            .map(|p| u64::from(p.weight))
            .sum();
        if total == 0 || remaining == 0 {
            return placement;
        }

        // (index, floor share, fractional numerator)
        let mut shares: Vec<(usize, u64, u64)> = self
            .capacity_providers
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let exact = u64::from(remaining) * u64::from(p.weight);
                (i, exact / total, exact % total)
            })
            .collect();
        let assigned: u64 = shares.iter().map(|(_, floor, _)| floor).sum();
        let mut leftover = u64::from(remaining) - assigned;
        shares.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
        for (i, floor, fraction) in shares {
            let mut count = floor;
            if leftover > 0 && fraction > 0 {
                count += 1;
                leftover -= 1;
            }
            let name = self.capacity_providers[i].name;
            // Bounded by `remaining`, which is a u32
            *placement.entry(name).or_default() += count as u32;
        }
        placement
    }
}

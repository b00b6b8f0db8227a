//! VPC with one public and one private subnet per availability zone.

use crate::Error;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, net::Ipv4Addr, str::FromStr};

/// An IPv4 network in CIDR notation.
///
/// Host bits must be zero (`10.0.1.0/24`, not `10.0.1.7/24`).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr(Ipv4Net);

impl Cidr {
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self, Error> {
        let net = Ipv4Net::new(network, prefix)
            .map_err(|_| Error::InvalidCidr(format!("{network}/{prefix}")))?;
        if net.trunc() != net {
            return Err(Error::InvalidCidr(net.to_string()));
        }
        Ok(Self(net))
    }

    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }

    pub fn prefix(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Number of addresses in the block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix()))
    }

    /// Returns true if `other` lies entirely within `self`.
    pub fn contains(&self, other: &Cidr) -> bool {
        self.0.contains(&other.0)
    }

    /// Returns true if the two blocks share at least one address.
    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let net = s
            .parse::<Ipv4Net>()
            .map_err(|_| Error::InvalidCidr(s.to_string()))?;
        Self::new(net.addr(), net.prefix_len())
    }
}

impl TryFrom<String> for Cidr {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(value: Cidr) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn default_nat_gateway() -> bool {
    true
}

/// Subnets assigned to a single availability zone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubnetPlacement {
    pub availability_zone: String,
    pub public: Cidr,
    pub private: Cidr,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Network {
    pub cidr: Cidr,
    pub availability_zones: Vec<String>,
    pub public_subnets: Vec<Cidr>,
    pub private_subnets: Vec<Cidr>,
    /// Route private subnets through a NAT gateway (required to pull images from
    /// private subnets without VPC endpoints)
    #[serde(default = "default_nat_gateway")]
    pub nat_gateway: bool,
}

impl Network {
    pub fn validate(&self) -> Result<(), Error> {
        if self.availability_zones.is_empty() {
            return Err(Error::NoAvailabilityZones);
        }
        let mut zones = HashSet::new();
        for zone in &self.availability_zones {
            if !zones.insert(zone) {
                return Err(Error::DuplicateAvailabilityZone(zone.clone()));
            }
        }
        let zones = self.availability_zones.len();
        for (kind, subnets) in [
            ("public", &self.public_subnets),
            ("private", &self.private_subnets),
        ] {
            if subnets.len() != zones {
                return Err(Error::SubnetCountMismatch {
                    kind,
                    subnets: subnets.len(),
                    zones,
                });
            }
        }

        let subnets: Vec<&Cidr> = self
            .public_subnets
            .iter()
            .chain(self.private_subnets.iter())
            .collect();
        for subnet in &subnets {
            if !self.cidr.contains(subnet) {
                return Err(Error::SubnetOutsideVpc(
                    subnet.to_string(),
                    self.cidr.to_string(),
                ));
            }
        }
        for (i, a) in subnets.iter().enumerate() {
            for b in &subnets[i + 1..] {
                if a.overlaps(b) {
                    return Err(Error::SubnetOverlap(a.to_string(), b.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Pairs each availability zone with its public and private subnet.
    pub fn subnet_layout(&self) -> Vec<SubnetPlacement> {
        self.availability_zones
            .iter()
            .zip(self.public_subnets.iter())
            .zip(self.private_subnets.iter())
            .map(|((zone, public), private)| SubnetPlacement {
                availability_zone: zone.clone(),
                public: *public,
                private: *private,
            })
            .collect()
    }
}

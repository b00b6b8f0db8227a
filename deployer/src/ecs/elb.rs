//! Elastic Load Balancing lookups for stack outputs.

use super::ElbOperation;
use crate::Error;
use aws_config::SdkConfig;
use aws_sdk_elasticloadbalancingv2::Client as ElbClient;

/// An application load balancer by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadBalancer {
    pub arn: String,
    pub dns_name: String,
}

pub struct Elb {
    client: ElbClient,
}

impl Elb {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: ElbClient::new(config),
        }
    }

    pub async fn load_balancer(&self, name: &str) -> Result<Option<LoadBalancer>, Error> {
        let output = match self.client.describe_load_balancers().names(name).send().await {
            Ok(output) => output,
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_load_balancer_not_found_exception() {
                    return Ok(None);
                }
                return Err(Error::AwsElb {
                    operation: ElbOperation::DescribeLoadBalancers,
                    source: Box::new(aws_sdk_elasticloadbalancingv2::Error::from(service_err)),
                });
            }
        };
        Ok(output.load_balancers().first().map(|lb| LoadBalancer {
            arn: lb.load_balancer_arn().unwrap_or_default().to_string(),
            dns_name: lb.dns_name().unwrap_or_default().to_string(),
        }))
    }

    pub async fn target_group_arn(&self, name: &str) -> Result<Option<String>, Error> {
        let output = match self.client.describe_target_groups().names(name).send().await {
            Ok(output) => output,
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_target_group_not_found_exception() {
                    return Ok(None);
                }
                return Err(Error::AwsElb {
                    operation: ElbOperation::DescribeTargetGroups,
                    source: Box::new(aws_sdk_elasticloadbalancingv2::Error::from(service_err)),
                });
            }
        };
        Ok(output
            .target_groups()
            .first()
            .and_then(|tg| tg.target_group_arn())
            .map(String::from))
    }
}

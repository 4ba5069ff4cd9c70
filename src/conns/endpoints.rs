//! Partitions, regions and per-service endpoint resolution.
//!
//! # Responsibilities
//! - Map a region to its partition and DNS suffix
//! - Validate a region against the known region list
//! - Resolve each service's endpoint URL and signing region, honouring
//!   user overrides and the regions "global" services are pinned to

use std::collections::BTreeMap;

use serde::Serialize;

use crate::conns::ConnsError;

/// An AWS partition: a group of regions sharing a DNS suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub id: &'static str,
    pub name: &'static str,
    pub dns_suffix: &'static str,
    pub regions: &'static [&'static str],
}

pub const AWS: Partition = Partition {
    id: "aws",
    name: "AWS Standard",
    dns_suffix: "amazonaws.com",
    regions: &[
        "af-south-1",
        "ap-east-1",
        "ap-northeast-1",
        "ap-northeast-2",
        "ap-northeast-3",
        "ap-south-1",
        "ap-southeast-1",
        "ap-southeast-2",
        "ca-central-1",
        "eu-central-1",
        "eu-north-1",
        "eu-south-1",
        "eu-west-1",
        "eu-west-2",
        "eu-west-3",
        "me-south-1",
        "sa-east-1",
        "us-east-1",
        "us-east-2",
        "us-west-1",
        "us-west-2",
    ],
};

pub const AWS_CN: Partition = Partition {
    id: "aws-cn",
    name: "AWS China",
    dns_suffix: "amazonaws.com.cn",
    regions: &["cn-north-1", "cn-northwest-1"],
};

pub const AWS_US_GOV: Partition = Partition {
    id: "aws-us-gov",
    name: "AWS GovCloud (US)",
    dns_suffix: "amazonaws.com",
    regions: &["us-gov-east-1", "us-gov-west-1"],
};

pub const AWS_ISO: Partition = Partition {
    id: "aws-iso",
    name: "AWS ISO (US)",
    dns_suffix: "c2s.ic.gov",
    regions: &["us-iso-east-1"],
};

pub const AWS_ISO_B: Partition = Partition {
    id: "aws-iso-b",
    name: "AWS ISOB (US)",
    dns_suffix: "sc2s.sgov.gov",
    regions: &["us-isob-east-1"],
};

pub const PARTITIONS: &[Partition] = &[AWS, AWS_CN, AWS_US_GOV, AWS_ISO, AWS_ISO_B];

/// Service identifiers the provider creates clients for.
pub const SERVICES: &[&str] = &[
    "acm",
    "apigateway",
    "applicationautoscaling",
    "appsync",
    "athena",
    "autoscaling",
    "cloudformation",
    "cloudfront",
    "cloudtrail",
    "cloudwatch",
    "cloudwatchevents",
    "cloudwatchlogs",
    "cognitoidp",
    "configservice",
    "dynamodb",
    "ec2",
    "ecr",
    "ecs",
    "efs",
    "eks",
    "elasticache",
    "elb",
    "emr",
    "es",
    "firehose",
    "globalaccelerator",
    "iam",
    "kafka",
    "kinesis",
    "kinesisanalytics",
    "kms",
    "lambda",
    "organizations",
    "rds",
    "route53",
    "s3",
    "secretsmanager",
    "shield",
    "sns",
    "sqs",
    "ssm",
    "storagegateway",
    "sts",
];

/// Deprecated endpoint keys still accepted, with the service they configure.
pub const ENDPOINT_ALIASES: &[(&str, &str)] = &[("kinesis_analytics", "kinesisanalytics"), ("r53", "route53")];

/// Whether `key` may appear in the `endpoints` configuration map.
pub fn is_endpoint_key(key: &str) -> bool {
    SERVICES.contains(&key) || ENDPOINT_ALIASES.iter().any(|(alias, _)| *alias == key)
}

/// The partition `region` belongs to.
///
/// Known regions are matched exactly; unknown ones by naming convention, so a
/// region newer than this table still gets the right DNS suffix.
pub fn partition_for_region(region: &str) -> Option<&'static Partition> {
    if let Some(p) = PARTITIONS.iter().find(|p| p.regions.contains(&region)) {
        return Some(p);
    }

    let parts: Vec<&str> = region.split('-').collect();
    let numbered = parts.len() >= 3
        && parts
            .last()
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
    if !numbered {
        return None;
    }

    let prefix = match parts[0] {
        "cn" => &AWS_CN,
        "us" if parts[1] == "gov" => &AWS_US_GOV,
        "us" if parts[1] == "isob" => &AWS_ISO_B,
        "us" if parts[1] == "iso" => &AWS_ISO,
        "us" | "eu" | "ap" | "sa" | "ca" | "me" | "af" => &AWS,
        _ => return None,
    };
    Some(prefix)
}

/// DNS suffix for `region`, defaulting to the standard partition's.
pub fn dns_suffix(region: &str) -> &'static str {
    partition_for_region(region)
        .map(|p| p.dns_suffix)
        .unwrap_or(AWS.dns_suffix)
}

/// Fail unless `region` is a region this crate knows about.
pub fn validate_region(region: &str) -> Result<(), ConnsError> {
    if PARTITIONS.iter().any(|p| p.regions.contains(&region)) {
        Ok(())
    } else {
        Err(ConnsError::InvalidRegion(region.to_string()))
    }
}

/// Where a service's requests go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEndpoint {
    pub service: String,
    pub url: String,
    /// Region requests are signed for.
    pub signing_region: String,
    /// True when the URL came from the user's `endpoints` map.
    pub overridden: bool,
}

/// Resolves endpoints for one provider configuration.
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    region: String,
    partition: &'static Partition,
    overrides: BTreeMap<String, String>,
}

impl EndpointResolver {
    pub fn new(region: impl Into<String>, overrides: &BTreeMap<String, String>) -> Self {
        let region = region.into();
        let partition = partition_for_region(&region).unwrap_or(&AWS);

        let mut resolved: BTreeMap<String, String> = overrides
            .iter()
            .filter(|(_, url)| !url.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (alias, service) in ENDPOINT_ALIASES {
            if let Some(url) = resolved.remove(*alias) {
                resolved.insert((*service).to_string(), url);
            }
        }

        Self {
            region,
            partition,
            overrides: resolved,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn partition(&self) -> &'static Partition {
        self.partition
    }

    pub fn resolve(&self, service: &str) -> ResolvedEndpoint {
        let pinned = global_endpoint(self.partition.id, service);
        let signing_region = pinned
            .map(|(region, _)| region.to_string())
            .unwrap_or_else(|| self.region.clone());

        let (url, overridden) = match self.overrides.get(service) {
            Some(url) => (url.clone(), true),
            None => match pinned.and_then(|(_, url)| url) {
                Some(url) => (url.to_string(), false),
                None => (
                    format!(
                        "https://{}.{}.{}",
                        endpoint_prefix(service),
                        signing_region,
                        self.partition.dns_suffix
                    ),
                    false,
                ),
            },
        };

        ResolvedEndpoint {
            service: service.to_string(),
            url,
            signing_region,
            overridden,
        }
    }

    /// Every known service, resolved.
    pub fn resolve_all(&self) -> Vec<ResolvedEndpoint> {
        SERVICES.iter().map(|s| self.resolve(s)).collect()
    }
}

/// Region a global service is pinned to in `partition`, plus its fixed URL
/// when the regional pattern does not apply.
fn global_endpoint(partition: &str, service: &str) -> Option<(&'static str, Option<&'static str>)> {
    match (partition, service) {
        ("aws", "globalaccelerator") => Some(("us-west-2", None)),
        ("aws", "route53") => Some(("us-east-1", Some("https://route53.amazonaws.com"))),
        ("aws", "shield") => Some(("us-east-1", None)),
        ("aws", "iam") => Some(("us-east-1", Some("https://iam.amazonaws.com"))),
        ("aws-cn", "route53") => Some(("cn-northwest-1", Some("https://api.route53.cn"))),
        ("aws-cn", "iam") => Some(("cn-north-1", Some("https://iam.cn-north-1.amazonaws.com.cn"))),
        ("aws-us-gov", "route53") => Some(("us-gov-west-1", Some("https://route53.us-gov.amazonaws.com"))),
        ("aws-us-gov", "iam") => Some(("us-gov-west-1", Some("https://iam.us-gov.amazonaws.com"))),
        _ => None,
    }
}

/// Hostname prefix for services whose endpoint name differs from their key.
fn endpoint_prefix(service: &str) -> &str {
    match service {
        "applicationautoscaling" => "application-autoscaling",
        "cloudwatch" => "monitoring",
        "cloudwatchevents" => "events",
        "cloudwatchlogs" => "logs",
        "cognitoidp" => "cognito-idp",
        "configservice" => "config",
        "elb" => "elasticloadbalancing",
        "emr" => "elasticmapreduce",
        other => other,
    }
}

//! Service-specific retry rules.
//!
//! Some services return errors with otherwise non-retryable codes during
//! known eventually-consistent windows (a concurrent modification still in
//! flight, a per-account "mutating objects" limit that drains on its own).
//! Each rule below names the service, the operations it applies to, the error
//! code and a message fragment; a service's rules are layered over the
//! standard retryer with [`add_with_error_predicate`].
//!
//! A rule can only widen what is retried, never narrow it. The DynamoDB, Kafka
//! and Kinesis rules match `LimitExceededException` and
//! `TooManyRequestsException`, which the standard retryer already treats as
//! throttling for every operation, so their operation scoping does not change
//! a decision today. They are kept so the tables list every known case.
//!
//! [`add_with_error_predicate`]: crate::resilience::retries::add_with_error_predicate

use std::error::Error as StdError;

use crate::resilience::errors::find_api_error;

/// Which operations a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMatch {
    /// Every operation of the service.
    Any,
    /// Only the named operations.
    Named(&'static [&'static str]),
    /// Operations whose name starts with one of the prefixes.
    Prefixed(&'static [&'static str]),
}

impl OperationMatch {
    pub fn matches(&self, operation: &str) -> bool {
        match self {
            OperationMatch::Any => true,
            OperationMatch::Named(names) => names.contains(&operation),
            OperationMatch::Prefixed(prefixes) => prefixes.iter().any(|p| operation.starts_with(p)),
        }
    }
}

/// One "retry this error" rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryRule {
    pub operations: OperationMatch,
    pub code: &'static str,
    /// Substring the error message must contain. Empty matches any message.
    pub message: &'static str,
}

impl RetryRule {
    pub fn matches(&self, err: &(dyn StdError + 'static)) -> bool {
        find_api_error(err).is_some_and(|api| {
            api.code == self.code
                && api.message.contains(self.message)
                && self.operations.matches(&api.operation)
        })
    }
}

const DESCRIBE_OR_LIST: OperationMatch = OperationMatch::Prefixed(&["Describe", "List"]);

const APPLICATION_AUTOSCALING: &[RetryRule] = &[RetryRule {
    operations: DESCRIBE_OR_LIST,
    code: "FailedResourceAccessException",
    message: "",
}];

const APPSYNC: &[RetryRule] = &[RetryRule {
    operations: OperationMatch::Named(&["CreateGraphqlApi"]),
    code: "ConcurrentModificationException",
    message: "a GraphQL API creation is already in progress",
}];

const DYNAMODB: &[RetryRule] = &[RetryRule {
    operations: OperationMatch::Named(&["PutItem", "UpdateItem", "DeleteItem"]),
    code: "LimitExceededException",
    message: "Subscriber limit exceeded:",
}];

const EC2: &[RetryRule] = &[
    RetryRule {
        operations: OperationMatch::Named(&["CreateClientVpnEndpoint"]),
        code: "OperationNotPermitted",
        message: "Endpoint cannot be created while another endpoint is being created",
    },
    RetryRule {
        operations: OperationMatch::Named(&["CreateVpnConnection"]),
        code: "VpnConnectionLimitExceeded",
        message: "maximum number of mutating objects has been reached",
    },
    RetryRule {
        operations: OperationMatch::Named(&["CreateVpnGateway"]),
        code: "VpnGatewayLimitExceeded",
        message: "maximum number of mutating objects has been reached",
    },
];

const KAFKA: &[RetryRule] = &[RetryRule {
    operations: OperationMatch::Any,
    code: "TooManyRequestsException",
    message: "Too Many Requests",
}];

const KINESIS: &[RetryRule] = &[
    RetryRule {
        operations: DESCRIBE_OR_LIST,
        code: "LimitExceededException",
        message: "",
    },
    RetryRule {
        operations: OperationMatch::Named(&["CreateStream"]),
        code: "LimitExceededException",
        message: "simultaneously be in CREATING or DELETING",
    },
    RetryRule {
        operations: OperationMatch::Named(&["CreateStream", "DeleteStream"]),
        code: "LimitExceededException",
        message: "Rate exceeded for stream",
    },
];

const ORGANIZATIONS: &[RetryRule] = &[RetryRule {
    operations: OperationMatch::Any,
    code: "ConcurrentModificationException",
    message: "Try again later",
}];

const STORAGEGATEWAY: &[RetryRule] = &[RetryRule {
    operations: OperationMatch::Any,
    code: "InvalidGatewayRequestException",
    message: "The specified gateway proxy network connection is busy",
}];

/// The retry rules registered for `service`. Empty for most services.
pub fn service_retry_rules(service: &str) -> &'static [RetryRule] {
    match service {
        "applicationautoscaling" => APPLICATION_AUTOSCALING,
        "appsync" => APPSYNC,
        "dynamodb" => DYNAMODB,
        "ec2" => EC2,
        "kafka" => KAFKA,
        "kinesis" => KINESIS,
        "organizations" => ORGANIZATIONS,
        "storagegateway" => STORAGEGATEWAY,
        _ => &[],
    }
}

/// Predicate matching any of `rules`.
pub fn rules_predicate(
    rules: &'static [RetryRule],
) -> impl Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + Clone {
    move |err| rules.iter().any(|rule| rule.matches(err))
}

/// Whether the error chain holds an `ApiError` with `code` whose message
/// contains `message`.
pub fn is_api_error(err: &(dyn StdError + 'static), code: &str, message: &str) -> bool {
    find_api_error(err).is_some_and(|api| api.code == code && api.message.contains(message))
}

use crate::{labels, K8sDuration, ResourceRef};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A mesh-agnostic routing and resilience intent applied to every service
/// selected by its destination selector.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "networking.meshhub.io",
    version = "v1alpha1",
    kind = "TrafficPolicy",
    derive = "PartialEq",
    status = "TrafficPolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPolicySpec {
    /// Restricts the policy to requests originating from matching workloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_selector: Option<WorkloadSelector>,

    /// Selects the services the policy applies to. When absent, the policy
    /// applies to every service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_selector: Option<ServiceSelector>,

    /// Requests must match at least one matcher for the policy to apply.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_request_matchers: Vec<HttpMatcher>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_shift: Option<MultiDestination>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_injection: Option<FaultInjection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<K8sDuration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<RetryPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors_policy: Option<CorsPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<Mirror>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_manipulation: Option<HeaderManipulation>,

    /// Outlier detection may only take one value per service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlier_detection: Option<OutlierDetection>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<labels::Map>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ServiceSelector {
    Matcher(ServiceMatcher),
    ServiceRefs(Vec<ResourceRef>),
}

/// Matches services by labels, namespaces and clusters. Empty fields match
/// everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<labels::Map>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<StringMatch>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderMatcher>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_parameters: Vec<QueryParameterMatcher>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum StringMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMatcher {
    pub name: String,

    #[serde(default)]
    pub value: String,

    /// Treats `value` as a regular expression.
    #[serde(default)]
    pub regex: bool,

    /// Matches requests that do *not* carry the header.
    #[serde(default)]
    pub invert_match: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameterMatcher {
    pub name: String,

    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub regex: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultiDestination {
    pub destinations: Vec<WeightedDestination>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeightedDestination {
    /// The Kubernetes service receiving traffic.
    pub destination: ResourceRef,

    pub weight: u32,

    /// Routes to the subset of the destination's endpoints carrying these
    /// labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<labels::Map>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
}

/// Injects faults into a percentage of requests. Exactly one of `abort`,
/// `fixedDelay` and `exponentialDelay` is expected.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FaultInjection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort: Option<Abort>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_delay: Option<K8sDuration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exponential_delay: Option<K8sDuration>,

    pub percentage: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Abort {
    pub http_status: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub attempts: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_try_timeout: Option<K8sDuration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CorsPolicy {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_origins: Vec<StringMatch>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_methods: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_headers: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expose_headers: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<K8sDuration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Mirror {
    pub destination: ResourceRef,

    pub percentage: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeaderManipulation {
    #[serde(default, skip_serializing_if = "labels::Map::is_empty")]
    pub append_request_headers: labels::Map,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_request_headers: Vec<String>,

    #[serde(default, skip_serializing_if = "labels::Map::is_empty")]
    pub append_response_headers: labels::Map,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_response_headers: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutlierDetection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consecutive_errors: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<K8sDuration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_ejection_time: Option<K8sDuration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ejection_percent: Option<u32>,
}

/// Errors are cleared and recomputed on every sync cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPolicyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Problems with the policy itself, independent of any service or mesh.
    #[serde(default)]
    pub validation_errors: Vec<String>,

    #[serde(default)]
    pub conflict_errors: Vec<ConflictError>,

    #[serde(default)]
    pub translator_errors: Vec<TranslatorError>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConflictError {
    pub error_message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranslatorError {
    pub translator_id: String,
    pub error_message: String,
}

/// A copy of a `TrafficPolicy`'s spec, recorded on a `MeshService` once the
/// policy has been accepted for that service.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedTrafficPolicy {
    #[serde(rename = "ref")]
    pub ref_: ResourceRef,

    pub traffic_policy_spec: TrafficPolicySpec,
}

// === impl TrafficPolicySpec ===

impl TrafficPolicySpec {
    /// Returns true if the policy sets anything carried by an HTTP route.
    /// Selectors, matchers and outlier detection alone do not.
    pub fn configures_routes(&self) -> bool {
        self.traffic_shift.is_some()
            || self.fault_injection.is_some()
            || self.request_timeout.is_some()
            || self.retries.is_some()
            || self.cors_policy.is_some()
            || self.mirror.is_some()
            || self.header_manipulation.is_some()
    }
}

// === impl HttpMethod ===

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Connect => "CONNECT",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl ConflictError ===

impl ConflictError {
    pub fn new(error_message: impl ToString) -> Self {
        Self {
            error_message: error_message.to_string(),
        }
    }
}

// === impl TranslatorError ===

impl TranslatorError {
    pub fn new(translator_id: impl ToString, error_message: impl ToString) -> Self {
        Self {
            translator_id: translator_id.to_string(),
            error_message: error_message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    #[test]
    fn deserializes_policy_spec() {
        let spec: TrafficPolicySpec = serde_json::from_value(serde_json::json!({
            "destinationSelector": {
                "serviceRefs": [{ "name": "reviews", "namespace": "bookinfo" }]
            },
            "httpRequestMatchers": [{
                "path": { "prefix": "/api" },
                "headers": [{ "name": "x-canary", "value": "true" }],
                "method": "GET"
            }],
            "trafficShift": {
                "destinations": [{
                    "destination": { "name": "reviews", "cluster": "remote" },
                    "weight": 100,
                    "subset": { "version": "v2" }
                }]
            },
            "retries": { "attempts": 5, "perTryTimeout": "2s" }
        }))
        .unwrap();

        assert_eq!(
            spec.destination_selector,
            Some(ServiceSelector::ServiceRefs(vec![ResourceRef::new(
                "bookinfo", "reviews"
            )]))
        );
        assert_eq!(
            spec.http_request_matchers,
            vec![HttpMatcher {
                path: Some(StringMatch::Prefix("/api".to_string())),
                headers: vec![HeaderMatcher {
                    name: "x-canary".to_string(),
                    value: "true".to_string(),
                    ..Default::default()
                }],
                query_parameters: vec![],
                method: Some(HttpMethod::Get),
            }]
        );
        assert_eq!(
            spec.traffic_shift.unwrap().destinations,
            vec![WeightedDestination {
                destination: ResourceRef {
                    name: "reviews".to_string(),
                    namespace: None,
                    cluster: Some("remote".to_string()),
                },
                weight: 100,
                subset: Some(btreemap! { "version".to_string() => "v2".to_string() }),
                port: None,
            }]
        );
        assert_eq!(
            spec.retries,
            Some(RetryPolicy {
                attempts: 5,
                per_try_timeout: Some("2s".parse().unwrap()),
            })
        );
    }

    #[test]
    fn outlier_detection_alone_configures_no_routes() {
        let outlier = TrafficPolicySpec {
            http_request_matchers: vec![HttpMatcher {
                path: Some(StringMatch::Prefix("/".to_string())),
                ..Default::default()
            }],
            outlier_detection: Some(OutlierDetection {
                consecutive_errors: Some(5),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(!outlier.configures_routes());

        let retries = TrafficPolicySpec {
            retries: Some(RetryPolicy {
                attempts: 3,
                per_try_timeout: None,
            }),
            ..Default::default()
        };
        assert!(retries.configures_routes());
    }
}

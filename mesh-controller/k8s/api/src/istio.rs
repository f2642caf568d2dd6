//! The subset of Istio's `networking.istio.io/v1alpha3` schema written by the
//! translator. Maps are ordered so that serialized objects are byte-stable.

pub mod destination_rule;
pub mod virtual_service;

pub use self::{
    destination_rule::{
        ClientTlsSettings, DestinationRule, DestinationRuleSpec, OutlierDetection, Subset,
        TlsMode, TrafficPolicy,
    },
    virtual_service::{
        CorsPolicy, Delay, Destination, FaultAbort, HeaderOperations, Headers, HttpFaultInjection,
        HttpMatchRequest, HttpRetry, HttpRoute, HttpRouteDestination, PortSelector,
        VirtualService, VirtualServiceSpec,
    },
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum StringMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Percent {
    pub value: f64,
}

pub mod traffic_policy;

pub use self::traffic_policy::{
    Abort, ConflictError, CorsPolicy, FaultInjection, HeaderManipulation, HeaderMatcher,
    HttpMatcher, HttpMethod, Mirror, MultiDestination, OutlierDetection, QueryParameterMatcher,
    RetryPolicy, ServiceMatcher, ServiceSelector, StringMatch, TrafficPolicy, TrafficPolicySpec,
    TrafficPolicyStatus, TranslatorError, ValidatedTrafficPolicy, WeightedDestination,
    WorkloadSelector,
};

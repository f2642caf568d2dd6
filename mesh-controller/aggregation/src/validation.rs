//! Mesh-agnostic checks applied to every policy before it is considered for
//! any service.

use anyhow::{anyhow, bail, ensure, Result};
use meshhub_controller_k8s_api::{
    networking::{
        FaultInjection, HeaderManipulation, HttpMatcher, Mirror, MultiDestination, RetryPolicy,
        StringMatch, TrafficPolicySpec,
    },
    K8sDuration,
};
use std::collections::BTreeSet;

/// Returns a description of every problem with `spec`. An empty list means
/// the policy may be collected.
pub fn validate(spec: &TrafficPolicySpec) -> Vec<String> {
    let mut errors = Vec::new();
    let mut check = |res: Result<()>| {
        if let Err(error) = res {
            errors.push(error.to_string());
        }
    };

    for matcher in &spec.http_request_matchers {
        for res in http_matcher(matcher) {
            check(res);
        }
    }
    if let Some(shift) = &spec.traffic_shift {
        check(traffic_shift(shift));
    }
    if let Some(fault) = &spec.fault_injection {
        check(fault_injection(fault));
    }
    if let Some(retries) = &spec.retries {
        check(retry_policy(retries));
    }
    if let Some(mirror) = &spec.mirror {
        check(mirror_percentage(mirror));
    }
    if let Some(headers) = &spec.header_manipulation {
        for res in header_manipulation(headers) {
            check(res);
        }
    }
    if let Some(cors) = &spec.cors_policy {
        for origin in &cors.allow_origins {
            check(string_match("corsPolicy.allowOrigins", origin, false));
        }
        check(duration("corsPolicy.maxAge", cors.max_age));
    }
    check(duration("requestTimeout", spec.request_timeout));
    if let Some(od) = &spec.outlier_detection {
        check(duration("outlierDetection.interval", od.interval));
        check(duration(
            "outlierDetection.baseEjectionTime",
            od.base_ejection_time,
        ));
        if let Some(pct) = od.max_ejection_percent {
            check(percentage(
                "outlierDetection.maxEjectionPercent",
                f64::from(pct),
            ));
        }
    }

    errors
}

fn http_matcher(matcher: &HttpMatcher) -> Vec<Result<()>> {
    let mut results = Vec::new();
    if let Some(path) = &matcher.path {
        results.push(string_match("path", path, true));
    }
    let mut names = BTreeSet::new();
    for header in &matcher.headers {
        results.push(header_name(&header.name));
        // A route match holds a single condition per header.
        if !names.insert(header.name.to_ascii_lowercase()) {
            results.push(Err(anyhow!(
                "header {:?} is matched more than once",
                header.name
            )));
        }
        if header.regex {
            results.push(regex(&format!("header {}", header.name), &header.value));
        }
    }
    for param in &matcher.query_parameters {
        if param.name.is_empty() {
            results.push(Err(anyhow!("query parameter names must not be empty")));
        }
        if param.regex {
            results.push(regex(
                &format!("query parameter {}", param.name),
                &param.value,
            ));
        }
    }
    results
}

fn string_match(field: &str, m: &StringMatch, absolute: bool) -> Result<()> {
    match m {
        StringMatch::Exact(value) | StringMatch::Prefix(value)
            if absolute && !value.starts_with('/') =>
        {
            bail!("{field} must be absolute (begin with `/`); {value:?} is not an absolute path")
        }
        StringMatch::Exact(_) | StringMatch::Prefix(_) => Ok(()),
        StringMatch::Regex(value) => regex(field, value),
    }
}

fn regex(field: &str, value: &str) -> Result<()> {
    regex::Regex::new(value)
        .map(|_| ())
        .map_err(|error| anyhow!("{field} has an invalid regular expression {value:?}: {error}"))
}

fn header_name(name: &str) -> Result<()> {
    http::HeaderName::from_bytes(name.as_bytes())
        .map(|_| ())
        .map_err(|_| anyhow!("{name:?} is not a valid header name"))
}

fn traffic_shift(shift: &MultiDestination) -> Result<()> {
    ensure!(
        !shift.destinations.is_empty(),
        "trafficShift must declare at least one destination"
    );
    ensure!(
        shift.destinations.iter().any(|d| d.weight > 0),
        "trafficShift weights must not all be zero"
    );
    for dst in &shift.destinations {
        ensure!(
            !dst.destination.name.is_empty(),
            "trafficShift destinations must have a name"
        );
        if let Some(port) = dst.port {
            ensure!(
                (1..=65535).contains(&port),
                "trafficShift destination {} has an invalid port {port}",
                dst.destination
            );
        }
    }
    Ok(())
}

fn fault_injection(fault: &FaultInjection) -> Result<()> {
    percentage("faultInjection.percentage", fault.percentage)?;
    if let Some(abort) = &fault.abort {
        ensure!(
            (100..=599).contains(&abort.http_status),
            "faultInjection.abort.httpStatus {} is not a valid HTTP status code",
            abort.http_status
        );
    }
    duration("faultInjection.fixedDelay", fault.fixed_delay)?;
    duration("faultInjection.exponentialDelay", fault.exponential_delay)
}

fn retry_policy(retries: &RetryPolicy) -> Result<()> {
    ensure!(
        retries.attempts >= 0,
        "retries.attempts must not be negative; got {}",
        retries.attempts
    );
    duration("retries.perTryTimeout", retries.per_try_timeout)
}

fn mirror_percentage(mirror: &Mirror) -> Result<()> {
    percentage("mirror.percentage", mirror.percentage)
}

fn header_manipulation(headers: &HeaderManipulation) -> Vec<Result<()>> {
    headers
        .append_request_headers
        .keys()
        .chain(&headers.remove_request_headers)
        .chain(headers.append_response_headers.keys())
        .chain(&headers.remove_response_headers)
        .map(|name| header_name(name))
        .collect()
}

fn percentage(field: &str, value: f64) -> Result<()> {
    ensure!(
        (0.0..=100.0).contains(&value),
        "{field} must be between 0 and 100; got {value}"
    );
    Ok(())
}

fn duration(field: &str, value: Option<K8sDuration>) -> Result<()> {
    if let Some(d) = value {
        ensure!(!d.is_negative(), "{field} must not be negative; got {d}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use meshhub_controller_k8s_api::{
        networking::{Abort, HeaderMatcher, QueryParameterMatcher, WeightedDestination},
        ResourceRef,
    };
    use rstest::rstest;

    #[test]
    fn empty_policy_is_valid() {
        assert!(validate(&TrafficPolicySpec::default()).is_empty());
    }

    #[rstest]
    #[case(StringMatch::Exact("/a".to_string()), true)]
    #[case(StringMatch::Prefix("/".to_string()), true)]
    #[case(StringMatch::Exact("a".to_string()), false)]
    #[case(StringMatch::Prefix("api".to_string()), false)]
    #[case(StringMatch::Regex("^/v[0-9]+/.*".to_string()), true)]
    #[case(StringMatch::Regex("(".to_string()), false)]
    fn path_matchers(#[case] path: StringMatch, #[case] valid: bool) {
        let spec = TrafficPolicySpec {
            http_request_matchers: vec![HttpMatcher {
                path: Some(path),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(validate(&spec).is_empty(), valid);
    }

    #[test]
    fn header_and_query_matchers() {
        let spec = TrafficPolicySpec {
            http_request_matchers: vec![HttpMatcher {
                headers: vec![
                    HeaderMatcher {
                        name: "bad header".to_string(),
                        value: "x".to_string(),
                        ..Default::default()
                    },
                    HeaderMatcher {
                        name: "x-user".to_string(),
                        value: "[".to_string(),
                        regex: true,
                        ..Default::default()
                    },
                ],
                query_parameters: vec![QueryParameterMatcher {
                    name: "q".to_string(),
                    value: "*".to_string(),
                    regex: true,
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(validate(&spec).len(), 3);
    }

    #[test]
    fn header_matched_twice() {
        let header = |name: &str, value: &str, invert_match: bool| HeaderMatcher {
            name: name.to_string(),
            value: value.to_string(),
            invert_match,
            ..Default::default()
        };
        let spec = |headers| TrafficPolicySpec {
            http_request_matchers: vec![HttpMatcher {
                headers,
                ..Default::default()
            }],
            ..Default::default()
        };

        assert_eq!(
            validate(&spec(vec![
                header("x-user", "a", false),
                header("X-User", "b", true),
            ])),
            vec![r#"header "X-User" is matched more than once"#.to_string()]
        );
        assert!(validate(&spec(vec![
            header("x-user", "a", false),
            header("x-tenant", "b", false),
        ]))
        .is_empty());
    }

    #[rstest]
    #[case(-1.0, false)]
    #[case(0.0, true)]
    #[case(50.5, true)]
    #[case(100.0, true)]
    #[case(100.1, false)]
    fn fault_percentages(#[case] percentage: f64, #[case] valid: bool) {
        let spec = TrafficPolicySpec {
            fault_injection: Some(FaultInjection {
                abort: Some(Abort { http_status: 503 }),
                percentage,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(validate(&spec).is_empty(), valid);
    }

    #[test]
    fn abort_status_must_be_http() {
        let spec = TrafficPolicySpec {
            fault_injection: Some(FaultInjection {
                abort: Some(Abort { http_status: 42 }),
                percentage: 10.0,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(validate(&spec).len(), 1);
    }

    #[test]
    fn retries_and_durations() {
        let spec = TrafficPolicySpec {
            retries: Some(RetryPolicy {
                attempts: -1,
                per_try_timeout: None,
            }),
            request_timeout: Some("-1s".parse().unwrap()),
            ..Default::default()
        };
        assert_eq!(validate(&spec).len(), 2);
    }

    #[test]
    fn traffic_shift_requires_weighted_destinations() {
        let spec = TrafficPolicySpec {
            traffic_shift: Some(MultiDestination {
                destinations: vec![],
            }),
            ..Default::default()
        };
        assert_eq!(validate(&spec).len(), 1);

        let spec = TrafficPolicySpec {
            traffic_shift: Some(MultiDestination {
                destinations: vec![WeightedDestination {
                    destination: ResourceRef::new("ns", "reviews"),
                    weight: 0,
                    ..Default::default()
                }],
            }),
            ..Default::default()
        };
        assert_eq!(validate(&spec).len(), 1);

        let spec = TrafficPolicySpec {
            traffic_shift: Some(MultiDestination {
                destinations: vec![WeightedDestination {
                    destination: ResourceRef::new("ns", "reviews"),
                    weight: 100,
                    subset: Some(btreemap! { "version".to_string() => "v2".to_string() }),
                    port: Some(9080),
                }],
            }),
            ..Default::default()
        };
        assert!(validate(&spec).is_empty());
    }

    #[test]
    fn header_manipulation_names() {
        let spec = TrafficPolicySpec {
            header_manipulation: Some(HeaderManipulation {
                append_request_headers: btreemap! { "x-ok".to_string() => "1".to_string() },
                remove_response_headers: vec!["not ok".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(validate(&spec).len(), 1);
    }
}

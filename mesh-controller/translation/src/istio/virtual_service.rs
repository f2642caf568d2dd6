use super::{metadata, policy_namespace, saturating_i32, specificity, subset_name, TRANSLATOR_ID};
use meshhub_controller_core::{
    ClusterResourceId, PolicyTranslationError, ResourceId, TranslationInput,
};
use meshhub_controller_k8s_api::{
    istio::{
        self, CorsPolicy, Delay, Destination, FaultAbort, HeaderOperations, Headers,
        HttpFaultInjection, HttpMatchRequest, HttpRetry, HttpRoute, HttpRouteDestination, Percent,
        PortSelector, VirtualService, VirtualServiceSpec,
    },
    labels,
    networking::{
        FaultInjection, HeaderManipulation, HttpMatcher, Mirror, MultiDestination, StringMatch,
        WorkloadSelector,
    },
    ResourceRef, TrafficPolicySpec, ValidatedTrafficPolicy,
};
use std::collections::BTreeMap;

/// Translation state for one policy applied to one service.
struct PolicyTranslator<'i, 'a> {
    input: &'i TranslationInput<'a>,
    policy_ns: &'a str,
    errors: Vec<String>,
}

pub(super) fn build(
    input: &TranslationInput<'_>,
) -> (Option<VirtualService>, Vec<PolicyTranslationError>) {
    let mut routes = Vec::new();
    let mut errors = Vec::new();

    for vtp in input.policies {
        match translate_policy(input, vtp) {
            Ok(policy_routes) => routes.extend(policy_routes),
            Err(policy_errors) => {
                let id = ResourceId::from_ref(&vtp.ref_, input.service.kube_namespace());
                tracing::debug!(
                    policy = %id,
                    service = %input.service.kube_name(),
                    errors = ?policy_errors,
                    "Policy failed to translate"
                );
                errors.extend(
                    policy_errors
                        .into_iter()
                        .map(|msg| PolicyTranslationError::new(id.clone(), TRANSLATOR_ID, msg)),
                );
            }
        }
    }

    // A virtual service without routes is rejected by Istio.
    if routes.is_empty() {
        return (None, errors);
    }
    specificity::sort(&mut routes);

    let vs = VirtualService {
        metadata: metadata(input.service),
        spec: VirtualServiceSpec {
            hosts: vec![input.service.kube_name().to_string()],
            http: routes,
        },
    };
    (Some(vs), errors)
}

/// Compiles a single policy into routes, or every reason it cannot be.
///
/// A policy that only configures the destination rule contributes no
/// routes, so it can never shadow another policy's route.
fn translate_policy(
    input: &TranslationInput<'_>,
    vtp: &ValidatedTrafficPolicy,
) -> Result<Vec<HttpRoute>, Vec<String>> {
    if !vtp.traffic_policy_spec.configures_routes() {
        return Ok(vec![]);
    }

    let mut translator = PolicyTranslator {
        input,
        policy_ns: policy_namespace(vtp, input.service),
        errors: Vec::new(),
    };

    let TrafficPolicySpec {
        source_selector,
        destination_selector: _,
        http_request_matchers,
        traffic_shift,
        fault_injection,
        request_timeout,
        retries,
        cors_policy,
        mirror,
        header_manipulation,
        // Applied by the destination rule.
        outlier_detection: _,
    } = &vtp.traffic_policy_spec;

    let route = translator.route_destinations(traffic_shift.as_ref());
    let fault = fault_injection
        .as_ref()
        .and_then(|f| translator.fault_injection(f));
    let (mirror, mirror_percentage) = match mirror {
        Some(m) => match translator.mirror(m) {
            Some((dst, pct)) => (Some(dst), Some(pct)),
            None => (None, None),
        },
        None => (None, None),
    };

    if !translator.errors.is_empty() {
        return Err(translator.errors);
    }

    let template = HttpRoute {
        match_: vec![],
        route,
        timeout: request_timeout.map(|d| d.to_proto_json()),
        retries: retries.as_ref().map(|r| HttpRetry {
            attempts: r.attempts,
            per_try_timeout: r.per_try_timeout.map(|d| d.to_proto_json()),
        }),
        fault,
        mirror,
        mirror_percentage,
        cors_policy: cors_policy.as_ref().map(|cors| CorsPolicy {
            allow_origins: cors.allow_origins.iter().map(string_match).collect(),
            allow_methods: cors.allow_methods.clone(),
            allow_headers: cors.allow_headers.clone(),
            expose_headers: cors.expose_headers.clone(),
            max_age: cors.max_age.map(|d| d.to_proto_json()),
            allow_credentials: cors.allow_credentials,
        }),
        headers: header_manipulation.as_ref().and_then(headers),
    };

    Ok(flatten(source_selector.as_ref(), http_request_matchers)
        .into_iter()
        .map(|match_| HttpRoute {
            match_,
            ..template.clone()
        })
        .collect())
}

/// Produces the match list of each route compiled from a policy.
///
/// Istio ORs the match requests of a route but ANDs the conditions within
/// one request, so each combination of source and request matcher gets its
/// own route.
fn flatten(
    source: Option<&WorkloadSelector>,
    matchers: &[HttpMatcher],
) -> Vec<Vec<HttpMatchRequest>> {
    let sources = source_matchers(source);
    if matchers.is_empty() {
        return vec![sources];
    }

    let requests = matchers.iter().map(request_matcher);
    if sources.is_empty() {
        return requests.map(|m| vec![m]).collect();
    }
    requests
        .flat_map(|request| {
            sources.iter().map(move |src| {
                vec![HttpMatchRequest {
                    source_labels: src.source_labels.clone(),
                    source_namespace: src.source_namespace.clone(),
                    ..request.clone()
                }]
            })
        })
        .collect()
}

fn source_matchers(source: Option<&WorkloadSelector>) -> Vec<HttpMatchRequest> {
    let Some(WorkloadSelector { labels, namespaces }) = source else {
        return vec![];
    };
    let source_labels = labels.clone().unwrap_or_default();

    if namespaces.is_empty() {
        if source_labels.is_empty() {
            return vec![];
        }
        return vec![HttpMatchRequest {
            source_labels,
            ..Default::default()
        }];
    }
    namespaces
        .iter()
        .map(|ns| HttpMatchRequest {
            source_labels: source_labels.clone(),
            source_namespace: Some(ns.clone()),
            ..Default::default()
        })
        .collect()
}

fn request_matcher(matcher: &HttpMatcher) -> HttpMatchRequest {
    let mut headers = BTreeMap::new();
    let mut without_headers = BTreeMap::new();
    for h in &matcher.headers {
        let value = value_match(&h.value, h.regex);
        if h.invert_match {
            without_headers.insert(h.name.clone(), value);
        } else {
            headers.insert(h.name.clone(), value);
        }
    }

    HttpMatchRequest {
        uri: matcher.path.as_ref().map(string_match),
        method: matcher
            .method
            .map(|m| istio::StringMatch::Exact(m.as_str().to_string())),
        headers,
        without_headers,
        query_params: matcher
            .query_parameters
            .iter()
            .map(|q| (q.name.clone(), value_match(&q.value, q.regex)))
            .collect(),
        ..Default::default()
    }
}

fn value_match(value: &str, regex: bool) -> istio::StringMatch {
    if regex {
        istio::StringMatch::Regex(value.to_string())
    } else {
        istio::StringMatch::Exact(value.to_string())
    }
}

fn string_match(m: &StringMatch) -> istio::StringMatch {
    match m {
        StringMatch::Exact(v) => istio::StringMatch::Exact(v.clone()),
        StringMatch::Prefix(v) => istio::StringMatch::Prefix(v.clone()),
        StringMatch::Regex(v) => istio::StringMatch::Regex(v.clone()),
    }
}

fn headers(hm: &HeaderManipulation) -> Option<Headers> {
    let ops = |add: &labels::Map, remove: &Vec<String>| {
        if add.is_empty() && remove.is_empty() {
            return None;
        }
        Some(HeaderOperations {
            add: add.clone(),
            remove: remove.clone(),
        })
    };

    let request = ops(&hm.append_request_headers, &hm.remove_request_headers);
    let response = ops(&hm.append_response_headers, &hm.remove_response_headers);
    if request.is_none() && response.is_none() {
        return None;
    }
    Some(Headers { request, response })
}

// === impl PolicyTranslator ===

impl PolicyTranslator<'_, '_> {
    fn route_destinations(
        &mut self,
        shift: Option<&MultiDestination>,
    ) -> Vec<HttpRouteDestination> {
        let Some(shift) = shift else {
            return self.default_destination().into_iter().collect();
        };

        shift
            .destinations
            .iter()
            .filter_map(|wd| {
                let destination =
                    self.destination(&wd.destination, wd.subset.as_ref(), wd.port)?;
                Some(HttpRouteDestination {
                    destination,
                    weight: Some(saturating_i32(wd.weight)),
                })
            })
            .collect()
    }

    /// Routes to the service itself, which must be unambiguous.
    fn default_destination(&mut self) -> Option<HttpRouteDestination> {
        let service = self.input.service;
        match service.spec.kube_service.ports.as_slice() {
            [port] => Some(HttpRouteDestination {
                destination: Destination {
                    host: service.kube_name().to_string(),
                    subset: None,
                    port: Some(PortSelector { number: port.port }),
                },
                weight: None,
            }),
            ports => {
                self.errors.push(format!(
                    "service {} exposes {} ports; a default route requires exactly one",
                    ClusterResourceId::of_service(service),
                    ports.len()
                ));
                None
            }
        }
    }

    fn fault_injection(&mut self, fault: &FaultInjection) -> Option<HttpFaultInjection> {
        let percentage = Some(Percent {
            value: fault.percentage,
        });
        match (&fault.abort, fault.fixed_delay, fault.exponential_delay) {
            (Some(abort), None, None) => Some(HttpFaultInjection {
                abort: Some(FaultAbort {
                    http_status: abort.http_status,
                    percentage,
                }),
                delay: None,
            }),
            (None, Some(fixed), None) => Some(HttpFaultInjection {
                delay: Some(Delay {
                    fixed_delay: Some(fixed.to_proto_json()),
                    exponential_delay: None,
                    percentage,
                }),
                abort: None,
            }),
            (None, None, Some(exponential)) => Some(HttpFaultInjection {
                delay: Some(Delay {
                    fixed_delay: None,
                    exponential_delay: Some(exponential.to_proto_json()),
                    percentage,
                }),
                abort: None,
            }),
            _ => {
                self.errors.push(
                    "faultInjection must set exactly one of abort, fixedDelay, exponentialDelay"
                        .to_string(),
                );
                None
            }
        }
    }

    fn mirror(&mut self, mirror: &Mirror) -> Option<(Destination, Percent)> {
        let destination = self.destination(&mirror.destination, None, mirror.port)?;
        Some((
            destination,
            Percent {
                value: mirror.percentage,
            },
        ))
    }

    /// Resolves a destination reference to an Istio destination.
    ///
    /// Local services are addressed by their short name; services on other
    /// clusters by their multicluster DNS name. Subsets cannot be used across
    /// clusters.
    fn destination(
        &mut self,
        reference: &ResourceRef,
        subset: Option<&labels::Map>,
        port: Option<u32>,
    ) -> Option<Destination> {
        let source = self.input.service;
        let id = ClusterResourceId::from_ref(reference, self.policy_ns, source.cluster_name());
        let Some(target) = self
            .input
            .all_services
            .iter()
            .find(|s| ClusterResourceId::of_service(s) == id)
        else {
            self.errors.push(format!("destination {id} not found"));
            return None;
        };

        let subset = subset.filter(|s| !s.is_empty());
        let host = if target.cluster_name() == source.cluster_name() {
            target.kube_name().to_string()
        } else {
            if subset.is_some() {
                self.errors.push(format!(
                    "destination {id} is on a remote cluster; subsets are cluster-local"
                ));
                return None;
            }
            match target
                .spec
                .federation
                .as_ref()
                .and_then(|f| f.multicluster_dns_name.clone())
            {
                Some(dns_name) => dns_name,
                None => {
                    self.errors.push(format!(
                        "destination {id} is on a remote cluster but has no multicluster DNS name"
                    ));
                    return None;
                }
            }
        };

        Some(Destination {
            host,
            subset: subset.map(subset_name),
            port: port.map(|number| PortSelector { number }),
        })
    }
}

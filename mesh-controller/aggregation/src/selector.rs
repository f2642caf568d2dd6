use meshhub_controller_k8s_api::{
    labels,
    networking::{ServiceMatcher, ServiceSelector},
    MeshService, ResourceExt, TrafficPolicy,
};

/// Returns true if `policy`'s destination selector resolves to `service`.
pub fn selects(policy: &TrafficPolicy, service: &MeshService) -> bool {
    let policy_ns = policy.namespace().unwrap_or_default();
    match &policy.spec.destination_selector {
        None => true,
        Some(ServiceSelector::Matcher(matcher)) => matches_service(matcher, service),
        Some(ServiceSelector::ServiceRefs(refs)) => refs.iter().any(|r| {
            r.name == service.kube_name()
                && r.namespace_or(&policy_ns) == service.kube_namespace()
                && r.cluster.as_deref().map_or(true, |c| c == service.cluster_name())
        }),
    }
}

fn matches_service(matcher: &ServiceMatcher, service: &MeshService) -> bool {
    let ServiceMatcher {
        labels: selector,
        namespaces,
        clusters,
    } = matcher;

    labels::matches_opt(selector.as_ref(), service.spec.kube_service.labels.as_ref())
        && (namespaces.is_empty() || namespaces.iter().any(|ns| ns == service.kube_namespace()))
        && (clusters.is_empty() || clusters.iter().any(|c| c == service.cluster_name()))
}

use super::{metadata, policy_namespace, saturating_i32, subset_name};
use meshhub_controller_core::{ClusterResourceId, TranslationInput};
use meshhub_controller_k8s_api::{
    istio::{
        ClientTlsSettings, DestinationRule, DestinationRuleSpec, OutlierDetection, Subset,
        TlsMode, TrafficPolicy,
    },
    labels,
    networking::OutlierDetection as PolicyOutlierDetection,
};
use std::collections::BTreeMap;

pub(super) fn build(input: &TranslationInput<'_>) -> DestinationRule {
    let outlier_detection = input
        .policies
        .iter()
        .find_map(|vtp| vtp.traffic_policy_spec.outlier_detection.as_ref())
        .map(outlier_detection);

    DestinationRule {
        metadata: metadata(input.service),
        spec: DestinationRuleSpec {
            host: input.service.kube_name().to_string(),
            traffic_policy: Some(TrafficPolicy {
                tls: Some(ClientTlsSettings {
                    mode: TlsMode::IstioMutual,
                }),
                outlier_detection,
            }),
            subsets: subsets(input)
                .into_iter()
                .map(|(name, labels)| Subset { name, labels })
                .collect(),
        },
    }
}

/// Collects the subsets of this service that any service's traffic shift
/// routes to, keyed by subset name.
fn subsets(input: &TranslationInput<'_>) -> BTreeMap<String, labels::Map> {
    let target = ClusterResourceId::of_service(input.service);

    let mut subsets = BTreeMap::new();
    for source in input.all_services {
        for vtp in source.validated_traffic_policies() {
            let Some(shift) = &vtp.traffic_policy_spec.traffic_shift else {
                continue;
            };
            let ns = policy_namespace(vtp, source);
            for dst in &shift.destinations {
                let Some(selector) = dst.subset.as_ref().filter(|s| !s.is_empty()) else {
                    continue;
                };
                // Subsets are cluster-local; remote references are rejected
                // during translation of the referencing service.
                if source.cluster_name() != target.cluster {
                    continue;
                }
                let id = ClusterResourceId::from_ref(&dst.destination, ns, source.cluster_name());
                if id == target {
                    subsets.insert(subset_name(selector), selector.clone());
                }
            }
        }
    }
    subsets
}

fn outlier_detection(od: &PolicyOutlierDetection) -> OutlierDetection {
    OutlierDetection {
        consecutive_errors: od.consecutive_errors.map(saturating_i32),
        interval: od.interval.map(|d| d.to_proto_json()),
        base_ejection_time: od.base_ejection_time.map(|d| d.to_proto_json()),
        max_ejection_percent: od.max_ejection_percent.map(saturating_i32),
    }
}

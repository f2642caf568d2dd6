use crate::{AggregationProcessor, ProcessError};
use maplit::btreemap;
use meshhub_controller_core::{
    MeshFamily, PolicyTranslationError, Registry, ResourceId, Snapshot, TranslationInput,
    TranslationValidator,
};
use meshhub_controller_k8s_api::{
    discovery::{KubeService, KubeServicePort, MeshSpec, MeshServiceSpec},
    networking::{
        ConflictError, HttpMatcher, OutlierDetection, ServiceMatcher, ServiceSelector,
        StringMatch,
    },
    Mesh, MeshService, MeshType, ObjectMeta, ResourceExt, ResourceRef, TrafficPolicy,
    TrafficPolicySpec, ValidatedTrafficPolicy,
};
use pretty_assertions::assert_eq;
use std::{collections::BTreeSet, sync::Arc};

pub(crate) const MESH_NS: &str = "meshhub-system";

/// Rejects policies with differing outlier detection and fails to translate
/// policies named in `failing`.
#[derive(Clone, Debug, Default)]
pub(crate) struct FakeValidator {
    failing: BTreeSet<String>,
}

impl FakeValidator {
    pub(crate) fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }
}

impl TranslationValidator for FakeValidator {
    fn translator_id(&self) -> &'static str {
        "fake"
    }

    fn find_conflict(
        &self,
        accepted: &ValidatedTrafficPolicy,
        candidate: &ValidatedTrafficPolicy,
    ) -> Option<ConflictError> {
        match (
            &accepted.traffic_policy_spec.outlier_detection,
            &candidate.traffic_policy_spec.outlier_detection,
        ) {
            (Some(a), Some(c)) if a != c => Some(ConflictError::new(format!(
                "conflicts with {}: outlierDetection differs",
                accepted.ref_
            ))),
            _ => None,
        }
    }

    fn translation_errors(&self, input: &TranslationInput<'_>) -> Vec<PolicyTranslationError> {
        input
            .policies
            .iter()
            .filter(|vtp| self.failing.contains(&vtp.ref_.name))
            .map(|vtp| {
                let id = ResourceId::from_ref(&vtp.ref_, "");
                let msg = format!("cannot translate {id}");
                PolicyTranslationError::new(id, self.translator_id(), msg)
            })
            .collect()
    }
}

pub(crate) fn mk_service(name: &str, ns: &str, cluster: &str, ports: &[u32]) -> MeshService {
    MeshService {
        metadata: ObjectMeta {
            namespace: Some(MESH_NS.to_string()),
            name: Some(format!("{name}-{ns}-{cluster}")),
            ..Default::default()
        },
        spec: MeshServiceSpec {
            kube_service: KubeService {
                ref_: ResourceRef::new(ns, name).on_cluster(cluster),
                ports: ports
                    .iter()
                    .map(|&port| KubeServicePort {
                        port,
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            },
            mesh: ResourceRef::new(MESH_NS, "istio"),
            federation: None,
        },
        status: None,
    }
}

pub(crate) fn mk_mesh(name: &str, mesh_type: MeshType, cluster: &str) -> Mesh {
    Mesh {
        metadata: ObjectMeta {
            namespace: Some(MESH_NS.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: MeshSpec {
            cluster: ResourceRef::new(MESH_NS, cluster),
            mesh_type,
            installation: None,
        },
    }
}

pub(crate) fn mk_policy(ns: &str, name: &str, spec: TrafficPolicySpec) -> TrafficPolicy {
    let mut policy = TrafficPolicy::new(name, spec);
    policy.metadata.namespace = Some(ns.to_string());
    policy
}

fn created_at(mut policy: TrafficPolicy, ts: &str) -> TrafficPolicy {
    policy.metadata.creation_timestamp =
        Some(serde_json::from_value(serde_json::json!(ts)).expect("timestamp must parse"));
    policy
}

fn outlier(consecutive_errors: u32) -> TrafficPolicySpec {
    TrafficPolicySpec {
        outlier_detection: Some(OutlierDetection {
            consecutive_errors: Some(consecutive_errors),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn registry(validator: FakeValidator) -> Registry {
    Registry::default().with_validator(MeshFamily::Istio, Arc::new(validator))
}

fn names(policies: &[ValidatedTrafficPolicy]) -> Vec<&str> {
    policies.iter().map(|vtp| vtp.ref_.name.as_str()).collect()
}

fn find<'a>(policies: &'a [TrafficPolicy], name: &str) -> &'a TrafficPolicy {
    policies
        .iter()
        .find(|p| p.name_any() == name)
        .expect("policy must be present")
}

#[test]
fn older_policy_wins_conflict() {
    let snapshot = Snapshot::new(
        [mk_service("svc", "ns", "c1", &[8000])],
        [mk_mesh("istio", MeshType::Istio1_6, "c1")],
    );
    let processor = AggregationProcessor::new(&snapshot, registry(FakeValidator::default()));

    // Alphabetical order would favor the newer policy.
    let policies = vec![
        created_at(mk_policy("ns", "a-newer", outlier(7)), "2024-02-01T00:00:00Z"),
        created_at(mk_policy("ns", "z-older", outlier(5)), "2024-01-01T00:00:00Z"),
    ];
    let output = processor.process(&policies).expect("process must succeed");

    assert_eq!(output.mesh_services.len(), 1);
    assert_eq!(
        names(output.mesh_services[0].validated_traffic_policies()),
        vec!["z-older"]
    );

    let newer = find(&output.traffic_policies, "a-newer");
    assert_eq!(
        newer.status.as_ref().unwrap().conflict_errors,
        vec![ConflictError::new(
            "conflicts with ns/z-older: outlierDetection differs"
        )]
    );
    let older = find(&output.traffic_policies, "z-older");
    assert!(older.status.as_ref().unwrap().conflict_errors.is_empty());
}

#[test]
fn second_cycle_changes_nothing() {
    let meshes = [mk_mesh("istio", MeshType::Istio1_6, "c1")];
    let policies = vec![
        mk_policy("ns", "p1", outlier(5)),
        mk_policy("ns", "p2", outlier(7)),
        mk_policy("ns", "p3", TrafficPolicySpec::default()),
    ];

    let snapshot = Snapshot::new([mk_service("svc", "ns", "c1", &[8000])], meshes.clone());
    let first = AggregationProcessor::new(&snapshot, registry(FakeValidator::default()))
        .process(&policies)
        .expect("process must succeed");
    assert_eq!(first.mesh_services.len(), 1);
    assert_eq!(first.traffic_policies.len(), 3);

    let snapshot = Snapshot::new(first.services.clone(), meshes);
    let second = AggregationProcessor::new(&snapshot, registry(FakeValidator::default()))
        .process(&first.traffic_policies)
        .expect("process must succeed");
    assert!(second.mesh_services.is_empty());
    assert!(second.traffic_policies.is_empty());
    assert_eq!(second.services, first.services);
}

#[test]
fn dangling_mesh_aborts_cycle() {
    let snapshot = Snapshot::new([mk_service("svc", "ns", "c1", &[8000])], []);
    let processor = AggregationProcessor::new(&snapshot, registry(FakeValidator::default()));
    let error = processor
        .process(&[mk_policy("ns", "p", TrafficPolicySpec::default())])
        .expect_err("process must fail");
    assert!(
        matches!(error, ProcessError::DanglingMesh { ref mesh, .. } if mesh.name == "istio"),
        "{error}"
    );
}

#[test]
fn unsupported_mesh_skips_service() {
    let snapshot = Snapshot::new(
        [mk_service("svc", "ns", "c1", &[8000])],
        [mk_mesh("istio", MeshType::Linkerd, "c1")],
    );
    let processor = AggregationProcessor::new(&snapshot, registry(FakeValidator::default()));
    let output = processor
        .process(&[mk_policy("ns", "p", TrafficPolicySpec::default())])
        .expect("process must succeed");

    assert!(output.mesh_services.is_empty());
    assert!(output.services[0].status.is_none());
    // The policy still gets an initial status.
    assert_eq!(output.traffic_policies.len(), 1);
}

#[test]
fn invalid_policy_is_never_applied() {
    let snapshot = Snapshot::new(
        [mk_service("svc", "ns", "c1", &[8000])],
        [mk_mesh("istio", MeshType::Istio1_5, "c1")],
    );
    let processor = AggregationProcessor::new(&snapshot, registry(FakeValidator::default()));
    let invalid = mk_policy(
        "ns",
        "invalid",
        TrafficPolicySpec {
            http_request_matchers: vec![HttpMatcher {
                path: Some(StringMatch::Prefix("relative".to_string())),
                ..Default::default()
            }],
            ..Default::default()
        },
    );
    let output = processor
        .process(&[invalid, mk_policy("ns", "valid", TrafficPolicySpec::default())])
        .expect("process must succeed");

    assert_eq!(
        names(output.services[0].validated_traffic_policies()),
        vec!["valid"]
    );
    let invalid = find(&output.traffic_policies, "invalid");
    assert_eq!(invalid.status.as_ref().unwrap().validation_errors.len(), 1);
}

#[test]
fn errors_from_every_service_are_merged() {
    let snapshot = Snapshot::new(
        [
            mk_service("a", "ns", "c1", &[8000]),
            mk_service("b", "ns", "c1", &[8000]),
        ],
        [mk_mesh("istio", MeshType::Istio1_6, "c1")],
    );
    let processor = AggregationProcessor::new(
        &snapshot,
        registry(FakeValidator::default().failing("broken")),
    );

    let policies = vec![
        mk_policy("ns", "p1", outlier(5)),
        mk_policy(
            "ns",
            "p2",
            TrafficPolicySpec {
                destination_selector: Some(ServiceSelector::Matcher(ServiceMatcher {
                    namespaces: vec!["ns".to_string()],
                    ..Default::default()
                })),
                ..outlier(7)
            },
        ),
        mk_policy("ns", "broken", TrafficPolicySpec::default()),
    ];
    let output = processor.process(&policies).expect("process must succeed");

    // Each policy appears at most once.
    let changed = output
        .traffic_policies
        .iter()
        .map(|p| p.name_any())
        .collect::<Vec<_>>();
    assert_eq!(changed, vec!["broken", "p1", "p2"]);

    let p2 = find(&output.traffic_policies, "p2");
    assert_eq!(
        p2.status.as_ref().unwrap().conflict_errors,
        vec![ConflictError::new(
            "conflicts with ns/p1: outlierDetection differs"
        )],
        "identical conflicts from both services are deduplicated"
    );
    let broken = find(&output.traffic_policies, "broken");
    assert_eq!(broken.status.as_ref().unwrap().translator_errors.len(), 1);

    for svc in &output.services {
        assert_eq!(names(svc.validated_traffic_policies()), vec!["p1"]);
    }
}

#[test]
fn explicit_refs_select_single_service() {
    let snapshot = Snapshot::new(
        [
            mk_service("a", "ns", "c1", &[8000]),
            mk_service("b", "ns", "c1", &[8000]),
        ],
        [mk_mesh("istio", MeshType::Istio1_6, "c1")],
    );
    let processor = AggregationProcessor::new(&snapshot, registry(FakeValidator::default()));
    let policy = mk_policy(
        "ns",
        "only-b",
        TrafficPolicySpec {
            destination_selector: Some(ServiceSelector::ServiceRefs(vec![ResourceRef {
                name: "b".to_string(),
                namespace: None,
                cluster: None,
            }])),
            ..Default::default()
        },
    );
    let output = processor.process(&[policy]).expect("process must succeed");

    let by_name = output
        .services
        .iter()
        .map(|s| (s.kube_name().to_string(), names(s.validated_traffic_policies()).len()))
        .collect::<std::collections::BTreeMap<_, _>>();
    assert_eq!(
        by_name,
        btreemap! { "a".to_string() => 0, "b".to_string() => 1 }
    );
    assert_eq!(output.mesh_services.len(), 1);
}

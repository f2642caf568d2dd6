use crate::selector;
use meshhub_controller_core::{ResourceId, TranslationInput, TranslationValidator};
use meshhub_controller_k8s_api::{
    networking::{ConflictError, TranslatorError},
    Mesh, MeshService, ResourceRef, TrafficPolicy, ValidatedTrafficPolicy,
};
use std::collections::BTreeMap;

/// The outcome of collecting policies for a single service.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectedPolicies {
    /// Policies accepted for the service, in evaluation order.
    pub policies_to_record: Vec<ValidatedTrafficPolicy>,

    pub policy_to_conflict_errors: BTreeMap<ResourceId, Vec<ConflictError>>,

    pub policy_to_translator_errors: BTreeMap<ResourceId, Vec<TranslatorError>>,
}

/// Selects the policies in `candidates` that apply to `service` and
/// partitions them into accepted and rejected policies.
///
/// `candidates` must already be in evaluation order: earlier policies win
/// conflicts. Collection never fails; a rejected policy never affects the
/// policies accepted before or after it.
pub fn collect(
    service: &MeshService,
    all_services: &[MeshService],
    mesh: &Mesh,
    validator: &dyn TranslationValidator,
    candidates: &[TrafficPolicy],
) -> CollectedPolicies {
    let mut collected = CollectedPolicies::default();

    for policy in candidates.iter().filter(|p| selector::selects(p, service)) {
        let id = ResourceId::of(policy);
        let candidate = ValidatedTrafficPolicy {
            ref_: ResourceRef::from(&id),
            traffic_policy_spec: policy.spec.clone(),
        };

        let conflict = collected
            .policies_to_record
            .iter()
            .find_map(|accepted| validator.find_conflict(accepted, &candidate));
        if let Some(error) = conflict {
            tracing::debug!(policy = %id, service = %service.kube_name(), "Policy conflicts");
            collected
                .policy_to_conflict_errors
                .entry(id)
                .or_default()
                .push(error);
            continue;
        }

        let errors = validator.translation_errors(&TranslationInput {
            service,
            all_services,
            mesh,
            policies: std::slice::from_ref(&candidate),
        });
        if !errors.is_empty() {
            tracing::debug!(
                policy = %id,
                service = %service.kube_name(),
                "Policy fails translation"
            );
            collected
                .policy_to_translator_errors
                .entry(id)
                .or_default()
                .extend(errors.into_iter().map(|e| e.error));
            continue;
        }

        collected.policies_to_record.push(candidate);
    }

    collected
}

use meshhub_controller_k8s_api::{
    discovery::MeshServiceStatus,
    networking::{ConflictError, TrafficPolicyStatus, TranslatorError},
    MeshService, TrafficPolicy, ValidatedTrafficPolicy,
};

/// Applies newly computed statuses to in-memory objects, reporting whether
/// anything changed so that only changed objects are written back.
#[derive(Copy, Clone, Debug, Default)]
pub struct InMemoryStatusMutator(());

impl InMemoryStatusMutator {
    /// Records `policies` on `service`. Returns false if the service already
    /// held exactly these policies.
    pub fn mutate_service_policies(
        &self,
        service: &mut MeshService,
        policies: Vec<ValidatedTrafficPolicy>,
    ) -> bool {
        if service.validated_traffic_policies() == policies.as_slice() {
            return false;
        }
        service
            .status
            .get_or_insert_with(MeshServiceStatus::default)
            .validated_traffic_policies = policies;
        true
    }

    /// Replaces the conflict and translator errors recorded on `policy`.
    /// Returns false if nothing changed.
    pub fn mutate_conflict_and_translator_errors(
        &self,
        policy: &mut TrafficPolicy,
        conflict_errors: Vec<ConflictError>,
        translator_errors: Vec<TranslatorError>,
    ) -> bool {
        Self::mutate_policy_status(policy, |status| {
            status.conflict_errors = conflict_errors;
            status.translator_errors = translator_errors;
        })
    }

    /// Replaces the validation errors recorded on `policy`. Returns false if
    /// nothing changed.
    pub fn mutate_validation_errors(
        &self,
        policy: &mut TrafficPolicy,
        errors: Vec<String>,
    ) -> bool {
        Self::mutate_policy_status(policy, |status| status.validation_errors = errors)
    }

    fn mutate_policy_status(
        policy: &mut TrafficPolicy,
        update: impl FnOnce(&mut TrafficPolicyStatus),
    ) -> bool {
        let mut status = policy.status.clone().unwrap_or_default();
        update(&mut status);
        status.observed_generation = policy.metadata.generation;

        if policy.status.as_ref() == Some(&status) {
            return false;
        }
        policy.status = Some(status);
        true
    }
}

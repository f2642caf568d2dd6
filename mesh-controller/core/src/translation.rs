use crate::{ClusterSnapshot, ResourceId};
use meshhub_controller_k8s_api::{
    networking::{ConflictError, TranslatorError},
    Mesh, MeshService, ValidatedTrafficPolicy,
};

/// Everything a translator needs to compile a single service.
#[derive(Copy, Clone, Debug)]
pub struct TranslationInput<'a> {
    pub service: &'a MeshService,

    /// Every discovered service, used to resolve destinations and to find
    /// subsets that other services route to.
    pub all_services: &'a [MeshService],

    pub mesh: &'a Mesh,

    /// The policies to compile. Usually the service's validated policies.
    pub policies: &'a [ValidatedTrafficPolicy],
}

/// A translator error attributed to the policy that caused it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolicyTranslationError {
    pub policy: ResourceId,
    pub error: TranslatorError,
}

/// Mesh-specific compatibility checks run while collecting the policies
/// that apply to a service.
pub trait TranslationValidator: Send + Sync {
    /// Identifies the translator in `TranslatorError`s.
    fn translator_id(&self) -> &'static str;

    /// Returns an error if `candidate` cannot be applied to the same service
    /// as the already accepted policy.
    fn find_conflict(
        &self,
        accepted: &ValidatedTrafficPolicy,
        candidate: &ValidatedTrafficPolicy,
    ) -> Option<ConflictError>;

    /// Returns the errors the mesh translator would report for `input`.
    fn translation_errors(&self, input: &TranslationInput<'_>) -> Vec<PolicyTranslationError>;
}

/// Compiles a service's validated policies into mesh-native objects.
pub trait MeshTranslator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Appends the objects compiled for `input.service` to `snapshot` and
    /// returns the per-policy errors encountered. Objects for policies that
    /// failed are omitted; everything else is still emitted.
    fn accumulate(
        &self,
        input: &TranslationInput<'_>,
        snapshot: &mut ClusterSnapshot,
    ) -> Vec<PolicyTranslationError>;
}

// === impl PolicyTranslationError ===

impl PolicyTranslationError {
    pub fn new(policy: ResourceId, translator_id: &str, message: impl ToString) -> Self {
        Self {
            policy,
            error: TranslatorError::new(translator_id, message),
        }
    }
}

impl std::fmt::Display for PolicyTranslationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}: {}",
            self.policy, self.error.translator_id, self.error.error_message
        )
    }
}

//! Istio translation.
//!
//! Each service yields at most one `DestinationRule` and one
//! `VirtualService`, both named after the service and written into the
//! service's namespace on the service's cluster.

mod destination_rule;
mod specificity;
mod subset;
mod validator;
mod virtual_service;

pub use self::{subset::subset_name, validator::IstioValidator};
use meshhub_controller_core::{
    ClusterSnapshot, MeshFamily, MeshTranslator, PolicyTranslationError, TranslationInput,
};
use meshhub_controller_k8s_api::{
    istio::{DestinationRule, VirtualService},
    MeshService, ObjectMeta, ValidatedTrafficPolicy, MANAGED_BY_LABEL, MANAGED_BY_VALUE,
};
use std::collections::BTreeMap;

/// Identifies the Istio translator in policy status.
pub const TRANSLATOR_ID: &str = "istio-translator";

#[derive(Copy, Clone, Debug, Default)]
pub struct IstioTranslator(());

/// The output of translating a single service.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Translation {
    pub destination_rules: Vec<DestinationRule>,
    pub virtual_services: Vec<VirtualService>,
    pub errors: Vec<PolicyTranslationError>,
}

// === impl IstioTranslator ===

impl IstioTranslator {
    /// Compiles `input.policies` for `input.service`.
    ///
    /// Meshes outside the Istio family produce nothing. A policy that fails
    /// to translate contributes no routes; the destination rule is always
    /// produced so that it is never deleted because of an unrelated error.
    pub fn translate(&self, input: &TranslationInput<'_>) -> Translation {
        if input.mesh.spec.mesh_type.family() != MeshFamily::Istio {
            return Translation::default();
        }

        let destination_rule = destination_rule::build(input);
        let (virtual_service, errors) = virtual_service::build(input);
        Translation {
            destination_rules: vec![destination_rule],
            virtual_services: virtual_service.into_iter().collect(),
            errors,
        }
    }
}

impl MeshTranslator for IstioTranslator {
    fn name(&self) -> &'static str {
        "istio"
    }

    fn accumulate(
        &self,
        input: &TranslationInput<'_>,
        snapshot: &mut ClusterSnapshot,
    ) -> Vec<PolicyTranslationError> {
        let Translation {
            destination_rules,
            virtual_services,
            errors,
        } = self.translate(input);
        snapshot.istio.destination_rules.extend(destination_rules);
        snapshot.istio.virtual_services.extend(virtual_services);
        errors
    }
}

/// Metadata shared by every object compiled for `service`.
fn metadata(service: &MeshService) -> ObjectMeta {
    ObjectMeta {
        name: Some(service.kube_name().to_string()),
        namespace: Some(service.kube_namespace().to_string()),
        labels: Some(BTreeMap::from([(
            MANAGED_BY_LABEL.to_string(),
            MANAGED_BY_VALUE.to_string(),
        )])),
        ..Default::default()
    }
}

/// The namespace that unqualified references in `policy` resolve against.
fn policy_namespace<'a>(policy: &'a ValidatedTrafficPolicy, service: &'a MeshService) -> &'a str {
    policy.ref_.namespace_or(service.kube_namespace())
}

fn saturating_i32(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

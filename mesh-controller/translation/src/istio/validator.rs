use super::{IstioTranslator, TRANSLATOR_ID};
use meshhub_controller_core::{PolicyTranslationError, TranslationInput, TranslationValidator};
use meshhub_controller_k8s_api::{
    networking::{ConflictError, HttpMatcher},
    ValidatedTrafficPolicy,
};

/// Rejects policies that cannot be compiled into Istio configuration
/// alongside the policies already accepted for a service.
#[derive(Copy, Clone, Debug, Default)]
pub struct IstioValidator {
    translator: IstioTranslator,
}

impl TranslationValidator for IstioValidator {
    fn translator_id(&self) -> &'static str {
        TRANSLATOR_ID
    }

    fn find_conflict(
        &self,
        accepted: &ValidatedTrafficPolicy,
        candidate: &ValidatedTrafficPolicy,
    ) -> Option<ConflictError> {
        let a = &accepted.traffic_policy_spec;
        let c = &candidate.traffic_policy_spec;

        // A destination rule carries a single outlier detection setting.
        if let (Some(a_od), Some(c_od)) = (&a.outlier_detection, &c.outlier_detection) {
            if a_od != c_od {
                return Some(ConflictError::new(format!(
                    "conflicts with {}: outlierDetection differs",
                    accepted.ref_
                )));
            }
        }

        // With identical match sets the later route would be shadowed by the
        // earlier one. Policies without routes cannot shadow anything.
        if a.configures_routes()
            && c.configures_routes()
            && a.source_selector.clone().unwrap_or_default()
                == c.source_selector.clone().unwrap_or_default()
            && same_matchers(&a.http_request_matchers, &c.http_request_matchers)
        {
            return Some(ConflictError::new(format!(
                "conflicts with {}: identical request matchers",
                accepted.ref_
            )));
        }

        None
    }

    fn translation_errors(&self, input: &TranslationInput<'_>) -> Vec<PolicyTranslationError> {
        self.translator.translate(input).errors
    }
}

/// Compares matcher lists ignoring order, since Istio ORs a route's matches.
fn same_matchers(a: &[HttpMatcher], b: &[HttpMatcher]) -> bool {
    a.iter().all(|m| b.contains(m)) && b.iter().all(|m| a.contains(m))
}

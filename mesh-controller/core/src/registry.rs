use crate::{MeshTranslator, TranslationValidator};
use ahash::AHashMap as HashMap;
use meshhub_controller_k8s_api::discovery::{MeshFamily, MeshType};
use std::sync::Arc;

/// Maps mesh types to the plugins that support them.
///
/// Mesh types in the same [`MeshFamily`] share plugins.
#[derive(Clone, Default)]
pub struct Registry {
    validators: HashMap<MeshFamily, Arc<dyn TranslationValidator>>,
    translators: HashMap<MeshFamily, Arc<dyn MeshTranslator>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unsupported mesh type: {0}")]
pub struct UnsupportedMeshType(pub MeshType);

// === impl Registry ===

impl Registry {
    pub fn with_validator(
        mut self,
        family: MeshFamily,
        validator: Arc<dyn TranslationValidator>,
    ) -> Self {
        self.validators.insert(family, validator);
        self
    }

    pub fn with_translator(
        mut self,
        family: MeshFamily,
        translator: Arc<dyn MeshTranslator>,
    ) -> Self {
        self.translators.insert(family, translator);
        self
    }

    pub fn validator(
        &self,
        mesh_type: MeshType,
    ) -> Result<&Arc<dyn TranslationValidator>, UnsupportedMeshType> {
        self.validators
            .get(&mesh_type.family())
            .ok_or(UnsupportedMeshType(mesh_type))
    }

    pub fn translator(
        &self,
        mesh_type: MeshType,
    ) -> Result<&Arc<dyn MeshTranslator>, UnsupportedMeshType> {
        self.translators
            .get(&mesh_type.family())
            .ok_or(UnsupportedMeshType(mesh_type))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut validators = self.validators.keys().collect::<Vec<_>>();
        validators.sort();
        let mut translators = self.translators.keys().collect::<Vec<_>>();
        translators.sort();
        f.debug_struct("Registry")
            .field("validators", &validators)
            .field("translators", &translators)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClusterSnapshot, PolicyTranslationError, TranslationInput};
    use meshhub_controller_k8s_api::{networking::ConflictError, ValidatedTrafficPolicy};

    struct Noop;

    impl MeshTranslator for Noop {
        fn name(&self) -> &'static str {
            "noop"
        }

        fn accumulate(
            &self,
            _: &TranslationInput<'_>,
            _: &mut ClusterSnapshot,
        ) -> Vec<PolicyTranslationError> {
            vec![]
        }
    }

    impl TranslationValidator for Noop {
        fn translator_id(&self) -> &'static str {
            "noop"
        }

        fn find_conflict(
            &self,
            _: &ValidatedTrafficPolicy,
            _: &ValidatedTrafficPolicy,
        ) -> Option<ConflictError> {
            None
        }

        fn translation_errors(&self, _: &TranslationInput<'_>) -> Vec<PolicyTranslationError> {
            vec![]
        }
    }

    #[test]
    fn lookups_resolve_by_family() {
        let registry = Registry::default()
            .with_validator(MeshFamily::Istio, Arc::new(Noop))
            .with_translator(MeshFamily::Istio, Arc::new(Noop));

        assert!(registry.validator(MeshType::Istio1_5).is_ok());
        assert!(registry.translator(MeshType::Istio1_6).is_ok());
        assert_eq!(
            registry.translator(MeshType::Linkerd).err(),
            Some(UnsupportedMeshType(MeshType::Linkerd))
        );
        assert_eq!(
            registry.validator(MeshType::AwsAppMesh).err(),
            Some(UnsupportedMeshType(MeshType::AwsAppMesh))
        );
    }
}

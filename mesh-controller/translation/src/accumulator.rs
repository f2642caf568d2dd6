use meshhub_controller_core::{
    ClusterSnapshots, PolicyTranslationError, Registry, TranslationInput,
};
use meshhub_controller_k8s_api::{Mesh, MeshService};

/// Folds the translation of every service into per-cluster snapshots.
#[derive(Clone, Debug)]
pub struct TranslationSnapshotAccumulator {
    registry: Registry,
}

impl TranslationSnapshotAccumulator {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Translates `service`'s validated policies into the snapshot for the
    /// service's cluster.
    ///
    /// Errors are returned for logging only; they are already recorded on
    /// policy status by aggregation. Services on unsupported meshes are
    /// skipped.
    pub fn accumulate_from_translation(
        &self,
        snapshots: &mut ClusterSnapshots,
        service: &MeshService,
        all_services: &[MeshService],
        mesh: &Mesh,
    ) -> Vec<PolicyTranslationError> {
        let translator = match self.registry.translator(mesh.spec.mesh_type) {
            Ok(translator) => translator,
            Err(error) => {
                tracing::trace!(service = %service.kube_name(), %error, "Skipping translation");
                return vec![];
            }
        };

        let input = TranslationInput {
            service,
            all_services,
            mesh,
            policies: service.validated_traffic_policies(),
        };
        let snapshot = snapshots
            .entry(service.cluster_name().to_string())
            .or_default();
        translator.accumulate(&input, snapshot)
    }
}

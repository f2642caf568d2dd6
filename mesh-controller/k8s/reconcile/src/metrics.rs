use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct ReconcileMetrics {
    reconciles: Family<ClusterLabels, Counter>,
    writes: Family<WriteLabels, Counter>,
}

#[derive(Clone, Debug, Default)]
pub struct StatusMetrics {
    patches: Family<PatchLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ClusterLabels {
    cluster: String,
    result: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct WriteLabels {
    cluster: String,
    kind: String,
    op: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct PatchLabels {
    kind: String,
    result: &'static str,
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let reconciles = Family::default();
        prom.register(
            "cluster_reconciles",
            "Count of cluster reconciliations by result",
            reconciles.clone(),
        );

        let writes = Family::default();
        prom.register(
            "object_writes",
            "Count of mesh-native objects applied or deleted",
            writes.clone(),
        );

        Self { reconciles, writes }
    }

    pub(crate) fn reconciled(&self, cluster: &str, ok: bool) {
        self.reconciles
            .get_or_create(&ClusterLabels {
                cluster: cluster.to_string(),
                result: if ok { "ok" } else { "error" },
            })
            .inc();
    }

    pub(crate) fn wrote(&self, cluster: &str, kind: &str, op: &'static str) {
        self.writes
            .get_or_create(&WriteLabels {
                cluster: cluster.to_string(),
                kind: kind.to_string(),
                op,
            })
            .inc();
    }
}

// === impl StatusMetrics ===

impl StatusMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let patches = Family::default();
        prom.register(
            "status_patches",
            "Count of status patches by resource kind and result",
            patches.clone(),
        );
        Self { patches }
    }

    pub(crate) fn patched(&self, kind: &str, result: &'static str) {
        self.patches
            .get_or_create(&PatchLabels {
                kind: kind.to_string(),
                result,
            })
            .inc();
    }
}

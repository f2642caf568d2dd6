use crate::{
    aggregation::{AggregationProcessor, ProcessError, ProcessOutput},
    core::{ClusterSnapshots, Discovery, Registry, ResourceId, Snapshot},
    k8s::TrafficPolicy,
    reconcile::{
        initialize_cluster_name_to_snapshot, ClusterClients, StatusWriter,
        TranslationSnapshotReconciler,
    },
    store::SharedStore,
    translation::TranslationSnapshotAccumulator,
};
use kubert::lease::Claim;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry as Prom,
};
use std::sync::Arc;
use tokio::{sync::watch, time};
use tokio_util::sync::CancellationToken;

/// Recompiles mesh configuration whenever the watched resources change.
pub struct SyncLoop<C> {
    store: SharedStore,
    changes: watch::Receiver<u64>,
    registry: Registry,
    status: StatusWriter,
    reconciler: TranslationSnapshotReconciler<C>,
    claims: watch::Receiver<Arc<Claim>>,
    hostname: String,
    resync: time::Duration,
    debounce: time::Duration,
    metrics: SyncMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct SyncMetrics {
    cycles: Family<CycleLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CycleLabels {
    result: &'static str,
}

/// The output of a single sync cycle, before anything is written.
#[derive(Debug)]
pub(crate) struct Compiled {
    pub(crate) output: ProcessOutput,
    pub(crate) snapshots: ClusterSnapshots,
}

/// Runs aggregation over every service and then translates every service
/// using the statuses aggregation produced.
pub(crate) fn compile(
    registry: &Registry,
    discovery: &Snapshot,
    policies: &[TrafficPolicy],
) -> Result<Compiled, ProcessError> {
    let output = AggregationProcessor::new(discovery, registry.clone()).process(policies)?;

    let meshes = discovery.meshes().map_err(ProcessError::Discovery)?;
    let mut snapshots = initialize_cluster_name_to_snapshot(&meshes);
    let accumulator = TranslationSnapshotAccumulator::new(registry.clone());
    for service in &output.services {
        let service_id = ResourceId::of(service);
        let mesh_id = ResourceId::from_ref(&service.spec.mesh, &service_id.namespace);
        let Some(mesh) = discovery
            .mesh(&mesh_id)
            .map_err(ProcessError::Discovery)?
        else {
            continue;
        };
        for error in accumulator.accumulate_from_translation(
            &mut snapshots,
            service,
            &output.services,
            &mesh,
        ) {
            tracing::debug!(service = %service_id, %error, "Policy not translated");
        }
    }

    Ok(Compiled { output, snapshots })
}

// === impl SyncMetrics ===

impl SyncMetrics {
    pub fn register(prom: &mut Prom) -> Self {
        let cycles = Family::default();
        prom.register(
            "cycles",
            "Count of sync cycles by result",
            cycles.clone(),
        );
        Self { cycles }
    }

    fn cycle(&self, result: &'static str) {
        self.cycles.get_or_create(&CycleLabels { result }).inc();
    }
}

// === impl SyncLoop ===

impl<C: ClusterClients> SyncLoop<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: SharedStore,
        changes: watch::Receiver<u64>,
        registry: Registry,
        status: StatusWriter,
        reconciler: TranslationSnapshotReconciler<C>,
        claims: watch::Receiver<Arc<Claim>>,
        hostname: String,
        resync: time::Duration,
        debounce: time::Duration,
        metrics: SyncMetrics,
    ) -> Self {
        Self {
            store,
            changes,
            registry,
            status,
            reconciler,
            claims,
            hostname,
            resync,
            debounce,
            metrics,
        }
    }

    /// Runs cycles until the drain signal fires. A signal received during a
    /// cycle cancels its in-flight reconciliation.
    pub async fn run(mut self, drain: drain::Watch) {
        let cancel = CancellationToken::new();
        tokio::pin! {
            let shutdown = drain.signaled();
        }

        loop {
            tokio::select! {
                biased;
                release = &mut shutdown => {
                    drop(release);
                    return;
                }
                res = self.changes.changed() => if res.is_err() {
                    tracing::debug!("Store closed");
                    return;
                },
                _ = time::sleep(self.resync) => tracing::debug!("Resyncing"),
            }

            // Coalesce bursts of watch events into a single cycle.
            time::sleep(self.debounce).await;
            let generation = *self.changes.borrow_and_update();

            let cycle = self.cycle(generation, &cancel);
            tokio::pin!(cycle);
            tokio::select! {
                biased;
                () = &mut cycle => {}
                release = &mut shutdown => {
                    cancel.cancel();
                    (&mut cycle).await;
                    drop(release);
                    return;
                }
            }
        }
    }

    #[tracing::instrument(skip(self, cancel))]
    async fn cycle(&self, generation: u64, cancel: &CancellationToken) {
        let (discovery, policies) = self.store.read().snapshot();
        let Compiled { output, snapshots } = match compile(&self.registry, &discovery, &policies)
        {
            Ok(compiled) => compiled,
            Err(error) => {
                tracing::warn!(%error, "Sync cycle aborted");
                self.metrics.cycle("error");
                return;
            }
        };
        tracing::debug!(
            services = output.mesh_services.len(),
            policies = output.traffic_policies.len(),
            clusters = snapshots.len(),
            "Compiled"
        );

        if !self.claims.borrow().is_current_for(&self.hostname) {
            tracing::debug!("Lease not held; skipping writes");
            self.metrics.cycle("follower");
            return;
        }

        self.status.write_mesh_services(&output.mesh_services).await;
        self.status
            .write_traffic_policies(&output.traffic_policies)
            .await;

        match self
            .reconciler
            .reconcile_all_snapshots(cancel, &snapshots)
            .await
        {
            Ok(()) => self.metrics.cycle("ok"),
            Err(errors) => {
                tracing::warn!(%errors, "Reconciliation incomplete");
                self.metrics.cycle("reconcile_error");
            }
        }
    }
}

use crate::{
    clients::{ClusterClient, ClusterClients},
    managed::{is_managed, Managed},
    metrics::ReconcileMetrics,
};
use meshhub_controller_core::{ClusterSnapshot, ClusterSnapshots, ResourceId};
use meshhub_controller_k8s_api::Mesh;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use tokio_util::sync::CancellationToken;

/// Applies per-cluster snapshots of desired mesh-native objects.
pub struct TranslationSnapshotReconciler<C> {
    clients: C,
    metrics: ReconcileMetrics,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("cluster {cluster}: reconciliation cancelled")]
    Cancelled { cluster: String },

    #[error("cluster {cluster}: failed to obtain client: {source}")]
    Client {
        cluster: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cluster {cluster}: failed to list {kind}: {source}")]
    List {
        cluster: String,
        kind: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cluster {cluster}: failed to {op} {kind} {namespace}/{name}: {source}")]
    Write {
        cluster: String,
        op: &'static str,
        kind: String,
        namespace: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Every cluster that failed to reconcile in a pass.
#[derive(Debug)]
pub struct ReconcileErrors(pub Vec<ReconcileError>);

/// Returns an empty snapshot for every cluster hosting a known mesh so that a
/// cluster which lost all of its services is still reconciled.
pub fn initialize_cluster_name_to_snapshot(meshes: &[Mesh]) -> ClusterSnapshots {
    meshes
        .iter()
        .map(|mesh| (mesh.cluster_name().to_string(), ClusterSnapshot::default()))
        .collect()
}

// === impl ReconcileError ===

impl ReconcileError {
    pub fn cluster(&self) -> &str {
        match self {
            Self::Cancelled { cluster }
            | Self::Client { cluster, .. }
            | Self::List { cluster, .. }
            | Self::Write { cluster, .. } => cluster,
        }
    }
}

// === impl ReconcileErrors ===

impl fmt::Display for ReconcileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cluster(s) failed to reconcile", self.0.len())?;
        for error in &self.0 {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ReconcileErrors {}

// === impl TranslationSnapshotReconciler ===

impl<C: ClusterClients> TranslationSnapshotReconciler<C> {
    pub fn new(clients: C, metrics: ReconcileMetrics) -> Self {
        Self { clients, metrics }
    }

    /// Reconciles every cluster concurrently. A failing or cancelled cluster
    /// does not stop the others; all failures are returned together.
    pub async fn reconcile_all_snapshots(
        &self,
        cancel: &CancellationToken,
        snapshots: &ClusterSnapshots,
    ) -> Result<(), ReconcileErrors> {
        let clusters = snapshots.keys().map(String::as_str).collect::<Vec<_>>();
        self.clients.retain(&clusters);

        let tasks = snapshots.iter().map(|(cluster, snapshot)| async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ReconcileError::Cancelled {
                    cluster: cluster.clone(),
                }),
                res = self.reconcile_cluster(cluster, snapshot) => res,
            };
            // Credentials may have been rotated; rebuild the client next time.
            let failed = result
                .as_ref()
                .is_err_and(|error| !matches!(error, ReconcileError::Cancelled { .. }));
            if failed {
                self.clients.evict(cluster);
            }
            self.metrics.reconciled(cluster, result.is_ok());
            result
        });

        let errors = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect::<Vec<_>>();
        if errors.is_empty() {
            return Ok(());
        }
        for error in &errors {
            tracing::warn!(cluster = %error.cluster(), %error, "Cluster reconciliation failed");
        }
        Err(ReconcileErrors(errors))
    }

    #[tracing::instrument(skip_all, fields(%cluster))]
    async fn reconcile_cluster(
        &self,
        cluster: &str,
        snapshot: &ClusterSnapshot,
    ) -> Result<(), ReconcileError> {
        let client = self
            .clients
            .client_for_cluster(cluster)
            .await
            .map_err(|source| ReconcileError::Client {
                cluster: cluster.to_string(),
                source,
            })?;

        self.reconcile_kind(cluster, &client, &snapshot.istio.virtual_services)
            .await?;
        self.reconcile_kind(cluster, &client, &snapshot.istio.destination_rules)
            .await?;
        tracing::debug!("Reconciled");
        Ok(())
    }

    async fn reconcile_kind<K: Managed>(
        &self,
        cluster: &str,
        client: &C::Client,
        desired: &[K],
    ) -> Result<(), ReconcileError> {
        let kind = K::kind(&()).to_string();

        let live = client
            .list_managed::<K>()
            .await
            .map_err(|source| ReconcileError::List {
                cluster: cluster.to_string(),
                kind: kind.clone(),
                source,
            })?
            .into_iter()
            .filter(is_managed)
            .map(|obj| (ResourceId::of(&obj), obj))
            .collect::<BTreeMap<_, _>>();

        let write_error = |op, id: &ResourceId, source| ReconcileError::Write {
            cluster: cluster.to_string(),
            op,
            kind: kind.clone(),
            namespace: id.namespace.clone(),
            name: id.name.clone(),
            source,
        };

        let mut desired_ids = BTreeSet::new();
        for obj in desired {
            let id = ResourceId::of(obj);
            let stale = live.get(&id).map_or(true, |live| obj.differs_from(live));
            desired_ids.insert(id.clone());
            if !stale {
                continue;
            }
            client
                .apply(obj)
                .await
                .map_err(|source| write_error("apply", &id, source))?;
            self.metrics.wrote(cluster, &kind, "apply");
            tracing::info!(%kind, namespace = %id.namespace, name = %id.name, "Applied");
        }

        for id in live.keys().filter(|id| !desired_ids.contains(*id)) {
            client
                .delete::<K>(&id.namespace, &id.name)
                .await
                .map_err(|source| write_error("delete", id, source))?;
            self.metrics.wrote(cluster, &kind, "delete");
            tracing::info!(%kind, namespace = %id.namespace, name = %id.name, "Deleted orphan");
        }

        Ok(())
    }
}

impl<C> fmt::Debug for TranslationSnapshotReconciler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationSnapshotReconciler")
            .finish_non_exhaustive()
    }
}

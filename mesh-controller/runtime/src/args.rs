use crate::{
    k8s::{watcher, Mesh, MeshService, TrafficPolicy},
    lease,
    reconcile::{
        KubeconfigSecretClients, ReconcileMetrics, StatusMetrics, StatusWriter,
        TranslationSnapshotReconciler,
    },
    store::Store,
    sync::{SyncLoop, SyncMetrics},
    translation,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use tokio::time::Duration;
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "mesh-controller",
    about = "Compiles traffic policies into mesh configuration"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "meshhub=info,warn",
        env = "MESHHUB_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    #[clap(long, default_value = "meshhub-system")]
    control_plane_namespace: String,

    #[clap(long, default_value = "meshhub-controller")]
    controller_deployment_name: String,

    /// Namespace holding one kubeconfig secret per registered cluster.
    #[clap(long, default_value = "meshhub-system")]
    kubeconfig_secret_namespace: String,

    /// Interval at which a cycle runs even if nothing changed.
    #[clap(long, default_value = "60")]
    resync_period_secs: u64,

    #[clap(long, default_value = "100")]
    debounce_ms: u64,

    #[clap(long, default_value = "5000")]
    patch_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            control_plane_namespace,
            controller_deployment_name,
            kubeconfig_secret_namespace,
            resync_period_secs,
            debounce_ms,
            patch_timeout_ms,
        } = self;

        let mut prom = <Registry>::default();
        let sync_metrics = SyncMetrics::register(prom.sub_registry_with_prefix("sync"));
        let status_metrics = StatusMetrics::register(prom.sub_registry_with_prefix("status"));
        let reconcile_metrics =
            ReconcileMetrics::register(prom.sub_registry_with_prefix("reconcile"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let hostname =
            std::env::var("HOSTNAME").context("failed to read the HOSTNAME environment variable")?;

        let claims = lease::init(
            &runtime,
            &control_plane_namespace,
            &controller_deployment_name,
            &hostname,
        )
        .await?;

        // Spawn resource watches.

        let (store, changes) = Store::shared();

        let services = runtime.watch_all::<MeshService>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(store.clone(), services)
                .instrument(info_span!("meshservices")),
        );

        let meshes = runtime.watch_all::<Mesh>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(store.clone(), meshes).instrument(info_span!("meshes")),
        );

        let policies = runtime.watch_all::<TrafficPolicy>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(store.clone(), policies)
                .instrument(info_span!("trafficpolicies")),
        );

        // Spawn the sync loop.

        let status = StatusWriter::new(
            runtime.client(),
            Duration::from_millis(patch_timeout_ms),
            status_metrics,
        );
        let clients = KubeconfigSecretClients::new(runtime.client(), &kubeconfig_secret_namespace);
        let reconciler = TranslationSnapshotReconciler::new(clients, reconcile_metrics);
        let sync = SyncLoop::new(
            store,
            changes,
            translation::registry(),
            status,
            reconciler,
            claims,
            hostname,
            Duration::from_secs(resync_period_secs),
            Duration::from_millis(debounce_ms),
            sync_metrics,
        );
        tokio::spawn(
            sync.run(runtime.shutdown_handle())
                .instrument(info_span!("sync")),
        );

        // Run until shutdown is signaled, then wait for the sync loop to drain.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

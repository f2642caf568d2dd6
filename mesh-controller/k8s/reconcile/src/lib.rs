#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Applies compiled mesh configuration to registered clusters and writes
//! computed status back to the management cluster.

mod clients;
mod managed;
mod metrics;
mod reconciler;
mod status;


pub use self::{
    clients::{ClusterClient, ClusterClients, KubeClusterClient, KubeconfigSecretClients},
    managed::Managed,
    metrics::{ReconcileMetrics, StatusMetrics},
    reconciler::{
        initialize_cluster_name_to_snapshot, ReconcileError, ReconcileErrors,
        TranslationSnapshotReconciler,
    },
    status::StatusWriter,
};

/// Field manager used for every write made by the controller.
pub const FIELD_MANAGER: &str = "networking.meshhub.io";

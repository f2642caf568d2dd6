#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use meshhub_controller_aggregation as aggregation;
pub use meshhub_controller_core as core;
pub use meshhub_controller_k8s_api as k8s;
pub use meshhub_controller_k8s_reconcile as reconcile;
pub use meshhub_controller_translation as translation;

mod args;
mod lease;
mod store;
mod sync;

pub use self::{
    args::Args,
    store::{SharedStore, Store},
    sync::{SyncLoop, SyncMetrics},
};

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod discovery;
pub mod duration;
pub mod istio;
pub mod labels;
pub mod networking;
mod resource_ref;

pub use self::{
    discovery::{Mesh, MeshService, MeshType},
    duration::K8sDuration,
    networking::{TrafficPolicy, TrafficPolicySpec, ValidatedTrafficPolicy},
    resource_ref::ResourceRef,
};
pub use k8s_openapi::{
    api::{self, core::v1::Secret},
    apimachinery::pkg::apis::meta::v1::Time,
    NamespaceResourceScope,
};
pub use kube::{
    api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, ResourceExt},
    error::ErrorResponse,
    runtime::watcher,
    Client, Error, Resource,
};

/// Label placed on every mesh-native object written by the controller so that
/// orphaned objects can be found and removed.
pub const MANAGED_BY_LABEL: &str = "networking.meshhub.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on objects owned by this controller.
pub const MANAGED_BY_VALUE: &str = "meshhub-controller";

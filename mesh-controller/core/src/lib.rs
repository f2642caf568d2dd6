#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod discovery;
mod registry;
mod resource_id;
pub mod snapshot;
pub mod translation;

pub use self::{
    discovery::{Discovery, Snapshot},
    registry::{Registry, UnsupportedMeshType},
    resource_id::{ClusterResourceId, ResourceId},
    snapshot::{ClusterSnapshot, ClusterSnapshots, IstioSnapshot},
    translation::{MeshTranslator, PolicyTranslationError, TranslationInput, TranslationValidator},
};
pub use meshhub_controller_k8s_api::discovery::{MeshFamily, MeshType};

use crate::ResourceId;
use anyhow::Result;
use meshhub_controller_k8s_api::{Mesh, MeshService};
use std::collections::BTreeMap;

/// A point-in-time view of discovered topology.
///
/// Implementations must be consistent for the duration of a sync cycle.
pub trait Discovery {
    /// Lists every discovered mesh service.
    fn mesh_services(&self) -> Result<Vec<MeshService>>;

    /// Lists every discovered mesh.
    fn meshes(&self) -> Result<Vec<Mesh>>;

    /// Looks up a mesh by namespace and name.
    fn mesh(&self, id: &ResourceId) -> Result<Option<Mesh>>;
}

/// An immutable discovery snapshot.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    services: BTreeMap<ResourceId, MeshService>,
    meshes: BTreeMap<ResourceId, Mesh>,
}

// === impl Snapshot ===

impl Snapshot {
    pub fn new(
        services: impl IntoIterator<Item = MeshService>,
        meshes: impl IntoIterator<Item = Mesh>,
    ) -> Self {
        Self {
            services: services
                .into_iter()
                .map(|s| (ResourceId::of(&s), s))
                .collect(),
            meshes: meshes.into_iter().map(|m| (ResourceId::of(&m), m)).collect(),
        }
    }
}

impl Discovery for Snapshot {
    fn mesh_services(&self) -> Result<Vec<MeshService>> {
        Ok(self.services.values().cloned().collect())
    }

    fn meshes(&self) -> Result<Vec<Mesh>> {
        Ok(self.meshes.values().cloned().collect())
    }

    fn mesh(&self, id: &ResourceId) -> Result<Option<Mesh>> {
        Ok(self.meshes.get(id).cloned())
    }
}

impl<D: Discovery + ?Sized> Discovery for &D {
    fn mesh_services(&self) -> Result<Vec<MeshService>> {
        (**self).mesh_services()
    }

    fn meshes(&self) -> Result<Vec<Mesh>> {
        (**self).meshes()
    }

    fn mesh(&self, id: &ResourceId) -> Result<Option<Mesh>> {
        (**self).mesh(id)
    }
}

pub mod mesh;
pub mod mesh_service;

pub use self::{
    mesh::{Mesh, MeshFamily, MeshInstallation, MeshSpec, MeshType},
    mesh_service::{
        Federation, KubeService, KubeServicePort, MeshService, MeshServiceSpec, MeshServiceStatus,
    },
};

use crate::ResourceRef;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A discovered mesh control plane installed on a registered cluster.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "discovery.meshhub.io",
    version = "v1alpha1",
    kind = "Mesh",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MeshSpec {
    /// The cluster on which the control plane runs.
    pub cluster: ResourceRef,

    pub mesh_type: MeshType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation: Option<MeshInstallation>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum MeshType {
    #[serde(rename = "istio1_5")]
    Istio1_5,
    #[serde(rename = "istio1_6")]
    Istio1_6,
    AwsAppMesh,
    Linkerd,
    ConsulConnect,
}

/// Mesh types that share configuration semantics, and therefore a
/// translator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeshFamily {
    Istio,
    AppMesh,
    Linkerd,
    ConsulConnect,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeshInstallation {
    pub namespace: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

// === impl Mesh ===

impl Mesh {
    #[inline]
    pub fn cluster_name(&self) -> &str {
        &self.spec.cluster.name
    }
}

// === impl MeshType ===

impl MeshType {
    pub fn family(&self) -> MeshFamily {
        match self {
            Self::Istio1_5 | Self::Istio1_6 => MeshFamily::Istio,
            Self::AwsAppMesh => MeshFamily::AppMesh,
            Self::Linkerd => MeshFamily::Linkerd,
            Self::ConsulConnect => MeshFamily::ConsulConnect,
        }
    }
}

impl fmt::Display for MeshType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Istio1_5 => "istio1_5",
            Self::Istio1_6 => "istio1_6",
            Self::AwsAppMesh => "awsAppMesh",
            Self::Linkerd => "linkerd",
            Self::ConsulConnect => "consulConnect",
        })
    }
}

impl fmt::Display for MeshFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn istio_versions_share_a_family() {
        assert_eq!(MeshType::Istio1_5.family(), MeshType::Istio1_6.family());
        assert_ne!(MeshType::Istio1_6.family(), MeshType::Linkerd.family());
    }

    #[test]
    fn mesh_type_wire_names() {
        let t: MeshType = serde_json::from_str("\"istio1_6\"").unwrap();
        assert_eq!(t, MeshType::Istio1_6);
        assert_eq!(
            serde_json::to_string(&MeshType::AwsAppMesh).unwrap(),
            "\"awsAppMesh\""
        );
        assert_eq!(MeshType::Istio1_5.to_string(), "istio1_5");
    }
}

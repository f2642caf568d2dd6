use crate::{labels, networking::ValidatedTrafficPolicy, ResourceRef};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A discovered Kubernetes service participating in a mesh.
///
/// The underlying service is identified by the (name, namespace, cluster)
/// triple in `kubeService.ref`.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "discovery.meshhub.io",
    version = "v1alpha1",
    kind = "MeshService",
    derive = "PartialEq",
    status = "MeshServiceStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MeshServiceSpec {
    pub kube_service: KubeService,

    /// The `Mesh` that owns this service.
    pub mesh: ResourceRef,

    /// Set when the service is reachable from other clusters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federation: Option<Federation>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeService {
    #[serde(rename = "ref")]
    pub ref_: ResourceRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<labels::Map>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_selector_labels: Option<labels::Map>,

    #[serde(default)]
    pub ports: Vec<KubeServicePort>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeServicePort {
    pub port: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Federation {
    /// The DNS name other clusters use to reach this service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multicluster_dns_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeshServiceStatus {
    /// Policies currently in force for this service, in evaluation order.
    #[serde(default)]
    pub validated_traffic_policies: Vec<ValidatedTrafficPolicy>,
}

// === impl MeshService ===

impl MeshService {
    /// The name of the underlying Kubernetes service.
    #[inline]
    pub fn kube_name(&self) -> &str {
        &self.spec.kube_service.ref_.name
    }

    /// The namespace of the underlying Kubernetes service.
    #[inline]
    pub fn kube_namespace(&self) -> &str {
        self.spec.kube_service.ref_.namespace.as_deref().unwrap_or("default")
    }

    /// The cluster of the underlying Kubernetes service.
    #[inline]
    pub fn cluster_name(&self) -> &str {
        self.spec.kube_service.ref_.cluster.as_deref().unwrap_or_default()
    }

    pub fn validated_traffic_policies(&self) -> &[ValidatedTrafficPolicy] {
        self.status
            .as_ref()
            .map(|s| s.validated_traffic_policies.as_slice())
            .unwrap_or_default()
    }
}

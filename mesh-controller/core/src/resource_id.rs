use meshhub_controller_k8s_api::{self as k8s, ResourceExt};
use std::fmt;

/// Identifies a namespaced resource on the management cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

/// Identifies a namespaced resource on a specific registered cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterResourceId {
    pub cluster: String,
    pub namespace: String,
    pub name: String,
}

// === impl ResourceId ===

impl ResourceId {
    pub fn new(namespace: String, name: String) -> Self {
        Self { namespace, name }
    }

    /// Builds the id of a namespaced resource. Cluster-scoped resources get an
    /// empty namespace.
    pub fn of<T: ResourceExt>(resource: &T) -> Self {
        Self {
            namespace: resource.namespace().unwrap_or_default(),
            name: resource.name_any(),
        }
    }

    /// Resolves a reference made from an object in `default_ns`.
    pub fn from_ref(reference: &k8s::ResourceRef, default_ns: &str) -> Self {
        Self {
            namespace: reference.namespace_or(default_ns).to_string(),
            name: reference.name.clone(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl From<&ResourceId> for k8s::ResourceRef {
    fn from(id: &ResourceId) -> Self {
        k8s::ResourceRef::new(&id.namespace, &id.name)
    }
}

// === impl ClusterResourceId ===

impl ClusterResourceId {
    pub fn new(cluster: impl ToString, namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            cluster: cluster.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Resolves a reference made from an object in `default_ns` on
    /// `default_cluster`.
    pub fn from_ref(reference: &k8s::ResourceRef, default_ns: &str, default_cluster: &str) -> Self {
        Self {
            cluster: reference
                .cluster
                .as_deref()
                .unwrap_or(default_cluster)
                .to_string(),
            namespace: reference.namespace_or(default_ns).to_string(),
            name: reference.name.clone(),
        }
    }

    /// The identity of the Kubernetes service underlying a mesh service.
    pub fn of_service(service: &k8s::MeshService) -> Self {
        Self::new(
            service.cluster_name(),
            service.kube_namespace(),
            service.kube_name(),
        )
    }
}

impl fmt::Display for ClusterResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.cluster, self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_default_to_the_referrer() {
        let r = k8s::ResourceRef {
            name: "reviews".to_string(),
            namespace: None,
            cluster: None,
        };
        assert_eq!(
            ClusterResourceId::from_ref(&r, "bookinfo", "east"),
            ClusterResourceId::new("east", "bookinfo", "reviews")
        );

        let r = k8s::ResourceRef::new("other", "reviews").on_cluster("west");
        assert_eq!(
            ClusterResourceId::from_ref(&r, "bookinfo", "east"),
            ClusterResourceId::new("west", "other", "reviews")
        );
        assert_eq!(
            ResourceId::from_ref(&r, "bookinfo"),
            ResourceId::new("other".to_string(), "reviews".to_string())
        );
    }
}

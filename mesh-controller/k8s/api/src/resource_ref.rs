use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// References a namespaced resource, optionally on a specific cluster.
///
/// A missing namespace is resolved against the namespace of the referring
/// object; a missing cluster is resolved against the cluster the reference is
/// evaluated on.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

impl ResourceRef {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            cluster: None,
        }
    }

    pub fn on_cluster(mut self, cluster: impl ToString) -> Self {
        self.cluster = Some(cluster.to_string());
        self
    }

    #[inline]
    pub fn namespace_or<'a>(&'a self, default_ns: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default_ns)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(cluster) = self.cluster.as_deref() {
            write!(f, "{cluster}:")?;
        }
        match self.namespace.as_deref() {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

use crate::{metrics::StatusMetrics, FIELD_MANAGER};
use meshhub_controller_k8s_api::{
    Api, Client, MeshService, NamespaceResourceScope, Patch, PatchParams, Resource, ResourceExt,
    TrafficPolicy,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use tokio::time;

/// Persists computed statuses to the management cluster.
#[derive(Clone)]
pub struct StatusWriter {
    client: Client,
    timeout: time::Duration,
    metrics: StatusMetrics,
}

// === impl StatusWriter ===

impl StatusWriter {
    pub fn new(client: Client, timeout: time::Duration, metrics: StatusMetrics) -> Self {
        Self {
            client,
            timeout,
            metrics,
        }
    }

    pub async fn write_mesh_services(&self, services: &[MeshService]) {
        for svc in services {
            self.patch(svc, &svc.status).await;
        }
    }

    pub async fn write_traffic_policies(&self, policies: &[TrafficPolicy]) {
        for policy in policies {
            self.patch(policy, &policy.status).await;
        }
    }

    async fn patch<K, S>(&self, obj: &K, status: &S)
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + fmt::Debug
            + DeserializeOwned,
        S: Serialize,
    {
        let kind = K::kind(&());
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();
        let api = Api::<K>::namespaced(self.client.clone(), &namespace);
        let params = PatchParams::apply(FIELD_MANAGER);
        let patch = make_patch::<K, _>(status);

        match time::timeout(self.timeout, api.patch_status(&name, &params, &patch)).await {
            Ok(Ok(_)) => {
                tracing::debug!(%kind, %namespace, %name, "Patched status");
                self.metrics.patched(&kind, "ok");
            }
            Ok(Err(error)) => {
                tracing::error!(%kind, %namespace, %name, %error, "Failed to patch status");
                self.metrics.patched(&kind, "error");
            }
            Err(_) => {
                tracing::error!(
                    %kind,
                    %namespace,
                    %name,
                    timeout = ?self.timeout,
                    "Timed out patching status"
                );
                self.metrics.patched(&kind, "timeout");
            }
        }
    }
}

impl fmt::Debug for StatusWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusWriter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

pub(crate) fn make_patch<K, S>(status: &S) -> Patch<serde_json::Value>
where
    K: Resource<DynamicType = ()>,
    S: Serialize,
{
    let value = serde_json::json!({
        "apiVersion": K::api_version(&()),
        "kind": K::kind(&()),
        "status": status,
    });
    Patch::Merge(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshhub_controller_k8s_api::networking::TrafficPolicyStatus;

    #[test]
    fn patch_carries_type_and_status() {
        let status = TrafficPolicyStatus {
            observed_generation: Some(3),
            validation_errors: vec!["path must be absolute".to_string()],
            ..Default::default()
        };
        let Patch::Merge(value) = make_patch::<TrafficPolicy, _>(&status) else {
            panic!("expected a merge patch");
        };
        assert_eq!(value["apiVersion"], "networking.meshhub.io/v1alpha1");
        assert_eq!(value["kind"], "TrafficPolicy");
        assert_eq!(value["status"]["observedGeneration"], 3);
        assert_eq!(value["status"]["conflictErrors"], serde_json::json!([]));
        assert_eq!(
            value["status"]["validationErrors"][0],
            "path must be absolute"
        );
    }
}

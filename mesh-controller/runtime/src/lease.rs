use crate::{
    k8s::{self, api::apps::v1::Deployment, ObjectMeta, Resource},
    reconcile,
};
use anyhow::Result;
use k8s_openapi::{
    api::coordination::v1 as coordv1, apimachinery::pkg::apis::meta::v1::OwnerReference,
};
use kube::api::PatchParams;
use kubert::lease::{Claim, ClaimParams, LeaseManager};
use std::{collections::BTreeMap, sync::Arc};
use tokio::{sync::watch, time};

const LEASE_NAME: &str = "meshhub-controller-write";

const CLAIM_PARAMS: ClaimParams = ClaimParams {
    lease_duration: time::Duration::from_secs(30),
    renew_grace_period: time::Duration::from_secs(1),
};

/// Competes for the write lease in `ns`, creating it on first start.
///
/// Status patches and cluster reconciliation are only performed by the
/// replica named in the current claim.
pub async fn init<T>(
    runtime: &kubert::Runtime<T>,
    ns: &str,
    deployment_name: &str,
    hostname: &str,
) -> Result<watch::Receiver<Arc<Claim>>> {
    let deployment = k8s::Api::<Deployment>::namespaced(runtime.client(), ns)
        .get(deployment_name)
        .await?;
    let owner = deployment.controller_owner_ref(&());

    let api = k8s::Api::<coordv1::Lease>::namespaced(runtime.client(), ns);
    ensure_exists(&api, write_lease(ns, owner)).await?;

    let (claims, _task) = LeaseManager::init(api, LEASE_NAME)
        .await?
        .spawn(hostname, CLAIM_PARAMS)
        .await?;
    Ok(claims)
}

async fn ensure_exists(api: &k8s::Api<coordv1::Lease>, lease: coordv1::Lease) -> Result<()> {
    let params = PatchParams {
        field_manager: Some(reconcile::FIELD_MANAGER.to_string()),
        ..Default::default()
    };
    match api.patch(LEASE_NAME, &params, &k8s::Patch::Apply(lease)).await {
        Ok(lease) => tracing::info!(?lease, "Created write lease"),
        // The apply is conditional on resource version 0, so an existing
        // lease is reported as a conflict.
        Err(k8s::Error::Api(error)) => {
            tracing::debug!(reason = %error.reason, "Write lease already present")
        }
        Err(error) => return Err(error.into()),
    }
    Ok(())
}

/// The lease object, garbage collected along with `owner`.
fn write_lease(ns: &str, owner: Option<OwnerReference>) -> coordv1::Lease {
    coordv1::Lease {
        metadata: ObjectMeta {
            name: Some(LEASE_NAME.to_string()),
            namespace: Some(ns.to_string()),
            // Apply only when the lease does not exist yet.
            resource_version: Some("0".to_string()),
            owner_references: owner.map(|o| vec![o]),
            labels: Some(BTreeMap::from([
                (
                    "meshhub.io/control-plane-component".to_string(),
                    "mesh-controller".to_string(),
                ),
                ("meshhub.io/control-plane-ns".to_string(), ns.to_string()),
            ])),
            ..Default::default()
        },
        spec: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    #[test]
    fn lease_is_owned_and_labeled() {
        let owner = OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            name: "meshhub-controller".to_string(),
            uid: "1234".to_string(),
            controller: Some(true),
            ..Default::default()
        };

        let lease = write_lease("meshhub-system", Some(owner.clone()));

        assert_eq!(lease.metadata.name.as_deref(), Some("meshhub-controller-write"));
        assert_eq!(lease.metadata.resource_version.as_deref(), Some("0"));
        assert_eq!(lease.metadata.owner_references, Some(vec![owner]));
        assert_eq!(
            lease.metadata.labels,
            Some(btreemap! {
                "meshhub.io/control-plane-component".to_string() => "mesh-controller".to_string(),
                "meshhub.io/control-plane-ns".to_string() => "meshhub-system".to_string(),
            })
        );
    }
}

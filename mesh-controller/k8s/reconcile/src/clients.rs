use crate::{
    managed::{managed_selector, Managed},
    FIELD_MANAGER,
};
use ahash::AHashMap as HashMap;
use anyhow::{anyhow, Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use meshhub_controller_k8s_api::{
    Api, Client, DeleteParams, Error, ListParams, Patch, PatchParams, ResourceExt, Secret,
};
use parking_lot::Mutex;

/// Key holding the kubeconfig in a cluster's registration secret.
const KUBECONFIG_KEY: &str = "kubeconfig";

/// Provides clients for registered clusters.
#[async_trait::async_trait]
pub trait ClusterClients: Send + Sync {
    type Client: ClusterClient;

    async fn client_for_cluster(&self, cluster: &str) -> Result<Self::Client>;

    /// Drops anything cached for `cluster` so that its next client is built
    /// from current credentials.
    fn evict(&self, _cluster: &str) {}

    /// Drops anything cached for clusters other than `clusters`.
    fn retain(&self, _clusters: &[&str]) {}
}

/// The operations the reconciler performs against a single cluster.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    /// Lists every object of kind `K` owned by the controller.
    async fn list_managed<K: Managed>(&self) -> Result<Vec<K>>;

    /// Creates or updates `obj` with server-side apply.
    async fn apply<K: Managed>(&self, obj: &K) -> Result<()>;

    /// Deletes an object. Deleting an object that does not exist succeeds.
    async fn delete<K: Managed>(&self, namespace: &str, name: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct KubeClusterClient(Client);

/// Builds clients from kubeconfigs stored in secrets named after each
/// cluster. Clients are cached for the life of the process.
pub struct KubeconfigSecretClients {
    secrets: Api<Secret>,
    cache: Mutex<HashMap<String, Client>>,
}

// === impl KubeconfigSecretClients ===

impl KubeconfigSecretClients {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            secrets: Api::namespaced(client, namespace),
            cache: Mutex::default(),
        }
    }

    async fn build(&self, cluster: &str) -> Result<Client> {
        let secret = self
            .secrets
            .get(cluster)
            .await
            .with_context(|| format!("failed to read kubeconfig secret for cluster {cluster}"))?;
        let bytes = secret
            .data
            .and_then(|mut data| data.remove(KUBECONFIG_KEY))
            .ok_or_else(|| anyhow!("secret for cluster {cluster} has no {KUBECONFIG_KEY:?} key"))?;
        let yaml = std::str::from_utf8(&bytes.0)
            .with_context(|| format!("kubeconfig for cluster {cluster} is not UTF-8"))?;
        let kubeconfig = Kubeconfig::from_yaml(yaml)?;
        let config =
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        Ok(Client::try_from(config)?)
    }
}

#[async_trait::async_trait]
impl ClusterClients for KubeconfigSecretClients {
    type Client = KubeClusterClient;

    async fn client_for_cluster(&self, cluster: &str) -> Result<Self::Client> {
        let cached = self.cache.lock().get(cluster).cloned();
        if let Some(client) = cached {
            return Ok(KubeClusterClient(client));
        }

        let client = self.build(cluster).await?;
        tracing::debug!(%cluster, "Built cluster client");
        self.cache
            .lock()
            .insert(cluster.to_string(), client.clone());
        Ok(KubeClusterClient(client))
    }

    fn evict(&self, cluster: &str) {
        if self.cache.lock().remove(cluster).is_some() {
            tracing::debug!(%cluster, "Evicted cluster client");
        }
    }

    fn retain(&self, clusters: &[&str]) {
        self.cache
            .lock()
            .retain(|cluster, _| clusters.contains(&cluster.as_str()));
    }
}

// === impl KubeClusterClient ===

#[async_trait::async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_managed<K: Managed>(&self) -> Result<Vec<K>> {
        let api = Api::<K>::all(self.0.clone());
        let params = ListParams::default().labels(&managed_selector());
        not_found_as_default(api.list(&params).await.map(|list| list.items))
    }

    async fn apply<K: Managed>(&self, obj: &K) -> Result<()> {
        let namespace = obj
            .namespace()
            .ok_or_else(|| anyhow!("{} {} has no namespace", K::kind(&()), obj.name_any()))?;
        let api = Api::<K>::namespaced(self.0.clone(), &namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&obj.name_any(), &params, &Patch::Apply(obj))
            .await?;
        Ok(())
    }

    async fn delete<K: Managed>(&self, namespace: &str, name: &str) -> Result<()> {
        let api = Api::<K>::namespaced(self.0.clone(), namespace);
        not_found_as_default(api.delete(name, &DeleteParams::default()).await.map(|_| ()))
    }
}

/// Treats a missing resource as empty. Listing a kind whose CRD is not
/// installed on a cluster also fails with a 404.
fn not_found_as_default<T: Default>(result: Result<T, Error>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(Error::Api(error)) if error.code == 404 => Ok(T::default()),
        Err(error) => Err(error.into()),
    }
}

use crate::{
    core::{ResourceId, Snapshot},
    k8s::{Mesh, MeshService, ResourceExt, TrafficPolicy},
};
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::watch;

pub type SharedStore = Arc<RwLock<Store>>;

/// Holds the discovered topology and candidate policies observed by the
/// resource watches.
///
/// Every change that could alter the compiled output bumps a generation
/// counter so that the sync loop knows to run.
#[derive(Debug)]
pub struct Store {
    services: BTreeMap<ResourceId, MeshService>,
    meshes: BTreeMap<ResourceId, Mesh>,
    policies: BTreeMap<ResourceId, TrafficPolicy>,
    generation: watch::Sender<u64>,
}

// === impl Store ===

impl Store {
    pub fn shared() -> (SharedStore, watch::Receiver<u64>) {
        let (generation, rx) = watch::channel(0);
        let store = Self {
            services: BTreeMap::new(),
            meshes: BTreeMap::new(),
            policies: BTreeMap::new(),
            generation,
        };
        (Arc::new(RwLock::new(store)), rx)
    }

    /// Copies the current contents for a single sync cycle.
    pub fn snapshot(&self) -> (Snapshot, Vec<TrafficPolicy>) {
        let discovery = Snapshot::new(
            self.services.values().cloned(),
            self.meshes.values().cloned(),
        );
        (discovery, self.policies.values().cloned().collect())
    }

    fn bump(&self) {
        self.generation.send_modify(|gen| *gen += 1);
    }
}

/// Inserts `obj`, returning true if it differs from what was stored.
fn upsert<K, F>(map: &mut BTreeMap<ResourceId, K>, obj: K, same: F) -> bool
where
    K: ResourceExt,
    F: Fn(&K, &K) -> bool,
{
    let id = ResourceId::of(&obj);
    match map.get(&id) {
        Some(prior) if same(prior, &obj) => false,
        _ => {
            map.insert(id, obj);
            true
        }
    }
}

impl kubert::index::IndexNamespacedResource<MeshService> for Store {
    fn apply(&mut self, svc: MeshService) {
        // Status is included since it carries the policies compiled into
        // mesh configuration.
        if upsert(&mut self.services, svc, |a, b| {
            a.spec == b.spec && a.status == b.status
        }) {
            self.bump();
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        if self
            .services
            .remove(&ResourceId::new(namespace, name))
            .is_some()
        {
            self.bump();
        }
    }
}

impl kubert::index::IndexNamespacedResource<Mesh> for Store {
    fn apply(&mut self, mesh: Mesh) {
        if upsert(&mut self.meshes, mesh, |a, b| a.spec == b.spec) {
            self.bump();
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        if self
            .meshes
            .remove(&ResourceId::new(namespace, name))
            .is_some()
        {
            self.bump();
        }
    }
}

impl kubert::index::IndexNamespacedResource<TrafficPolicy> for Store {
    fn apply(&mut self, policy: TrafficPolicy) {
        // Ordering depends on the creation timestamp and observed generations
        // are recorded on status, so both are compared along with the spec.
        if upsert(&mut self.policies, policy, |a, b| {
            a.spec == b.spec
                && a.status == b.status
                && a.metadata.generation == b.metadata.generation
                && a.metadata.creation_timestamp == b.metadata.creation_timestamp
        }) {
            self.bump();
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        if self
            .policies
            .remove(&ResourceId::new(namespace, name))
            .is_some()
        {
            self.bump();
        }
    }
}

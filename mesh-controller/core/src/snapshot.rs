use meshhub_controller_k8s_api::istio::{DestinationRule, VirtualService};
use std::collections::BTreeMap;

/// Desired mesh-native objects for every cluster, keyed by cluster name.
pub type ClusterSnapshots = BTreeMap<String, ClusterSnapshot>;

/// The mesh-native objects desired on a single cluster. Rebuilt from scratch
/// on every sync cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterSnapshot {
    pub istio: IstioSnapshot,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IstioSnapshot {
    pub destination_rules: Vec<DestinationRule>,
    pub virtual_services: Vec<VirtualService>,
}

impl ClusterSnapshot {
    pub fn is_empty(&self) -> bool {
        self.istio.destination_rules.is_empty() && self.istio.virtual_services.is_empty()
    }
}

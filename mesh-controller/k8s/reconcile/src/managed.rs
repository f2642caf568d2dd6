use meshhub_controller_k8s_api::{
    istio::{DestinationRule, DestinationRuleSpec, VirtualService, VirtualServiceSpec},
    NamespaceResourceScope, Resource, ResourceExt, MANAGED_BY_LABEL, MANAGED_BY_VALUE,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// A mesh-native object kind written by the controller.
pub trait Managed:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + fmt::Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    type Spec: PartialEq;

    fn spec(&self) -> &Self::Spec;

    /// Returns true if `live` must be rewritten to match `self`.
    fn differs_from(&self, live: &Self) -> bool {
        if self.spec() != live.spec() {
            return true;
        }
        let live_labels = live.labels();
        self.labels()
            .iter()
            .any(|(k, v)| live_labels.get(k) != Some(v))
    }
}

/// Returns true if the object carries the controller's ownership label.
pub(crate) fn is_managed<K: ResourceExt>(obj: &K) -> bool {
    obj.labels().get(MANAGED_BY_LABEL).map(String::as_str) == Some(MANAGED_BY_VALUE)
}

pub(crate) fn managed_selector() -> String {
    format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}")
}

impl Managed for VirtualService {
    type Spec = VirtualServiceSpec;

    fn spec(&self) -> &Self::Spec {
        &self.spec
    }
}

impl Managed for DestinationRule {
    type Spec = DestinationRuleSpec;

    fn spec(&self) -> &Self::Spec {
        &self.spec
    }
}

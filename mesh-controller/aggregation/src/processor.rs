use crate::{collector, validation, InMemoryStatusMutator};
use meshhub_controller_core::{Discovery, Registry, ResourceId};
use meshhub_controller_k8s_api::{
    networking::{ConflictError, TranslatorError},
    MeshService, ResourceExt, Time, TrafficPolicy, ValidatedTrafficPolicy,
};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
};

/// Computes, for one sync cycle, the policies in force on every service and
/// the errors recorded on every policy.
#[derive(Debug)]
pub struct AggregationProcessor<D> {
    discovery: D,
    registry: Registry,
    mutator: InMemoryStatusMutator,
}

#[derive(Clone, Debug, Default)]
pub struct ProcessOutput {
    /// Services whose validated policies changed.
    pub mesh_services: Vec<MeshService>,

    /// Policies whose status changed.
    pub traffic_policies: Vec<TrafficPolicy>,

    /// Every discovered service, carrying its newly computed status.
    pub services: Vec<MeshService>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to read discovered topology: {0}")]
    Discovery(#[source] anyhow::Error),

    #[error("mesh service {service} references unknown mesh {mesh}")]
    DanglingMesh { service: ResourceId, mesh: ResourceId },
}

// === impl AggregationProcessor ===

impl<D: Discovery> AggregationProcessor<D> {
    pub fn new(discovery: D, registry: Registry) -> Self {
        Self {
            discovery,
            registry,
            mutator: InMemoryStatusMutator::default(),
        }
    }

    /// Runs collection over every discovered service.
    ///
    /// Fails only when the discovered topology is unavailable or
    /// inconsistent; problems with individual policies are recorded on their
    /// status instead.
    pub fn process(&self, policies: &[TrafficPolicy]) -> Result<ProcessOutput, ProcessError> {
        let mut services = self
            .discovery
            .mesh_services()
            .map_err(ProcessError::Discovery)?;
        services.sort_by_cached_key(ResourceId::of);

        let mut policies = policies.to_vec();
        policies.sort_by(timestamp_then_name);

        let validation_errors = policies
            .iter()
            .map(|p| (ResourceId::of(p), validation::validate(&p.spec)))
            .collect::<BTreeMap<_, _>>();
        let candidates = policies
            .iter()
            .filter(|p| {
                validation_errors
                    .get(&ResourceId::of(*p))
                    .map_or(true, Vec::is_empty)
            })
            .cloned()
            .collect::<Vec<_>>();

        // Every service is collected before any status is mutated so that a
        // failure leaves all inputs untouched.
        let mut conflict_errors = BTreeMap::<ResourceId, BTreeSet<ConflictError>>::new();
        let mut translator_errors = BTreeMap::<ResourceId, BTreeSet<TranslatorError>>::new();
        let mut service_policies = Vec::<Option<Vec<ValidatedTrafficPolicy>>>::new();
        for service in &services {
            let service_id = ResourceId::of(service);
            let mesh_id = ResourceId::from_ref(&service.spec.mesh, &service_id.namespace);
            let mesh = self
                .discovery
                .mesh(&mesh_id)
                .map_err(ProcessError::Discovery)?
                .ok_or_else(|| ProcessError::DanglingMesh {
                    service: service_id.clone(),
                    mesh: mesh_id,
                })?;

            let validator = match self.registry.validator(mesh.spec.mesh_type) {
                Ok(validator) => validator,
                Err(error) => {
                    tracing::debug!(service = %service_id, %error, "Skipping service");
                    service_policies.push(None);
                    continue;
                }
            };

            let collected =
                collector::collect(service, &services, &mesh, &**validator, &candidates);
            for (id, errors) in collected.policy_to_conflict_errors {
                conflict_errors.entry(id).or_default().extend(errors);
            }
            for (id, errors) in collected.policy_to_translator_errors {
                translator_errors.entry(id).or_default().extend(errors);
            }
            service_policies.push(Some(collected.policies_to_record));
        }

        let mut mesh_services = Vec::new();
        for (service, policies) in services.iter_mut().zip(service_policies) {
            if let Some(policies) = policies {
                if self.mutator.mutate_service_policies(service, policies) {
                    mesh_services.push(service.clone());
                }
            }
        }

        let mut traffic_policies = Vec::new();
        for mut policy in policies {
            let id = ResourceId::of(&policy);
            let validation = validation_errors.get(&id).cloned().unwrap_or_default();
            let conflicts = conflict_errors.remove(&id).unwrap_or_default();
            let translation = translator_errors.remove(&id).unwrap_or_default();

            let validation_changed = self
                .mutator
                .mutate_validation_errors(&mut policy, validation);
            let errors_changed = self.mutator.mutate_conflict_and_translator_errors(
                &mut policy,
                conflicts.into_iter().collect(),
                translation.into_iter().collect(),
            );
            if validation_changed || errors_changed {
                traffic_policies.push(policy);
            }
        }

        tracing::debug!(
            services = services.len(),
            changed_services = mesh_services.len(),
            changed_policies = traffic_policies.len(),
            "Processed policies"
        );
        Ok(ProcessOutput {
            mesh_services,
            traffic_policies,
            services,
        })
    }
}

/// Orders policies oldest first, then by namespace and name.
fn timestamp_then_name(left: &TrafficPolicy, right: &TrafficPolicy) -> Ordering {
    let by_ts = match (
        left.metadata.creation_timestamp.as_ref().map(|Time(t)| t),
        right.metadata.creation_timestamp.as_ref().map(|Time(t)| t),
    ) {
        (Some(left_ts), Some(right_ts)) => left_ts.cmp(right_ts),
        (None, None) => Ordering::Equal,
        // Policies with timestamps are preferred over policies without.
        (Some(_), None) => return Ordering::Less,
        (None, Some(_)) => return Ordering::Greater,
    };

    by_ts
        .then_with(|| left.namespace().cmp(&right.namespace()))
        .then_with(|| left.name_any().cmp(&right.name_any()))
}

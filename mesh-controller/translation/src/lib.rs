#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Compiles validated traffic policies into mesh-native configuration.

mod accumulator;
pub mod istio;


pub use self::{
    accumulator::TranslationSnapshotAccumulator,
    istio::{IstioTranslator, IstioValidator},
};
use meshhub_controller_core::{MeshFamily, Registry};
use std::sync::Arc;

/// Builds a registry populated with every supported mesh translator.
pub fn registry() -> Registry {
    Registry::default()
        .with_validator(MeshFamily::Istio, Arc::new(IstioValidator::default()))
        .with_translator(MeshFamily::Istio, Arc::new(IstioTranslator::default()))
}

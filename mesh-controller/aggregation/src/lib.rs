#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Decides which traffic policies are in force on each discovered service.
//!
//! Aggregation is pure: it reads a discovery snapshot and the candidate
//! policies and returns updated objects. Persisting them is left to the
//! caller.

pub mod collector;
mod processor;
pub mod selector;
mod status;
pub mod validation;

#[cfg(test)]
mod tests;

pub use self::{
    collector::CollectedPolicies,
    processor::{AggregationProcessor, ProcessError, ProcessOutput},
    status::InMemoryStatusMutator,
};

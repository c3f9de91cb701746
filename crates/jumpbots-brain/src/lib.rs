//! Traits and baseline implementations for jumpbots decision policies.
//!
//! The core consumes decision-making as an opaque [`PolicyRunner`]; this crate
//! defines the richer [`Policy`] surface an evolutionary search manipulates
//! (mutation, crossover) plus the adapter that erases it down to a runner.

use std::any::Any;
use std::fmt;

use jumpbots_core::{ACTION_COUNT, PolicyRunner, SensorReading};
use rand::RngCore;

mod mlp;

pub use mlp::MlpPolicy;

/// Static identifier of a policy family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolicyKind(&'static str);

impl PolicyKind {
    /// Construct a new kind tag.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The underlying identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Shared interface implemented by evolvable policies.
pub trait Policy: Send + Sync {
    /// Immutable policy identifier (useful for analytics).
    fn kind(&self) -> PolicyKind;

    /// Evaluate action scores given the latest sensor input vector.
    fn decide(&mut self, inputs: &SensorReading) -> [f32; ACTION_COUNT];

    /// Mutate the policy's parameters in place.
    fn mutate(&mut self, rng: &mut dyn RngCore, rate: f32, scale: f32);

    /// Recombine with another policy of the same family, if compatible.
    fn crossover(&self, other: &dyn Policy, rng: &mut dyn RngCore) -> Option<Box<dyn Policy>>;

    /// Downcasting hook for crossover between concrete families.
    fn as_any(&self) -> &(dyn Any + Send + Sync);
}

struct PolicyAdapter<P: Policy>(P);

impl<P: Policy> PolicyRunner for PolicyAdapter<P> {
    fn kind(&self) -> &'static str {
        self.0.kind().as_str()
    }

    fn decide(&mut self, inputs: &SensorReading) -> [f32; ACTION_COUNT] {
        self.0.decide(inputs)
    }
}

/// Erase an evolvable policy down to the runner interface the core consumes.
pub fn into_runner(policy: impl Policy + 'static) -> Box<dyn PolicyRunner> {
    Box::new(PolicyAdapter(policy))
}

//! Dense feedforward policy: sensors → hidden (tanh) → action scores (logistic).

use jumpbots_core::{ACTION_COUNT, INPUT_SIZE, PolicyRunner, SensorReading};
use rand::Rng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::any::Any;

use crate::{Policy, PolicyKind, into_runner};

const HIDDEN_SIZE: usize = 12;

fn gaussian(rng: &mut dyn RngCore) -> f32 {
    const TWO_PI: f32 = std::f32::consts::TAU;
    let u1 = rng.random::<f32>().clamp(f32::MIN_POSITIVE, 1.0);
    let u2 = rng.random::<f32>();
    (-2.0 * u1.ln()).sqrt() * (TWO_PI * u2).cos()
}

fn logistic(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

/// Baseline two-layer perceptron policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MlpPolicy {
    w_ih: [[f32; HIDDEN_SIZE]; INPUT_SIZE],
    b_h: [f32; HIDDEN_SIZE],
    w_ho: [[f32; ACTION_COUNT]; HIDDEN_SIZE],
    b_o: [f32; ACTION_COUNT],
}

impl MlpPolicy {
    /// Trait identifier for this policy family.
    pub const KIND: PolicyKind = PolicyKind::new("mlp.feedforward");

    /// Total number of evolvable parameters.
    pub const PARAM_COUNT: usize =
        INPUT_SIZE * HIDDEN_SIZE + HIDDEN_SIZE + HIDDEN_SIZE * ACTION_COUNT + ACTION_COUNT;

    /// Construct a randomly initialized policy with weights in `[-1, 1]`.
    #[must_use]
    pub fn random(rng: &mut dyn RngCore) -> Self {
        let mut policy = Self {
            w_ih: [[0.0; HIDDEN_SIZE]; INPUT_SIZE],
            b_h: [0.0; HIDDEN_SIZE],
            w_ho: [[0.0; ACTION_COUNT]; HIDDEN_SIZE],
            b_o: [0.0; ACTION_COUNT],
        };
        policy.for_each_param(|param| *param = rng.random_range(-1.0..1.0));
        policy
    }

    /// Return a boxed runner wrapping a randomly initialized policy.
    #[must_use]
    pub fn runner(rng: &mut dyn RngCore) -> Box<dyn PolicyRunner> {
        into_runner(Self::random(rng))
    }

    /// Forward pass over the two dense layers.
    #[must_use]
    pub fn forward(&self, inputs: &SensorReading) -> [f32; ACTION_COUNT] {
        let mut hidden = self.b_h;
        for (input, weights) in inputs.iter().zip(&self.w_ih) {
            for (accumulator, weight) in hidden.iter_mut().zip(weights) {
                *accumulator += input * weight;
            }
        }
        for value in &mut hidden {
            *value = value.tanh();
        }

        let mut scores = self.b_o;
        for (value, weights) in hidden.iter().zip(&self.w_ho) {
            for (accumulator, weight) in scores.iter_mut().zip(weights) {
                *accumulator += value * weight;
            }
        }
        for score in &mut scores {
            *score = logistic(*score);
        }
        scores
    }

    /// Gaussian-perturb each parameter independently with probability `rate`.
    pub fn perturb(&mut self, rng: &mut dyn RngCore, rate: f32, scale: f32) {
        let sigma = scale.max(1e-5);
        self.for_each_param(|param| {
            if rng.random::<f32>() < rate {
                *param += gaussian(rng) * sigma;
            }
        });
    }

    /// Uniform crossover: each hidden and output unit keeps one parent's
    /// incoming weights and bias wholesale.
    #[must_use]
    pub fn recombine(&self, other: &Self, rng: &mut dyn RngCore) -> Self {
        let mut child = self.clone();
        for unit in 0..HIDDEN_SIZE {
            if rng.random::<f32>() < 0.5 {
                continue;
            }
            for row in 0..INPUT_SIZE {
                child.w_ih[row][unit] = other.w_ih[row][unit];
            }
            child.b_h[unit] = other.b_h[unit];
        }
        for unit in 0..ACTION_COUNT {
            if rng.random::<f32>() < 0.5 {
                continue;
            }
            for row in 0..HIDDEN_SIZE {
                child.w_ho[row][unit] = other.w_ho[row][unit];
            }
            child.b_o[unit] = other.b_o[unit];
        }
        child
    }

    fn for_each_param(&mut self, mut visit: impl FnMut(&mut f32)) {
        for row in &mut self.w_ih {
            for weight in row {
                visit(weight);
            }
        }
        for bias in &mut self.b_h {
            visit(bias);
        }
        for row in &mut self.w_ho {
            for weight in row {
                visit(weight);
            }
        }
        for bias in &mut self.b_o {
            visit(bias);
        }
    }
}

impl Policy for MlpPolicy {
    fn kind(&self) -> PolicyKind {
        Self::KIND
    }

    fn decide(&mut self, inputs: &SensorReading) -> [f32; ACTION_COUNT] {
        self.forward(inputs)
    }

    fn mutate(&mut self, rng: &mut dyn RngCore, rate: f32, scale: f32) {
        self.perturb(rng, rate, scale);
    }

    fn crossover(&self, other: &dyn Policy, rng: &mut dyn RngCore) -> Option<Box<dyn Policy>> {
        if other.kind() != Self::KIND {
            return None;
        }
        let other = other.as_any().downcast_ref::<Self>()?;
        Some(Box::new(self.recombine(other, rng)))
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

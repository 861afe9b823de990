// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Predictors consumed by the rollout driver.
//!
//! The engine only needs `input → output` of fixed widths. Three adapters:
//! 1. **FnPredictor**: any thread-safe closure
//! 2. **DensePredictor**: a stack of dense layers fitted offline and stored as JSON
//! 3. **Serialized**: wraps a `&mut self` predictor behind a mutex so parallel
//!    paths take turns calling it

use std::path::Path;

use anyhow::{bail, ensure, Context};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Pure function from a fixed-width input vector to a fixed-width output.
pub trait Predictor: Send + Sync {
    fn predict(&self, input: &[f32]) -> anyhow::Result<Vec<f32>>;

    /// Name of this predictor.
    fn name(&self) -> &str;
}

impl<P: Predictor + ?Sized> Predictor for &P {
    fn predict(&self, input: &[f32]) -> anyhow::Result<Vec<f32>> {
        (**self).predict(input)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<P: Predictor + ?Sized> Predictor for Box<P> {
    fn predict(&self, input: &[f32]) -> anyhow::Result<Vec<f32>> {
        (**self).predict(input)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ─── Closure Predictor ──────────────────────────────

pub struct FnPredictor<F> {
    f: F,
}

impl<F> FnPredictor<F>
where
    F: Fn(&[f32]) -> Vec<f32> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Predictor for FnPredictor<F>
where
    F: Fn(&[f32]) -> Vec<f32> + Send + Sync,
{
    fn predict(&self, input: &[f32]) -> anyhow::Result<Vec<f32>> {
        Ok((self.f)(input))
    }

    fn name(&self) -> &str {
        "fn"
    }
}

// ─── Dense Predictor ────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Tanh,
    Sigmoid,
    Relu,
}

impl Activation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Self::Linear => x,
            Self::Tanh => x.tanh(),
            Self::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Self::Relu => x.max(0.0),
        }
    }
}

/// `output = activation(W · input + bias)`
///
/// `W` has shape `(output_dim, input_dim)`, stored row-major:
/// `weights[i * input_dim + j]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
    pub input_dim: usize,
    pub output_dim: usize,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    pub fn new(
        weights: Vec<f32>,
        bias: Vec<f32>,
        input_dim: usize,
        output_dim: usize,
        activation: Activation,
    ) -> anyhow::Result<Self> {
        let layer = Self {
            weights,
            bias,
            input_dim,
            output_dim,
            activation,
        };
        layer.check()?;
        Ok(layer)
    }

    /// Square identity layer with linear activation.
    pub fn identity(dim: usize) -> Self {
        let mut weights = vec![0.0; dim * dim];
        for i in 0..dim {
            weights[i * dim + i] = 1.0;
        }
        Self {
            weights,
            bias: vec![0.0; dim],
            input_dim: dim,
            output_dim: dim,
            activation: Activation::Linear,
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        let Some(expected) = self.input_dim.checked_mul(self.output_dim) else {
            bail!(
                "Weight matrix shape {}×{} overflows",
                self.output_dim,
                self.input_dim
            );
        };
        ensure!(
            self.weights.len() == expected,
            "Weight matrix size mismatch: expected {}×{} = {}, got {}",
            self.output_dim,
            self.input_dim,
            expected,
            self.weights.len()
        );
        ensure!(
            self.bias.len() == self.output_dim,
            "Bias size mismatch: expected {}, got {}",
            self.output_dim,
            self.bias.len()
        );
        Ok(())
    }

    pub fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut output = self.bias.clone();
        for (i, out) in output.iter_mut().enumerate() {
            let row = &self.weights[i * self.input_dim..(i + 1) * self.input_dim];
            let dot: f32 = row.iter().zip(input).map(|(w, x)| w * x).sum();
            *out = self.activation.apply(*out + dot);
        }
        output
    }
}

/// Feed-forward network of dense layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensePredictor {
    layers: Vec<DenseLayer>,
}

impl DensePredictor {
    /// Fails if a layer is malformed or consecutive widths disagree.
    pub fn new(layers: Vec<DenseLayer>) -> anyhow::Result<Self> {
        if layers.is_empty() {
            bail!("Dense predictor needs at least one layer");
        }
        for (i, layer) in layers.iter().enumerate() {
            layer.check().with_context(|| format!("layer {i}"))?;
        }
        for (i, pair) in layers.windows(2).enumerate() {
            ensure!(
                pair[0].output_dim == pair[1].input_dim,
                "layer {} outputs {} values but layer {} expects {}",
                i,
                pair[0].output_dim,
                i + 1,
                pair[1].input_dim
            );
        }
        Ok(Self { layers })
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let raw: DensePredictor =
            serde_json::from_str(text).context("Failed to parse predictor weights")?;
        Self::new(raw.layers)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read predictor weights {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn input_dim(&self) -> usize {
        self.layers[0].input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].output_dim
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }
}

impl Predictor for DensePredictor {
    fn predict(&self, input: &[f32]) -> anyhow::Result<Vec<f32>> {
        ensure!(
            input.len() == self.input_dim(),
            "Input size mismatch: expected {}, got {}",
            self.input_dim(),
            input.len()
        );
        let mut x = input.to_vec();
        for layer in &self.layers {
            x = layer.forward(&x);
        }
        Ok(x)
    }

    fn name(&self) -> &str {
        "dense"
    }
}

// ─── Serialized Access ──────────────────────────────

/// A predictor that needs exclusive access while it runs.
pub trait StatefulPredictor: Send {
    fn predict_mut(&mut self, input: &[f32]) -> anyhow::Result<Vec<f32>>;
}

/// Makes a [`StatefulPredictor`] shareable by locking around each call.
pub struct Serialized<P> {
    inner: Mutex<P>,
}

impl<P: StatefulPredictor> Serialized<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn into_inner(self) -> P {
        self.inner.into_inner()
    }
}

impl<P: StatefulPredictor> Predictor for Serialized<P> {
    fn predict(&self, input: &[f32]) -> anyhow::Result<Vec<f32>> {
        self.inner.lock().predict_mut(input)
    }

    fn name(&self) -> &str {
        "serialized"
    }
}

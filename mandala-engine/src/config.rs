// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Runtime configuration for an evaluation pass.
//!
//! Defines the tier geometry, decode parameters, rollout modes and output
//! destination. Data-independent invariants are checked by
//! [`EvalConfig::validate`]; the ones that depend on vector widths by
//! [`EvalConfig::layout_for`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::codec::TierLayout;
use crate::error::{EngineError, Result};

/// How a phase builds each step's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutMode {
    /// Inputs are used exactly as stored.
    TeacherForced,
    /// Context region is rebuilt from the previous step's prediction.
    Autoregressive,
}

/// Full configuration of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Width of the sense tier and of every context tier
    pub n_dimensions: usize,
    /// Top-k picks per tier
    pub n_features: usize,
    /// Activation threshold shared by decode, gate and carry-over
    pub threshold: f32,
    /// Reference sign pattern of the prediction header (empty = no header)
    pub validity_header: Vec<f32>,
    /// Keep carrying predictions across interstitial steps
    pub allow_interstitial_contexts: bool,
    pub train_mode: RolloutMode,
    pub test_mode: RolloutMode,
    /// Roll out independent paths on the rayon pool
    pub parallel: bool,
    /// Collect per-step trace records
    pub verbose: bool,
    pub results_filename: PathBuf,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            n_dimensions: 64,
            n_features: 3,
            threshold: 0.5,
            validity_header: Vec::new(),
            allow_interstitial_contexts: false,
            train_mode: RolloutMode::TeacherForced,
            test_mode: RolloutMode::Autoregressive,
            parallel: false,
            verbose: true,
            results_filename: PathBuf::from("mandala_nn_results.json"),
        }
    }
}

impl EvalConfig {
    pub fn new(n_dimensions: usize, n_features: usize, threshold: f32) -> Self {
        Self {
            n_dimensions,
            n_features,
            threshold,
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_validity_header(mut self, reference: Vec<f32>) -> Self {
        self.validity_header = reference;
        self
    }

    pub fn with_allow_interstitial_contexts(mut self, allow: bool) -> Self {
        self.allow_interstitial_contexts = allow;
        self
    }

    pub fn with_modes(mut self, train: RolloutMode, test: RolloutMode) -> Self {
        self.train_mode = train;
        self.test_mode = test;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_results_filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_filename = path.into();
        self
    }

    pub fn header_len(&self) -> usize {
        self.validity_header.len()
    }

    /// Check every invariant that does not depend on the dataset.
    pub fn validate(&self) -> Result<()> {
        if self.n_dimensions == 0 {
            return Err(EngineError::InvalidDimensions(self.n_dimensions));
        }
        if self.n_features == 0 || self.n_features > self.n_dimensions {
            return Err(EngineError::InvalidFeatureCount {
                n_features: self.n_features,
                n_dimensions: self.n_dimensions,
            });
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(EngineError::InvalidThreshold(self.threshold));
        }
        if let Some((index, &value)) = self
            .validity_header
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite())
        {
            return Err(EngineError::InvalidValidityHeader { index, value });
        }
        Ok(())
    }

    /// Tier layout for a phase with the given input and target widths.
    ///
    /// Requires `n_dimensions <= input_dim` and `header + input_dim <= target_dim`
    /// so each input context slot has a prediction slot to read from.
    pub fn layout_for(&self, input_dim: usize, target_dim: usize) -> Result<TierLayout> {
        let layout = TierLayout::new(target_dim, self.header_len(), self.n_dimensions)?;
        if input_dim < self.n_dimensions || self.header_len() + input_dim > target_dim {
            return Err(EngineError::InputWidth {
                input: input_dim,
                n_dimensions: self.n_dimensions,
                target: target_dim,
                header: self.header_len(),
            });
        }
        Ok(layout)
    }
}

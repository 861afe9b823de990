// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Typed errors for configuration, dataset and rollout failures.
//!
//! Two classes are fatal: configuration errors (caught before any rollout)
//! and shape/contract violations (caught mid-pass). Scoring mismatches are
//! not errors; see [`crate::score::Outcome`].

use std::path::PathBuf;

use thiserror::Error;

use crate::dataset::Phase;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid dimensions: n_dimensions must be positive, got {0}")]
    InvalidDimensions(usize),

    #[error("invalid feature count: n_features must be in 1..={n_dimensions}, got {n_features}")]
    InvalidFeatureCount {
        n_features: usize,
        n_dimensions: usize,
    },

    #[error("invalid threshold: must be finite and non-negative, got {0}")]
    InvalidThreshold(f32),

    #[error("invalid validity header: slot {index} must be finite, got {value}")]
    InvalidValidityHeader { index: usize, value: f32 },

    #[error("empty {phase} dataset")]
    EmptyDataset { phase: Phase },

    #[error(
        "tier layout: vector length {total} minus header {header} is not a positive multiple of n_dimensions {n_dimensions}"
    )]
    TierLayout {
        total: usize,
        header: usize,
        n_dimensions: usize,
    },

    #[error(
        "input width {input} must be at least n_dimensions {n_dimensions} and at most target width {target} minus header {header}"
    )]
    InputWidth {
        input: usize,
        n_dimensions: usize,
        target: usize,
        header: usize,
    },

    #[error("shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("index out of range in {what}: {index} >= {len}")]
    IndexOutOfRange {
        what: String,
        index: usize,
        len: usize,
    },

    #[error("predictor failed in {phase} phase at step {step}: {message}")]
    Predictor {
        phase: Phase,
        step: usize,
        message: String,
    },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// True for errors detected before any rollout starts.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidDimensions(_)
                | Self::InvalidFeatureCount { .. }
                | Self::InvalidThreshold(_)
                | Self::InvalidValidityHeader { .. }
                | Self::EmptyDataset { .. }
                | Self::TierLayout { .. }
                | Self::InputWidth { .. }
        )
    }

    pub(crate) fn shape(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }
}

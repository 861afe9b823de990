// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Feature tier codec: continuous vectors ↔ discrete active-feature sets.
//!
//! A target or prediction vector of length `D` is laid out as
//!
//! ```text
//! [ header (H) | sense (n) | ctx0 (n) | ctx1 (n) | ... ]
//! ```
//!
//! Each tier is decoded independently with an iterative extremum search:
//! `k` picks, each taking the strongest unconsumed slot under a polarity
//! and recording it only if it crosses the threshold.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

// ─── Polarity ───────────────────────────────────────

/// Direction of evidence a pick looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    /// Largest value, accepted when `v >= threshold`.
    Max,
    /// Smallest value, accepted when `v <= -threshold`.
    Min,
}

impl Polarity {
    /// Whether `value` crosses `threshold` in this direction.
    pub fn passes(self, value: f32, threshold: f32) -> bool {
        match self {
            Self::Max => value >= threshold,
            Self::Min => value <= -threshold,
        }
    }

    /// Strictly more extreme; ties keep the earlier slot.
    fn beats(self, value: f32, best: f32) -> bool {
        match self {
            Self::Max => value > best,
            Self::Min => value < best,
        }
    }
}

// ─── Feature Sets ───────────────────────────────────

/// One active slot within a tier.
///
/// Ordered by index first, so a sorted set reads in slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Feature {
    pub index: usize,
    pub polarity: Polarity,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.polarity {
            Polarity::Max => write!(f, "{}", self.index),
            Polarity::Min => write!(f, "-{}", self.index),
        }
    }
}

/// A tier-local feature tagged with the tier it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActiveFeature {
    pub tier: usize,
    pub index: usize,
    pub polarity: Polarity,
}

/// Canonical (sorted, deduplicated) set of active features of one tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_features(features: impl IntoIterator<Item = Feature>) -> Self {
        let mut features: Vec<Feature> = features.into_iter().collect();
        features.sort_unstable();
        features.dedup();
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Slot indices in ascending order, polarity dropped.
    pub fn indices(&self) -> Vec<usize> {
        self.features.iter().map(|f| f.index).collect()
    }

    pub fn contains(&self, index: usize, polarity: Polarity) -> bool {
        self.features
            .binary_search(&Feature { index, polarity })
            .is_ok()
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, feature) in self.features.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{feature}")?;
        }
        write!(f, "]")
    }
}

// ─── Top-k Decode ───────────────────────────────────

/// Decode one tier slice into its top-`k` active features.
///
/// Makes `min(k, slice.len())` picks. Each pick takes the most extreme
/// unconsumed slot under `polarity` (lowest index on ties, NaN never
/// selected) and consumes it; the slot is recorded only if it passes the
/// threshold. The input slice is never modified.
///
/// Consumed slots are masked, not overwritten with zero. The two only
/// differ at threshold 0: a zeroed slot would pass and be picked again,
/// while a masked one never is, so `[-1, -2, -3]` under `max` at
/// threshold 0 decodes to the empty set instead of `{0}`.
pub fn decode_tier(slice: &[f32], k: usize, polarity: Polarity, threshold: f32) -> FeatureSet {
    let mut consumed = vec![false; slice.len()];
    let mut features = Vec::with_capacity(k.min(slice.len()));

    for _ in 0..k.min(slice.len()) {
        let Some(idx) = extreme_index(slice, &consumed, polarity) else {
            break;
        };
        consumed[idx] = true;
        if polarity.passes(slice[idx], threshold) {
            features.push(Feature {
                index: idx,
                polarity,
            });
        }
    }

    FeatureSet::from_features(features)
}

fn extreme_index(slice: &[f32], consumed: &[bool], polarity: Polarity) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in slice.iter().enumerate() {
        if consumed[i] || v.is_nan() {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, b)) => polarity.beats(v, b),
        };
        if better {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

// ─── Tier Layout ────────────────────────────────────

/// Partition of a target/prediction vector into header, sense and context tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLayout {
    header_len: usize,
    n_dimensions: usize,
    n_contexts: usize,
}

impl TierLayout {
    /// Derive the layout for vectors of length `total`.
    ///
    /// Requires `(total - header_len)` to be a positive multiple of
    /// `n_dimensions`; the quotient minus one is the context tier count.
    pub fn new(total: usize, header_len: usize, n_dimensions: usize) -> Result<Self> {
        if n_dimensions == 0 {
            return Err(EngineError::InvalidDimensions(n_dimensions));
        }
        let layout_err = || EngineError::TierLayout {
            total,
            header: header_len,
            n_dimensions,
        };
        let body = total.checked_sub(header_len).ok_or_else(layout_err)?;
        if body == 0 || body % n_dimensions != 0 {
            return Err(layout_err());
        }
        Ok(Self {
            header_len,
            n_dimensions,
            n_contexts: body / n_dimensions - 1,
        })
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn n_dimensions(&self) -> usize {
        self.n_dimensions
    }

    pub fn n_contexts(&self) -> usize {
        self.n_contexts
    }

    /// Sense tier plus context tiers.
    pub fn num_tiers(&self) -> usize {
        1 + self.n_contexts
    }

    pub fn total_len(&self) -> usize {
        self.header_len + self.num_tiers() * self.n_dimensions
    }

    pub fn header<'v>(&self, v: &'v [f32]) -> &'v [f32] {
        &v[..self.header_len]
    }

    /// Everything after the header.
    pub fn body<'v>(&self, v: &'v [f32]) -> &'v [f32] {
        &v[self.header_len..]
    }

    /// Tier 0 is sense, tier `c + 1` is context `c`.
    pub fn tier<'v>(&self, v: &'v [f32], tier: usize) -> &'v [f32] {
        let start = self.header_len + tier * self.n_dimensions;
        &v[start..start + self.n_dimensions]
    }

    pub fn sense<'v>(&self, v: &'v [f32]) -> &'v [f32] {
        self.tier(v, 0)
    }
}

// ─── Summaries ──────────────────────────────────────

/// Every slot crossing `±threshold`, grouped per tier of width `n_dimensions`.
///
/// Unlike [`decode_tier`] this is not top-k; it is meant for traces. A
/// trailing partial chunk forms its own tier.
pub fn summarize(vector: &[f32], n_dimensions: usize, threshold: f32) -> Summary {
    if n_dimensions == 0 {
        return Summary::default();
    }
    let tiers = vector
        .chunks(n_dimensions)
        .map(|chunk| {
            let mut features = Vec::new();
            for (index, &v) in chunk.iter().enumerate() {
                if Polarity::Max.passes(v, threshold) {
                    features.push(Feature {
                        index,
                        polarity: Polarity::Max,
                    });
                }
                if Polarity::Min.passes(v, threshold) {
                    features.push(Feature {
                        index,
                        polarity: Polarity::Min,
                    });
                }
            }
            FeatureSet::from_features(features)
        })
        .collect();
    Summary { tiers }
}

/// Per-tier active features of a whole vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub tiers: Vec<FeatureSet>,
}

impl Summary {
    pub fn active_features(&self) -> impl Iterator<Item = ActiveFeature> + '_ {
        self.tiers.iter().enumerate().flat_map(|(tier, set)| {
            set.iter().map(move |f| ActiveFeature {
                tier,
                index: f.index,
                polarity: f.polarity,
            })
        })
    }
}

/// `[sense=[..], ctx0=[..], ...]`, stopping at the last non-empty tier.
impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self
            .tiers
            .iter()
            .rposition(|t| !t.is_empty())
            .map_or(0, |last| last + 1);
        write!(f, "[")?;
        for (tier, set) in self.tiers[..shown].iter().enumerate() {
            if tier == 0 {
                write!(f, "sense={set}")?;
            } else {
                write!(f, ", ctx{}={set}", tier - 1)?;
            }
        }
        write!(f, "]")
    }
}

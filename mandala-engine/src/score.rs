// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Per-step feature matching and train/test error counters.
//!
//! A scored step passes through, in order, stopping at the first failure:
//! 1. the validity header
//! 2. the sense tier (max polarity)
//! 3. each context tier (max polarity, then min polarity)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{decode_tier, Polarity, TierLayout};
use crate::dataset::Phase;

// ─── Outcome ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Ok,
    /// Header failed the validity gate; tiers were not decoded.
    Invalid,
    Tier0Mismatch,
    /// First context tier (0-based) whose max or min set differed.
    ContextMismatch { context: usize },
}

impl Outcome {
    pub fn is_error(self) -> bool {
        !matches!(self, Self::Ok)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Invalid => write!(f, "invalid"),
            Self::Tier0Mismatch | Self::ContextMismatch { .. } => write!(f, "error"),
        }
    }
}

// ─── Counters ───────────────────────────────────────

/// Errors and totals of one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounters {
    pub errors: u64,
    pub total: u64,
}

impl PhaseCounters {
    pub fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        if outcome.is_error() {
            self.errors += 1;
        }
    }

    pub fn merge(&mut self, other: PhaseCounters) {
        self.errors += other.errors;
        self.total += other.total;
    }

    /// `100 * errors / total`, or 0 for an empty phase.
    pub fn error_pct(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.errors as f64 / self.total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCounters {
    pub train: PhaseCounters,
    pub test: PhaseCounters,
}

impl ScoreCounters {
    pub fn phase(&self, phase: Phase) -> &PhaseCounters {
        match phase {
            Phase::Train => &self.train,
            Phase::Test => &self.test,
        }
    }

    pub fn phase_mut(&mut self, phase: Phase) -> &mut PhaseCounters {
        match phase {
            Phase::Train => &mut self.train,
            Phase::Test => &mut self.test,
        }
    }

    pub fn merge(&mut self, other: &ScoreCounters) {
        self.train.merge(other.train);
        self.test.merge(other.test);
    }
}

// ─── Scorer ─────────────────────────────────────────

/// Stateless comparison of a target against a prediction.
#[derive(Debug, Clone, Copy)]
pub struct StepScorer {
    layout: TierLayout,
    n_features: usize,
    threshold: f32,
}

impl StepScorer {
    pub fn new(layout: TierLayout, n_features: usize, threshold: f32) -> Self {
        Self {
            layout,
            n_features,
            threshold,
        }
    }

    pub fn layout(&self) -> &TierLayout {
        &self.layout
    }

    /// Both vectors must have length `layout.total_len()`.
    pub fn classify(&self, target: &[f32], prediction: &[f32], header_valid: bool) -> Outcome {
        if !header_valid {
            return Outcome::Invalid;
        }
        if !self.tier_matches(target, prediction, 0, Polarity::Max) {
            return Outcome::Tier0Mismatch;
        }
        for context in 0..self.layout.n_contexts() {
            let tier = context + 1;
            if !self.tier_matches(target, prediction, tier, Polarity::Max)
                || !self.tier_matches(target, prediction, tier, Polarity::Min)
            {
                return Outcome::ContextMismatch { context };
            }
        }
        Outcome::Ok
    }

    fn tier_matches(&self, target: &[f32], prediction: &[f32], tier: usize, polarity: Polarity) -> bool {
        let t = decode_tier(self.layout.tier(target, tier), self.n_features, polarity, self.threshold);
        let p = decode_tier(
            self.layout.tier(prediction, tier),
            self.n_features,
            polarity,
            self.threshold,
        );
        t == p
    }
}

/// Scorer plus running train/test counters.
#[derive(Debug, Clone)]
pub struct ScoreAccumulator {
    scorer: StepScorer,
    counters: ScoreCounters,
}

impl ScoreAccumulator {
    pub fn new(scorer: StepScorer) -> Self {
        Self {
            scorer,
            counters: ScoreCounters::default(),
        }
    }

    /// Classify one step and count it exactly once.
    pub fn score_step(
        &mut self,
        phase: Phase,
        target: &[f32],
        prediction: &[f32],
        header_valid: bool,
    ) -> Outcome {
        let outcome = self.scorer.classify(target, prediction, header_valid);
        self.counters.phase_mut(phase).record(outcome);
        outcome
    }

    pub fn counters(&self) -> &ScoreCounters {
        &self.counters
    }

    pub fn merge(&mut self, other: &ScoreCounters) {
        self.counters.merge(other);
    }

    pub fn into_counters(self) -> ScoreCounters {
        self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer(total: usize, header: usize) -> StepScorer {
        StepScorer::new(TierLayout::new(total, header, 4).unwrap(), 1, 0.5)
    }

    // ─── classify ───

    #[test]
    fn test_scorer_keeps_layout() {
        let s = scorer(10, 2);
        assert_eq!(s.layout().header_len(), 2);
        assert_eq!(s.layout().n_contexts(), 1);
        assert_eq!(s.layout().total_len(), 10);
    }

    #[test]
    fn test_sense_match_is_ok() {
        let s = scorer(4, 0);
        assert_eq!(s.classify(&[0.9, 0.0, 0.0, 0.0], &[0.8, 0.0, 0.0, 0.0], true), Outcome::Ok);
    }

    #[test]
    fn test_sense_mismatch() {
        let s = scorer(4, 0);
        let outcome = s.classify(&[0.9, 0.0, 0.0, 0.0], &[0.2, 0.9, 0.0, 0.0], true);
        assert_eq!(outcome, Outcome::Tier0Mismatch);
        assert!(outcome.is_error());
        assert_eq!(outcome.to_string(), "error");
    }

    #[test]
    fn test_sense_mismatch_skips_contexts() {
        // Context tier also differs; the sense tier is reported first.
        let s = scorer(8, 0);
        let target = [0.9, 0.0, 0.0, 0.0, 0.9, 0.0, 0.0, 0.0];
        let pred = [0.0, 0.9, 0.0, 0.0, 0.0, 0.0, 0.9, 0.0];
        assert_eq!(s.classify(&target, &pred, true), Outcome::Tier0Mismatch);
    }

    #[test]
    fn test_invalid_header_wins() {
        let s = scorer(6, 2);
        let v = [0.9, -0.9, 0.9, 0.0, 0.0, 0.0];
        assert_eq!(s.classify(&v, &v, false), Outcome::Invalid);
        assert_eq!(Outcome::Invalid.to_string(), "invalid");
    }

    #[test]
    fn test_header_is_not_decoded_as_sense() {
        let s = scorer(6, 2);
        let target = [0.0, 0.0, 0.9, 0.0, 0.0, 0.0];
        let pred = [0.99, 0.99, 0.9, 0.0, 0.0, 0.0];
        assert_eq!(s.classify(&target, &pred, true), Outcome::Ok);
    }

    #[test]
    fn test_context_max_mismatch() {
        let s = scorer(12, 0);
        let target = [0.9, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.9, 0.0, 0.0];
        let pred = [0.9, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.9, 0.0];
        assert_eq!(
            s.classify(&target, &pred, true),
            Outcome::ContextMismatch { context: 1 }
        );
    }

    #[test]
    fn test_context_min_mismatch() {
        let s = scorer(8, 0);
        let target = [0.9, 0.0, 0.0, 0.0, -0.9, 0.0, 0.0, 0.0];
        let pred = [0.9, 0.0, 0.0, 0.0, 0.0, -0.9, 0.0, 0.0];
        assert_eq!(
            s.classify(&target, &pred, true),
            Outcome::ContextMismatch { context: 0 }
        );
    }

    #[test]
    fn test_sense_min_is_ignored() {
        // Only max polarity is compared on the sense tier.
        let s = scorer(4, 0);
        assert_eq!(s.classify(&[0.9, -0.9, 0.0, 0.0], &[0.9, 0.0, 0.0, 0.0], true), Outcome::Ok);
    }

    // ─── Accumulator ───

    #[test]
    fn test_accumulator_counts_each_step_once() {
        let mut acc = ScoreAccumulator::new(scorer(4, 0));
        let t = [0.9, 0.0, 0.0, 0.0];
        acc.score_step(Phase::Train, &t, &t, true);
        acc.score_step(Phase::Train, &t, &[0.0, 0.9, 0.0, 0.0], true);
        acc.score_step(Phase::Test, &t, &t, false);

        let c = acc.counters();
        assert_eq!(c.train, PhaseCounters { errors: 1, total: 2 });
        assert_eq!(c.test, PhaseCounters { errors: 1, total: 1 });
        assert!((c.train.error_pct() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_phase_pct_is_zero() {
        let c = PhaseCounters::default();
        assert_eq!(c.total, 0);
        assert_eq!(c.error_pct(), 0.0);
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = ScoreCounters {
            train: PhaseCounters { errors: 1, total: 4 },
            test: PhaseCounters { errors: 2, total: 3 },
        };
        let b = ScoreCounters {
            train: PhaseCounters { errors: 0, total: 5 },
            test: PhaseCounters { errors: 1, total: 1 },
        };
        let mut ab = a;
        ab.merge(&b);
        let mut ba = b;
        ba.merge(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.phase(Phase::Test).total, 4);
    }
}

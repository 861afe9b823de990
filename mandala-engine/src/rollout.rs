// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Rollout driver: walks a path, feeding each prediction into the next input.
//!
//! ```text
//!            ┌──────────── carry (if valid) ────────────┐
//!            ▼                                          │
//! step i: context ◄─ copy ─ input[i-1]        output[i-1]
//!            │
//!            ▼
//!        predictor ──► output[i] ──► gate ──► valid ──► score (predictable)
//! ```
//!
//! Inputs are `[sense (n) | context (D_in - n)]`. At a path begin the
//! context is zeroed and the validity state cleared. Otherwise the context
//! is copied from the previous finalized input and, if the previous
//! prediction passed the gate, each slot is snapped to `1.0`/`0.0` where the
//! matching prediction slot crosses `±threshold`.

use std::fmt;

use tracing::debug;

use crate::codec::{summarize, Summary, TierLayout};
use crate::config::{EvalConfig, RolloutMode};
use crate::dataset::{Path, Phase, Step};
use crate::error::{EngineError, Result};
use crate::gate::ValidityGate;
use crate::predictor::Predictor;
use crate::score::{Outcome, ScoreAccumulator};

// ─── Trace Records ──────────────────────────────────

/// What happened to a step after prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepTag {
    Scored(Outcome),
    /// Never scored; breaks the chain unless interstitial contexts are allowed.
    Interstitial,
    /// Rolled out but has no ground truth.
    Unscored,
}

impl fmt::Display for StepTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scored(outcome) => write!(f, "{outcome}"),
            Self::Interstitial => write!(f, "interstitial"),
            Self::Unscored => write!(f, "unscored"),
        }
    }
}

/// One human-readable line of the rollout trace.
#[derive(Debug, Clone, PartialEq)]
pub struct StepTrace {
    pub phase: Phase,
    pub path: usize,
    /// Position within the path.
    pub step: usize,
    /// Global step index within the phase.
    pub index: usize,
    pub input: Summary,
    pub target: Summary,
    pub prediction: Summary,
    pub tag: StepTag,
}

impl fmt::Display for StepTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: path = {}, step = {}, X: {}, y: {}, predictions: {}",
            self.phase.label(),
            self.path,
            self.step,
            self.input,
            self.target,
            self.prediction
        )?;
        match self.tag {
            StepTag::Unscored => Ok(()),
            tag => write!(f, ", {tag}"),
        }
    }
}

// ─── Driver ─────────────────────────────────────────

/// Deterministic fold over the steps of one path at a time.
pub struct RolloutDriver<'a, P: ?Sized> {
    phase: Phase,
    mode: RolloutMode,
    layout: TierLayout,
    threshold: f32,
    allow_interstitial_contexts: bool,
    gate: ValidityGate,
    trace: bool,
    predictor: &'a P,
}

impl<'a, P: Predictor + ?Sized> RolloutDriver<'a, P> {
    /// `layout` must come from [`EvalConfig::layout_for`] on this phase's widths.
    pub fn new(config: &EvalConfig, phase: Phase, layout: TierLayout, predictor: &'a P) -> Self {
        let mode = match phase {
            Phase::Train => config.train_mode,
            Phase::Test => config.test_mode,
        };
        Self {
            phase,
            mode,
            layout,
            threshold: config.threshold,
            allow_interstitial_contexts: config.allow_interstitial_contexts,
            gate: ValidityGate::new(config.validity_header.clone(), config.threshold),
            trace: config.verbose,
            predictor,
        }
    }

    pub fn mode(&self) -> RolloutMode {
        self.mode
    }

    /// Roll out one path, scoring into `acc`.
    ///
    /// Any predictor failure or wrong-length output aborts the path.
    pub fn run_path(&self, path: &Path, acc: &mut ScoreAccumulator) -> Result<Vec<StepTrace>> {
        let mut traces = Vec::new();
        let mut prev: Option<(Vec<f32>, Vec<f32>)> = None;
        let mut valid = false;

        for (pos, step) in path.steps().iter().enumerate() {
            let input = match (self.mode, prev.as_ref()) {
                (RolloutMode::TeacherForced, _) => step.input.clone(),
                (RolloutMode::Autoregressive, None) => self.reset_context(&step.input),
                (RolloutMode::Autoregressive, Some((prev_input, prev_output))) => {
                    let carried = valid.then_some(prev_output.as_slice());
                    self.carry_context(&step.input, prev_input, carried)
                }
            };

            let output = self.predict(step, &input)?;
            let header_valid = self.gate.is_valid(self.layout.header(&output));
            valid = header_valid;

            let tag = if step.interstitial {
                if !self.allow_interstitial_contexts {
                    valid = false;
                }
                StepTag::Interstitial
            } else if step.predictable {
                StepTag::Scored(acc.score_step(self.phase, &step.target, &output, header_valid))
            } else {
                StepTag::Unscored
            };

            debug!(
                phase = %self.phase,
                path = path.index(),
                step = pos,
                index = step.index,
                outcome = %tag,
                "rollout step"
            );

            if self.trace {
                traces.push(self.trace_step(path, pos, step, &input, &output, tag));
            }
            prev = Some((input, output));
        }

        Ok(traces)
    }

    fn predict(&self, step: &Step, input: &[f32]) -> Result<Vec<f32>> {
        let output = self
            .predictor
            .predict(input)
            .map_err(|e| EngineError::Predictor {
                phase: self.phase,
                step: step.index,
                message: format!("{e:#}"),
            })?;
        if output.len() != self.layout.total_len() {
            return Err(EngineError::shape(
                format!("{} predictor output at step {}", self.phase, step.index),
                self.layout.total_len(),
                output.len(),
            ));
        }
        Ok(output)
    }

    /// Path begin: context region forced to zero.
    pub fn reset_context(&self, input: &[f32]) -> Vec<f32> {
        let mut next = input.to_vec();
        next[self.layout.n_dimensions()..].fill(0.0);
        next
    }

    /// Mid-path: copy the previous context, then snap slots the previous
    /// prediction is confident about.
    pub fn carry_context(&self, input: &[f32], prev_input: &[f32], prediction: Option<&[f32]>) -> Vec<f32> {
        let n = self.layout.n_dimensions();
        let header = self.layout.header_len();
        let mut next = input.to_vec();
        next[n..].copy_from_slice(&prev_input[n..]);

        if let Some(prediction) = prediction {
            for (j, slot) in next.iter_mut().enumerate().skip(n) {
                let p = prediction[header + j];
                if p >= self.threshold {
                    *slot = 1.0;
                } else if p <= -self.threshold {
                    *slot = 0.0;
                }
            }
        }
        next
    }

    fn trace_step(
        &self,
        path: &Path,
        pos: usize,
        step: &Step,
        input: &[f32],
        output: &[f32],
        tag: StepTag,
    ) -> StepTrace {
        let n = self.layout.n_dimensions();
        StepTrace {
            phase: self.phase,
            path: path.index(),
            step: pos,
            index: step.index,
            input: summarize(input, n, self.threshold),
            target: summarize(self.layout.body(&step.target), n, self.threshold),
            prediction: summarize(self.layout.body(output), n, self.threshold),
            tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::predictor::FnPredictor;
    use crate::score::StepScorer;

    fn config() -> EvalConfig {
        EvalConfig::new(2, 1, 0.5)
            .with_modes(RolloutMode::Autoregressive, RolloutMode::Autoregressive)
    }

    fn accumulator(config: &EvalConfig, layout: TierLayout) -> ScoreAccumulator {
        ScoreAccumulator::new(StepScorer::new(layout, config.n_features, config.threshold))
    }

    /// Records every input it sees and replays canned outputs in order.
    struct Scripted {
        outputs: Vec<Vec<f32>>,
        seen: Mutex<Vec<Vec<f32>>>,
    }

    impl Scripted {
        fn new(outputs: Vec<Vec<f32>>) -> Self {
            Self {
                outputs,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<Vec<f32>> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Predictor for Scripted {
        fn predict(&self, input: &[f32]) -> anyhow::Result<Vec<f32>> {
            let mut seen = self.seen.lock().unwrap();
            let out = self.outputs[seen.len() % self.outputs.len()].clone();
            seen.push(input.to_vec());
            Ok(out)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn path(steps: Vec<Step>) -> Path {
        Path::new(0, steps)
    }

    // ─── Context construction ───

    #[test]
    fn test_path_begin_zeroes_context_and_carry_snaps() {
        let config = config();
        let layout = config.layout_for(4, 4).unwrap();
        let predictor = Scripted::new(vec![vec![0.9, 0.0, 0.9, -0.9], vec![0.0; 4], vec![0.0; 4]]);
        let driver = RolloutDriver::new(&config, Phase::Test, layout, &predictor);
        let mut acc = accumulator(&config, layout);

        let p = path(vec![
            Step::new(0, vec![1.0, 0.0, 0.7, 0.7], vec![0.0; 4]),
            Step::new(1, vec![0.0, 1.0, 0.3, 0.3], vec![0.0; 4]),
            Step::new(2, vec![1.0, 0.0, 0.5, 0.5], vec![0.0; 4]),
        ]);
        driver.run_path(&p, &mut acc).unwrap();

        let seen = predictor.seen();
        assert_eq!(seen[0], vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(seen[1], vec![0.0, 1.0, 1.0, 0.0]);
        // Prediction 1 is silent: context copied unchanged from step 1.
        assert_eq!(seen[2], vec![1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_carry_keeps_baseline_in_dead_band() {
        let config = config();
        let layout = config.layout_for(4, 4).unwrap();
        let predictor = FnPredictor::new(|_: &[f32]| vec![0.0; 4]);
        let driver = RolloutDriver::new(&config, Phase::Test, layout, &predictor);
        let next = driver.carry_context(
            &[0.0, 1.0, 9.0, 9.0],
            &[1.0, 0.0, 0.3, 0.8],
            Some(&[0.0, 0.0, 0.2, -0.4]),
        );
        assert_eq!(next, vec![0.0, 1.0, 0.3, 0.8]);
    }

    #[test]
    fn test_carry_reads_past_header() {
        let config = config().with_validity_header(vec![1.0]);
        let layout = config.layout_for(4, 5).unwrap();
        let predictor = FnPredictor::new(|_: &[f32]| vec![0.0; 5]);
        let driver = RolloutDriver::new(&config, Phase::Test, layout, &predictor);
        let next = driver.carry_context(
            &[0.0, 0.0, 0.0, 0.0],
            &[0.0, 0.0, 0.5, 0.5],
            Some(&[0.9, 0.0, 0.0, -0.9, 0.9]),
        );
        assert_eq!(next, vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_invalid_gate_blocks_carry() {
        let config = config().with_validity_header(vec![1.0]);
        let layout = config.layout_for(4, 5).unwrap();
        // Header negative: gate fails, context decays to a pure copy.
        let predictor = Scripted::new(vec![vec![-0.9, 0.0, 0.0, 0.9, 0.9]]);
        let driver = RolloutDriver::new(&config, Phase::Test, layout, &predictor);
        let mut acc = accumulator(&config, layout);

        let p = path(vec![
            Step::new(0, vec![0.0; 4], vec![0.9, 0.9, 0.0, 0.0, 0.0]),
            Step::new(1, vec![0.0; 4], vec![0.9, 0.9, 0.0, 0.0, 0.0]),
        ]);
        let traces = driver.run_path(&p, &mut acc).unwrap();

        assert_eq!(predictor.seen()[1], vec![0.0, 0.0, 0.0, 0.0]);
        assert_eq!(traces[0].tag, StepTag::Scored(Outcome::Invalid));
        assert_eq!(acc.counters().test.errors, 2);
    }

    // ─── Interstitial and predictable flags ───

    #[test]
    fn test_interstitial_breaks_chain_and_skips_scoring() {
        let config = config();
        let layout = config.layout_for(4, 4).unwrap();
        let predictor = Scripted::new(vec![vec![0.9, 0.0, 0.9, 0.9]]);
        let driver = RolloutDriver::new(&config, Phase::Test, layout, &predictor);
        let mut acc = accumulator(&config, layout);

        let p = path(vec![
            Step::new(0, vec![0.0; 4], vec![0.9, 0.0, 0.9, 0.9]).with_interstitial(true),
            Step::new(1, vec![0.0; 4], vec![0.9, 0.0, 0.9, 0.9]),
        ]);
        let traces = driver.run_path(&p, &mut acc).unwrap();

        assert_eq!(predictor.seen()[1], vec![0.0, 0.0, 0.0, 0.0]);
        assert_eq!(traces[0].tag, StepTag::Interstitial);
        assert_eq!(acc.counters().test.total, 1);
    }

    #[test]
    fn test_allow_interstitial_contexts_keeps_chain() {
        let config = config().with_allow_interstitial_contexts(true);
        let layout = config.layout_for(4, 4).unwrap();
        let predictor = Scripted::new(vec![vec![0.9, 0.0, 0.9, 0.9]]);
        let driver = RolloutDriver::new(&config, Phase::Test, layout, &predictor);
        let mut acc = accumulator(&config, layout);

        let p = path(vec![
            Step::new(0, vec![0.0; 4], vec![0.0; 4]).with_interstitial(true),
            Step::new(1, vec![0.0; 4], vec![0.0; 4]),
        ]);
        driver.run_path(&p, &mut acc).unwrap();

        assert_eq!(predictor.seen()[1], vec![0.0, 0.0, 1.0, 1.0]);
        assert_eq!(acc.counters().test.total, 1);
    }

    #[test]
    fn test_unpredictable_steps_roll_out_unscored() {
        let config = config();
        let layout = config.layout_for(4, 4).unwrap();
        let predictor = Scripted::new(vec![vec![0.9, 0.0, 0.9, 0.0]]);
        let driver = RolloutDriver::new(&config, Phase::Test, layout, &predictor);
        let mut acc = accumulator(&config, layout);

        let p = path(vec![
            Step::new(0, vec![0.0; 4], vec![0.0; 4]).with_predictable(false),
            Step::new(1, vec![0.0; 4], vec![0.9, 0.0, 0.9, 0.0]),
        ]);
        let traces = driver.run_path(&p, &mut acc).unwrap();

        assert_eq!(traces[0].tag, StepTag::Unscored);
        assert_eq!(traces[1].tag, StepTag::Scored(Outcome::Ok));
        assert_eq!(predictor.seen()[1], vec![0.0, 0.0, 1.0, 0.0]);
        assert_eq!(acc.counters().test.total, 1);
        assert_eq!(acc.counters().test.errors, 0);
    }

    // ─── Modes and failures ───

    #[test]
    fn test_teacher_forced_uses_stored_inputs() {
        let config = EvalConfig::new(2, 1, 0.5);
        let layout = config.layout_for(4, 4).unwrap();
        let predictor = Scripted::new(vec![vec![0.9, 0.0, 0.9, 0.9]]);
        let driver = RolloutDriver::new(&config, Phase::Train, layout, &predictor);
        assert_eq!(driver.mode(), RolloutMode::TeacherForced);
        let mut acc = accumulator(&config, layout);

        let p = path(vec![
            Step::new(0, vec![1.0, 0.0, 0.4, 0.6], vec![0.0; 4]),
            Step::new(1, vec![0.0, 1.0, 0.2, 0.1], vec![0.0; 4]),
        ]);
        driver.run_path(&p, &mut acc).unwrap();

        assert_eq!(predictor.seen()[0], vec![1.0, 0.0, 0.4, 0.6]);
        assert_eq!(predictor.seen()[1], vec![0.0, 1.0, 0.2, 0.1]);
        assert_eq!(acc.counters().train.total, 2);
        assert_eq!(acc.counters().test.total, 0);
    }

    #[test]
    fn test_wrong_output_length_is_fatal() {
        let config = config();
        let layout = config.layout_for(4, 4).unwrap();
        let predictor = FnPredictor::new(|_: &[f32]| vec![0.0; 3]);
        let driver = RolloutDriver::new(&config, Phase::Test, layout, &predictor);
        let mut acc = accumulator(&config, layout);

        let p = path(vec![Step::new(7, vec![0.0; 4], vec![0.0; 4])]);
        let err = driver.run_path(&p, &mut acc).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ShapeMismatch {
                expected: 4,
                actual: 3,
                ..
            }
        ));
        assert!(err.to_string().contains("step 7"));
    }

    #[test]
    fn test_predictor_error_is_fatal() {
        struct Failing;
        impl Predictor for Failing {
            fn predict(&self, _input: &[f32]) -> anyhow::Result<Vec<f32>> {
                anyhow::bail!("device lost")
            }
            fn name(&self) -> &str {
                "failing"
            }
        }

        let config = config();
        let layout = config.layout_for(4, 4).unwrap();
        let driver = RolloutDriver::new(&config, Phase::Test, layout, &Failing);
        let mut acc = accumulator(&config, layout);

        let p = path(vec![Step::new(0, vec![0.0; 4], vec![0.0; 4])]);
        let err = driver.run_path(&p, &mut acc).unwrap_err();
        assert!(matches!(err, EngineError::Predictor { step: 0, .. }));
        assert!(err.to_string().contains("device lost"));
    }

    // ─── Traces ───

    #[test]
    fn test_trace_line_format() {
        let config = config();
        let layout = config.layout_for(4, 4).unwrap();
        let predictor = FnPredictor::new(|_: &[f32]| vec![0.9, 0.0, 0.0, -0.9]);
        let driver = RolloutDriver::new(&config, Phase::Test, layout, &predictor);
        let mut acc = accumulator(&config, layout);

        let p = path(vec![
            Step::new(0, vec![1.0, 0.0, 0.0, 0.0], vec![0.9, 0.0, 0.0, -0.9]),
            Step::new(1, vec![0.0, 1.0, 0.0, 0.0], vec![0.0; 4]).with_predictable(false),
        ]);
        let traces = driver.run_path(&p, &mut acc).unwrap();

        assert_eq!(
            traces[0].to_string(),
            "predict: path = 0, step = 0, X: [sense=[0]], y: [sense=[0], ctx0=[-1]], \
             predictions: [sense=[0], ctx0=[-1]], ok"
        );
        assert_eq!(
            traces[1].to_string(),
            "predict: path = 0, step = 1, X: [sense=[1]], y: [], predictions: [sense=[0], ctx0=[-1]]"
        );
    }

    #[test]
    fn test_no_traces_when_quiet() {
        let config = config().with_verbose(false);
        let layout = config.layout_for(4, 4).unwrap();
        let predictor = FnPredictor::new(|_: &[f32]| vec![0.0; 4]);
        let driver = RolloutDriver::new(&config, Phase::Test, layout, &predictor);
        let mut acc = accumulator(&config, layout);

        let p = path(vec![Step::new(0, vec![0.0; 4], vec![0.0; 4])]);
        assert!(driver.run_path(&p, &mut acc).unwrap().is_empty());
        assert_eq!(acc.counters().test.total, 1);
    }
}

// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Full evaluation pass: train phase, then test phase.
//!
//! Every configuration and shape check runs before the first predictor
//! call. Paths are independent, so with `parallel` set each path is rolled
//! out on the rayon pool with its own counters; the per-path results are
//! reduced in path order, which makes the output identical to a sequential
//! run.

use rayon::prelude::*;
use tracing::{info, warn};

use crate::codec::TierLayout;
use crate::config::EvalConfig;
use crate::dataset::{Corpus, Dataset, Path};
use crate::error::Result;
use crate::predictor::Predictor;
use crate::report::{format_pct, ResultRecord};
use crate::rollout::{RolloutDriver, StepTrace};
use crate::score::{ScoreAccumulator, ScoreCounters, StepScorer};

/// Counters and (if verbose) traces of a completed run.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub counters: ScoreCounters,
    /// Train traces first, then test; path order within each phase.
    pub traces: Vec<StepTrace>,
}

impl Evaluation {
    pub fn record(&self) -> ResultRecord {
        ResultRecord::from_counters(&self.counters)
    }
}

pub struct Evaluator {
    config: EvalConfig,
}

impl Evaluator {
    pub fn new(config: EvalConfig) -> Result<Self> {
        if let Err(e) = config.validate() {
            warn!(error = %e, "rejected evaluation config");
            return Err(e);
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Layout of one phase, checked against this configuration.
    pub fn layout(&self, corpus: &Corpus) -> Result<TierLayout> {
        self.config
            .layout_for(corpus.input_dim(), corpus.target_dim())
            .map_err(|e| {
                warn!(phase = %corpus.phase(), error = %e, "dataset does not fit config");
                e
            })
    }

    pub fn evaluate<P: Predictor + ?Sized>(&self, dataset: &Dataset, predictor: &P) -> Result<Evaluation> {
        let train_layout = self.layout(&dataset.train)?;
        let test_layout = self.layout(&dataset.test)?;

        let mut evaluation = Evaluation::default();
        for (corpus, layout) in [(&dataset.train, train_layout), (&dataset.test, test_layout)] {
            let (counters, traces) = self.run_phase(corpus, layout, predictor)?;
            evaluation.counters.merge(&counters);
            evaluation.traces.extend(traces);
        }
        Ok(evaluation)
    }

    /// Roll out every path of one corpus.
    pub fn run_phase<P: Predictor + ?Sized>(
        &self,
        corpus: &Corpus,
        layout: TierLayout,
        predictor: &P,
    ) -> Result<(ScoreCounters, Vec<StepTrace>)> {
        let phase = corpus.phase();
        let driver = RolloutDriver::new(&self.config, phase, layout, predictor);
        let scorer = StepScorer::new(layout, self.config.n_features, self.config.threshold);

        let runs: Vec<(ScoreCounters, Vec<StepTrace>)> = if self.config.parallel {
            corpus
                .paths()
                .par_iter()
                .map(|path| run_path(&driver, scorer, path))
                .collect::<Result<Vec<_>>>()?
        } else {
            corpus
                .paths()
                .iter()
                .map(|path| run_path(&driver, scorer, path))
                .collect::<Result<Vec<_>>>()?
        };

        let mut counters = ScoreCounters::default();
        let mut traces = Vec::new();
        for (c, t) in runs {
            counters.merge(&c);
            traces.extend(t);
        }

        let totals = counters.phase(phase);
        info!(
            phase = %phase,
            mode = ?driver.mode(),
            paths = corpus.paths().len(),
            errors = totals.errors,
            total = totals.total,
            pct = %format_pct(totals),
            "phase complete"
        );
        Ok((counters, traces))
    }
}

/// One path with its own counters.
fn run_path<P: Predictor + ?Sized>(
    driver: &RolloutDriver<'_, P>,
    scorer: StepScorer,
    path: &Path,
) -> Result<(ScoreCounters, Vec<StepTrace>)> {
    let mut acc = ScoreAccumulator::new(scorer);
    let traces = driver.run_path(path, &mut acc)?;
    Ok((acc.into_counters(), traces))
}

/// Convenience wrapper: build an [`Evaluator`] and run it once.
pub fn evaluate<P: Predictor + ?Sized>(
    config: EvalConfig,
    dataset: &Dataset,
    predictor: &P,
) -> Result<Evaluation> {
    Evaluator::new(config)?.evaluate(dataset, predictor)
}

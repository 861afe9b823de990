// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Mandala evaluation driver
//!
//! 1. Load the dataset and the dense predictor weights
//! 2. Validate the configuration against both phases
//! 3. Train pass (teacher-forced by default), then test pass (autoregressive)
//! 4. Print the per-step trace and the summary, write the result record
//!
//! Nothing is written if any step fails.

mod cli;

use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mandala_engine::{Dataset, DensePredictor, Evaluator, Predictor};

use crate::cli::Cli;

/// Print and immediately flush stdout (critical for piped output).
macro_rules! pf {
    ($($arg:tt)*) => {{
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, $($arg)*);
        let _ = out.flush();
    }};
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(cli.log_directive()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.eval_config()?;
    let dataset = Dataset::load(&cli.dataset)
        .with_context(|| format!("loading dataset {}", cli.dataset.display()))?;
    let predictor = DensePredictor::load(&cli.weights)
        .with_context(|| format!("loading weights {}", cli.weights.display()))?;

    tracing::info!(
        predictor = predictor.name(),
        layers = predictor.layers().len(),
        train_steps = dataset.train.num_steps(),
        test_steps = dataset.test.num_steps(),
        test_paths = dataset.test.paths().len(),
        "starting evaluation"
    );

    let results_filename = config.results_filename.clone();
    let evaluation = Evaluator::new(config)?.evaluate(&dataset, &predictor)?;

    for trace in &evaluation.traces {
        pf!("{trace}");
    }
    let record = evaluation.record();
    for line in record.summary_lines() {
        pf!("{line}");
    }

    record
        .write(&results_filename)
        .with_context(|| format!("writing results {}", results_filename.display()))?;
    tracing::info!(path = %results_filename.display(), "results written");
    Ok(())
}

// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Sequential rollout and multi-tier feature-matching scoring for symbolic
//! next-step predictors.

pub mod error;
pub mod codec;
pub mod gate;
pub mod dataset;
pub mod config;
pub mod predictor;
pub mod score;
pub mod rollout;
pub mod report;
pub mod evaluate;

pub use error::{EngineError, Result};
pub use codec::{decode_tier, summarize, ActiveFeature, Feature, FeatureSet, Polarity, Summary, TierLayout};
pub use gate::ValidityGate;
pub use dataset::{Corpus, Dataset, Path, Phase, PhaseData, Step};
pub use config::{EvalConfig, RolloutMode};
pub use predictor::{Activation, DenseLayer, DensePredictor, FnPredictor, Predictor, Serialized, StatefulPredictor};
pub use score::{Outcome, PhaseCounters, ScoreAccumulator, ScoreCounters, StepScorer};
pub use rollout::{RolloutDriver, StepTag, StepTrace};
pub use report::ResultRecord;
pub use evaluate::{evaluate, Evaluation, Evaluator};

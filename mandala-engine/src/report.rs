// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Result record written once at the end of a run.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::score::{PhaseCounters, ScoreCounters};

/// Flat six-field record; every value is a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub train_prediction_errors: String,
    pub train_total_predictions: String,
    pub train_error_pct: String,
    pub test_prediction_errors: String,
    pub test_total_predictions: String,
    pub test_error_pct: String,
}

impl ResultRecord {
    pub fn from_counters(counters: &ScoreCounters) -> Self {
        Self {
            train_prediction_errors: counters.train.errors.to_string(),
            train_total_predictions: counters.train.total.to_string(),
            train_error_pct: format_pct(&counters.train),
            test_prediction_errors: counters.test.errors.to_string(),
            test_total_predictions: counters.test.total.to_string(),
            test_error_pct: format_pct(&counters.test),
        }
    }

    /// Compact JSON, fields in declaration order.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Write the record followed by a newline, replacing any existing file.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut text = self.to_json()?;
        text.push('\n');
        fs::write(path, text).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `Train prediction errors/total = E/T (P%)` and the same for Test.
    pub fn summary_lines(&self) -> [String; 2] {
        [
            format!(
                "Train prediction errors/total = {}/{} ({}%)",
                self.train_prediction_errors, self.train_total_predictions, self.train_error_pct
            ),
            format!(
                "Test prediction errors/total = {}/{} ({}%)",
                self.test_prediction_errors, self.test_total_predictions, self.test_error_pct
            ),
        ]
    }
}

/// `"0"` for an empty phase, else the percentage rounded to 2 decimals in
/// shortest form (`"30.0"`, `"33.33"`).
pub fn format_pct(counters: &PhaseCounters) -> String {
    if counters.total == 0 {
        return "0".to_string();
    }
    format!("{:?}", round_centi(counters.error_pct()))
}

/// Round a value in `[0, 100]` to 2 decimals, ties to even on the exact
/// binary value (so `3.125` becomes `3.12`).
fn round_centi(x: f64) -> f64 {
    // Far below the first tie at 0.005.
    if !x.is_finite() || x < 0.004 {
        return 0.0;
    }
    let bits = x.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i32 - 1075;
    let mantissa = u128::from((bits & ((1 << 52) - 1)) | (1 << 52));
    if exponent >= 0 {
        return x;
    }

    // x = mantissa / 2^shift, with shift <= 61 for x >= 0.004.
    let shift = (-exponent) as u32;
    let scaled = mantissa * 100;
    let quotient = scaled >> shift;
    let remainder = scaled & ((1u128 << shift) - 1);
    let half = 1u128 << (shift - 1);
    let cents = match remainder.cmp(&half) {
        std::cmp::Ordering::Less => quotient,
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal => quotient + (quotient & 1),
    };
    cents as f64 / 100.0
}

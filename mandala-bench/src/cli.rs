// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Command-line arguments for the evaluation driver.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{Parser, ValueEnum};

use mandala_engine::{EvalConfig, RolloutMode};

/// Roll a trained predictor over a dataset and score its multi-tier
/// feature predictions.
#[derive(Parser, Debug)]
#[command(name = "mandala-bench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Dataset file (assignment module or JSON)
    #[arg(short = 'd', long = "dataset")]
    pub dataset: PathBuf,

    /// Dense predictor weights (JSON)
    #[arg(short = 'w', long = "weights")]
    pub weights: PathBuf,

    /// Base configuration (JSON); flags below override it
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Sense tier width
    #[arg(short = 'n', long = "dimensions")]
    pub dimensions: Option<usize>,

    /// Top-k picks per tier
    #[arg(short = 'k', long = "features")]
    pub features: Option<usize>,

    /// Activation threshold
    #[arg(short = 't', long = "threshold")]
    pub threshold: Option<f32>,

    /// Validity header reference pattern, e.g. `1,-1`
    #[arg(long = "validity-header", value_delimiter = ',', allow_hyphen_values = true)]
    pub validity_header: Option<Vec<f32>>,

    /// Keep carrying predictions across interstitial steps (`true`/`false`;
    /// bare flag means `true`)
    #[arg(
        long = "allow-interstitial-contexts",
        alias = "allow_interstitial_contexts",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub allow_interstitial_contexts: Option<bool>,

    #[arg(long = "train-mode", value_enum)]
    pub train_mode: Option<Mode>,

    #[arg(long = "test-mode", value_enum)]
    pub test_mode: Option<Mode>,

    /// Roll out paths in parallel (`true`/`false`; bare flag means `true`)
    #[arg(
        short = 'p',
        long = "parallel",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub parallel: Option<bool>,

    /// Where to write the result record
    #[arg(short = 'o', long = "results-filename")]
    pub results_filename: Option<PathBuf>,

    /// Quiet mode: no per-step trace, warnings only
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Mode {
    /// Use dataset inputs as given
    TeacherForced,
    /// Feed predictions back into the context
    Autoregressive,
}

impl From<Mode> for RolloutMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::TeacherForced => RolloutMode::TeacherForced,
            Mode::Autoregressive => RolloutMode::Autoregressive,
        }
    }
}

impl Cli {
    /// Base config (file or defaults) with command-line overrides applied.
    pub fn eval_config(&self) -> Result<EvalConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => EvalConfig::default(),
        };

        if let Some(n) = self.dimensions {
            config.n_dimensions = n;
        }
        if let Some(k) = self.features {
            config.n_features = k;
        }
        if let Some(thr) = self.threshold {
            config.threshold = thr;
        }
        if let Some(header) = &self.validity_header {
            config.validity_header = header.clone();
        }
        if let Some(allow) = self.allow_interstitial_contexts {
            config.allow_interstitial_contexts = allow;
        }
        if let Some(mode) = self.train_mode {
            config.train_mode = mode.into();
        }
        if let Some(mode) = self.test_mode {
            config.test_mode = mode.into();
        }
        if let Some(parallel) = self.parallel {
            config.parallel = parallel;
        }
        if let Some(path) = &self.results_filename {
            config.results_filename = path.clone();
        }
        if self.quiet {
            config.verbose = false;
        }
        Ok(config)
    }

    /// Default `tracing` directive for this run.
    pub fn log_directive(&self) -> &'static str {
        if self.quiet {
            "mandala_engine=warn,mandala_bench=warn"
        } else {
            "mandala_engine=info,mandala_bench=info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["mandala-bench", "-d", "data.py", "-w", "net.json"]);
        assert_eq!(cli.dataset, PathBuf::from("data.py"));
        assert!(!cli.quiet);
        assert!(cli.parallel.is_none());
        assert!(cli.allow_interstitial_contexts.is_none());

        let config = cli.eval_config().unwrap();
        assert_eq!(config, EvalConfig::default());
        assert_eq!(cli.log_directive(), "mandala_engine=info,mandala_bench=info");
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "mandala-bench",
            "-d",
            "data.py",
            "-w",
            "net.json",
            "-n",
            "8",
            "-k",
            "2",
            "-t",
            "0.25",
            "--validity-header",
            "-1,1",
            "--allow-interstitial-contexts",
            "--train-mode",
            "autoregressive",
            "-o",
            "out.json",
            "-q",
        ]);
        let config = cli.eval_config().unwrap();
        assert_eq!(config.n_dimensions, 8);
        assert_eq!(config.n_features, 2);
        assert!((config.threshold - 0.25).abs() < 1e-6);
        assert_eq!(config.validity_header, vec![-1.0, 1.0]);
        assert!(config.allow_interstitial_contexts);
        assert_eq!(config.train_mode, RolloutMode::Autoregressive);
        assert_eq!(config.test_mode, RolloutMode::Autoregressive);
        assert_eq!(config.results_filename, PathBuf::from("out.json"));
        assert!(!config.verbose);
        assert_eq!(cli.log_directive(), "mandala_engine=warn,mandala_bench=warn");
    }

    #[test]
    fn test_config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"n_dimensions": 16, "n_features": 4, "parallel": true}"#).unwrap();

        let cli = Cli::parse_from([
            "mandala-bench",
            "-d",
            "data.py",
            "-w",
            "net.json",
            "-c",
            path.to_str().unwrap(),
            "-k",
            "1",
        ]);
        let config = cli.eval_config().unwrap();
        assert_eq!(config.n_dimensions, 16);
        assert_eq!(config.n_features, 1);
        assert!(config.parallel);
    }

    #[test]
    fn test_flags_switch_off_config_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"parallel": true, "allow_interstitial_contexts": true}"#).unwrap();
        let path = path.to_str().unwrap();

        let cli = Cli::parse_from(["mandala-bench", "-d", "data.py", "-w", "net.json", "-c", path]);
        let config = cli.eval_config().unwrap();
        assert!(config.parallel);
        assert!(config.allow_interstitial_contexts);

        let cli = Cli::parse_from([
            "mandala-bench",
            "-d",
            "data.py",
            "-w",
            "net.json",
            "-c",
            path,
            "--parallel",
            "false",
            "--allow-interstitial-contexts",
            "False",
        ]);
        let config = cli.eval_config().unwrap();
        assert!(!config.parallel);
        assert!(!config.allow_interstitial_contexts);

        let cli = Cli::parse_from([
            "mandala-bench",
            "-d",
            "data.py",
            "-w",
            "net.json",
            "--allow_interstitial_contexts",
            "True",
            "-p",
            "no",
        ]);
        assert_eq!(cli.allow_interstitial_contexts, Some(true));
        assert_eq!(cli.parallel, Some(false));
    }

    #[test]
    fn test_missing_config_file_names_path() {
        let cli = Cli::parse_from([
            "mandala-bench",
            "-d",
            "data.py",
            "-w",
            "net.json",
            "-c",
            "/nonexistent/config.json",
        ]);
        let err = cli.eval_config().unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/config.json"));
    }
}

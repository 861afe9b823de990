// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Corpus model and dataset loading.
//!
//! A phase's steps arrive flat (row-major vectors plus index lists) and are
//! split into independent [`Path`]s at the path-begin indices. Two on-disk
//! forms are accepted:
//!
//! ```text
//! X_train_shape = [ 3, 8 ]        {"X_train_shape": [3, 8],
//! X_train = [                       "X_train": [...],
//! 0.0,1.0,...                       ...}
//! ]
//! y_train_path_begin = [0,2]
//! ```
//!
//! i.e. the generated assignment module, or a JSON object with the same keys.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path as FsPath;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineError, Result};

// ─── Phase ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Train,
    Test,
}

impl Phase {
    /// Prefix used on trace lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Train => "validate",
            Self::Test => "predict",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Test => write!(f, "test"),
        }
    }
}

// ─── Steps and Paths ────────────────────────────────

/// One input/target pair of the corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Global index within the phase.
    pub index: usize,
    pub input: Vec<f32>,
    pub target: Vec<f32>,
    /// Has a ground truth eligible for scoring.
    pub predictable: bool,
    /// Breaks the autoregressive chain after this step.
    pub interstitial: bool,
}

impl Step {
    pub fn new(index: usize, input: Vec<f32>, target: Vec<f32>) -> Self {
        Self {
            index,
            input,
            target,
            predictable: true,
            interstitial: false,
        }
    }

    pub fn with_predictable(mut self, predictable: bool) -> Self {
        self.predictable = predictable;
        self
    }

    pub fn with_interstitial(mut self, interstitial: bool) -> Self {
        self.interstitial = interstitial;
        self
    }
}

/// An ordered trajectory of steps; the first step is the path begin.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    index: usize,
    steps: Vec<Step>,
}

impl Path {
    pub fn new(index: usize, steps: Vec<Step>) -> Self {
        Self { index, steps }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

// ─── Corpus ─────────────────────────────────────────

/// Flat, row-major description of one phase as produced by the generator.
#[derive(Debug, Clone, Default)]
pub struct PhaseData {
    pub input_shape: [usize; 2],
    pub inputs: Vec<f32>,
    pub target_shape: [usize; 2],
    pub targets: Vec<f32>,
    /// `None` means the whole phase is a single path.
    pub path_begin: Option<Vec<usize>>,
    /// `None` means every step is predictable.
    pub predictable: Option<Vec<usize>>,
    pub interstitial: Option<Vec<usize>>,
}

/// All paths of one phase, with uniform input and target widths.
#[derive(Debug, Clone)]
pub struct Corpus {
    phase: Phase,
    input_dim: usize,
    target_dim: usize,
    paths: Vec<Path>,
}

impl Corpus {
    /// Build from already-split paths.
    ///
    /// Fails on an empty corpus, an empty path, or a step whose widths
    /// differ from the first step's.
    pub fn new(phase: Phase, paths: Vec<Path>) -> Result<Self> {
        let first = paths
            .iter()
            .flat_map(|p| p.steps.first())
            .next()
            .ok_or(EngineError::EmptyDataset { phase })?;
        let input_dim = first.input.len();
        let target_dim = first.target.len();

        for path in &paths {
            if path.is_empty() {
                return Err(EngineError::Dataset(format!(
                    "{phase} path {} has no steps",
                    path.index
                )));
            }
            for step in &path.steps {
                if step.input.len() != input_dim {
                    return Err(EngineError::shape(
                        format!("{phase} step {} input", step.index),
                        input_dim,
                        step.input.len(),
                    ));
                }
                if step.target.len() != target_dim {
                    return Err(EngineError::shape(
                        format!("{phase} step {} target", step.index),
                        target_dim,
                        step.target.len(),
                    ));
                }
            }
        }

        Ok(Self {
            phase,
            input_dim,
            target_dim,
            paths,
        })
    }

    /// Split flat phase data into paths. Step 0 always begins a path.
    pub fn from_phase_data(phase: Phase, data: PhaseData) -> Result<Self> {
        let [rows, input_cols] = data.input_shape;
        let [target_rows, target_cols] = data.target_shape;
        if rows == 0 {
            return Err(EngineError::EmptyDataset { phase });
        }
        if target_rows != rows {
            return Err(EngineError::shape(
                format!("{phase} target rows"),
                rows,
                target_rows,
            ));
        }
        let input_len = flat_len(phase, "inputs", rows, input_cols)?;
        let target_len = flat_len(phase, "targets", rows, target_cols)?;
        if data.inputs.len() != input_len {
            return Err(EngineError::shape(
                format!("{phase} inputs"),
                input_len,
                data.inputs.len(),
            ));
        }
        if data.targets.len() != target_len {
            return Err(EngineError::shape(
                format!("{phase} targets"),
                target_len,
                data.targets.len(),
            ));
        }

        let mut begins: BTreeSet<usize> =
            index_set(phase, "path_begin", data.path_begin.as_deref(), rows)?
                .into_iter()
                .collect();
        begins.insert(0);
        let predictable = match data.predictable.as_deref() {
            Some(list) => Some(index_set(phase, "predictable", Some(list), rows)?),
            None => None,
        };
        let interstitial = index_set(phase, "interstitial", data.interstitial.as_deref(), rows)?;

        let mut paths: Vec<Path> = Vec::with_capacity(begins.len());
        for i in 0..rows {
            if begins.contains(&i) {
                paths.push(Path::new(paths.len(), Vec::new()));
            }
            let step = Step {
                index: i,
                input: data.inputs[i * input_cols..(i + 1) * input_cols].to_vec(),
                target: data.targets[i * target_cols..(i + 1) * target_cols].to_vec(),
                predictable: predictable.as_ref().map_or(true, |set| set.contains(&i)),
                interstitial: interstitial.contains(&i),
            };
            if let Some(path) = paths.last_mut() {
                path.steps.push(step);
            }
        }

        Ok(Self {
            phase,
            input_dim: input_cols,
            target_dim: target_cols,
            paths,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn target_dim(&self) -> usize {
        self.target_dim
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    pub fn into_paths(self) -> Vec<Path> {
        self.paths
    }

    pub fn num_steps(&self) -> usize {
        self.paths.iter().map(Path::len).sum()
    }

    pub fn num_predictable(&self) -> usize {
        self.steps().filter(|s| s.predictable).count()
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.paths.iter().flat_map(|p| p.steps.iter())
    }
}

/// `rows * cols`, or an error when the declared shape cannot exist.
fn flat_len(phase: Phase, what: &str, rows: usize, cols: usize) -> Result<usize> {
    rows.checked_mul(cols).ok_or_else(|| {
        EngineError::Dataset(format!("{phase} {what} shape [{rows}, {cols}] overflows"))
    })
}

fn index_set(
    phase: Phase,
    what: &str,
    list: Option<&[usize]>,
    rows: usize,
) -> Result<HashSet<usize>> {
    let mut set = HashSet::new();
    for &index in list.unwrap_or(&[]) {
        if index >= rows {
            return Err(EngineError::IndexOutOfRange {
                what: format!("{phase} {what}"),
                index,
                len: rows,
            });
        }
        set.insert(index);
    }
    Ok(set)
}

// ─── Dataset ────────────────────────────────────────

/// Train and test corpora of one evaluation run.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub train: Corpus,
    pub test: Corpus,
}

impl Dataset {
    pub fn load(path: impl AsRef<FsPath>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse either a JSON object or an assignment module.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawDataset = if text.trim_start().starts_with('{') {
            serde_json::from_str(text)?
        } else {
            serde_json::from_value(Value::Object(parse_assignments(text)?))?
        };
        raw.into_dataset()
    }

    pub fn corpus(&self, phase: Phase) -> &Corpus {
        match phase {
            Phase::Train => &self.train,
            Phase::Test => &self.test,
        }
    }
}

/// Collect `name = <json>` assignments; right-hand sides may span lines.
///
/// Blank, `#` comment, `import` and `from` lines are skipped.
pub fn parse_assignments(text: &str) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    let mut current: Option<(String, String)> = None;

    for (lineno, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with("import ")
            || trimmed.starts_with("from ")
        {
            continue;
        }
        if let Some((name, rhs)) = split_assignment(trimmed) {
            if let Some((name, body)) = current.take() {
                insert_value(&mut map, name, &body)?;
            }
            current = Some((name.to_string(), rhs.to_string()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push('\n');
            body.push_str(trimmed);
        } else {
            return Err(EngineError::Dataset(format!(
                "line {}: expected `name = value`",
                lineno + 1
            )));
        }
    }
    if let Some((name, body)) = current {
        insert_value(&mut map, name, &body)?;
    }
    Ok(map)
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let (lhs, rhs) = line.split_once('=')?;
    let name = lhs.trim();
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then(|| (name, rhs.trim()))
}

fn insert_value(map: &mut Map<String, Value>, name: String, body: &str) -> Result<()> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| EngineError::Dataset(format!("{name}: {e}")))?;
    map.insert(name, value);
    Ok(())
}

#[derive(Debug, Deserialize)]
struct RawDataset {
    #[serde(rename = "X_train_shape")]
    x_train_shape: Vec<usize>,
    #[serde(rename = "X_train")]
    x_train: Vec<f32>,
    y_train_shape: Vec<usize>,
    y_train: Vec<f32>,
    y_train_path_begin: Option<Vec<usize>>,
    y_train_predictable: Option<Vec<usize>>,
    y_train_interstitial: Option<Vec<usize>>,
    #[serde(rename = "X_test_shape")]
    x_test_shape: Vec<usize>,
    #[serde(rename = "X_test")]
    x_test: Vec<f32>,
    y_test_shape: Vec<usize>,
    y_test: Vec<f32>,
    y_test_path_begin: Option<Vec<usize>>,
    y_test_predictable: Option<Vec<usize>>,
    y_test_interstitial: Option<Vec<usize>>,
}

impl RawDataset {
    fn into_dataset(self) -> Result<Dataset> {
        let train = PhaseData {
            input_shape: shape2("X_train_shape", &self.x_train_shape)?,
            inputs: self.x_train,
            target_shape: shape2("y_train_shape", &self.y_train_shape)?,
            targets: self.y_train,
            path_begin: self.y_train_path_begin,
            predictable: self.y_train_predictable,
            interstitial: self.y_train_interstitial,
        };
        let test = PhaseData {
            input_shape: shape2("X_test_shape", &self.x_test_shape)?,
            inputs: self.x_test,
            target_shape: shape2("y_test_shape", &self.y_test_shape)?,
            targets: self.y_test,
            path_begin: self.y_test_path_begin,
            predictable: self.y_test_predictable,
            interstitial: self.y_test_interstitial,
        };
        Ok(Dataset {
            train: Corpus::from_phase_data(Phase::Train, train)?,
            test: Corpus::from_phase_data(Phase::Test, test)?,
        })
    }
}

fn shape2(name: &str, shape: &[usize]) -> Result<[usize; 2]> {
    match shape {
        [rows, cols] => Ok([*rows, *cols]),
        _ => Err(EngineError::Dataset(format!(
            "{name} must have 2 entries, got {}",
            shape.len()
        ))),
    }
}

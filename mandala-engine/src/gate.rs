// Copyright (c) 2025-2026 brdigetrlol. All rights reserved.
// SPDX-License-Identifier: LicenseRef-Icarus-Proprietary
// See LICENSE in the repository root for full license terms.

//! Validity gate over the prediction header.
//!
//! A prediction is trusted only if every header slot agrees in sign with
//! the reference pattern, both sides beyond `±threshold`.

use crate::codec::Polarity;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidityGate {
    reference: Vec<f32>,
    threshold: f32,
}

impl ValidityGate {
    pub fn new(reference: Vec<f32>, threshold: f32) -> Self {
        Self {
            reference,
            threshold,
        }
    }

    /// Gate with no header; accepts everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn header_len(&self) -> usize {
        self.reference.len()
    }

    pub fn reference(&self) -> &[f32] {
        &self.reference
    }

    pub fn is_valid(&self, header: &[f32]) -> bool {
        is_valid(header, &self.reference, self.threshold)
    }
}

/// Short-circuits on the first slot where header and reference disagree.
///
/// Mismatched lengths never pass; an empty header against an empty
/// reference always does.
pub fn is_valid(header: &[f32], reference: &[f32], threshold: f32) -> bool {
    if header.len() != reference.len() {
        return false;
    }
    header.iter().zip(reference).all(|(&h, &r)| {
        (Polarity::Max.passes(h, threshold) && Polarity::Max.passes(r, threshold))
            || (Polarity::Min.passes(h, threshold) && Polarity::Min.passes(r, threshold))
    })
}

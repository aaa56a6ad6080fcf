// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use crate::Sample;

/// Consumer of generated sample blocks.
///
/// Called only from the delivery thread, once per surviving block and in
/// production order. The block is borrowed for the duration of the call.
pub trait SampleSink: Send + Sync + 'static {
    fn deliver(&self, block: &[Sample]);
}

impl<F> SampleSink for F
where
    F: Fn(&[Sample]) + Send + Sync + 'static,
{
    fn deliver(&self, block: &[Sample]) {
        self(block)
    }
}

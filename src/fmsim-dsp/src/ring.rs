// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::ops::AddAssign;

/// Fixed-length circular buffer with a single cursor.
///
/// `push` overwrites the oldest element, `newest(k)` reads history back
/// from the most recent push. `add_at`/`take_front` treat the buffer as a
/// delay line: values are accumulated ahead of the cursor and consumed (and
/// cleared) at the cursor.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: Vec<T>,
    /// Next slot to write (push) or read (take_front).
    cursor: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    pub fn new(len: usize) -> Self {
        Self {
            buf: vec![T::default(); len],
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.fill(T::default());
        self.cursor = 0;
    }

    fn wrap(&self, offset: usize) -> usize {
        (self.cursor + offset) % self.buf.len()
    }

    /// Store `value` as the newest element. No-op on a zero-length buffer.
    pub fn push(&mut self, value: T) {
        if self.buf.is_empty() {
            return;
        }
        self.buf[self.cursor] = value;
        self.cursor = self.wrap(1);
    }

    /// The `k`-th most recent value (0 = newest). `k` must be below `len()`.
    pub fn newest(&self, k: usize) -> T {
        let n = self.buf.len();
        self.buf[(self.cursor + n - 1 - k) % n]
    }

    /// Iterate from newest to oldest.
    pub fn iter_newest(&self) -> impl Iterator<Item = T> + '_ {
        let (older, newer) = self.buf.split_at(self.cursor);
        older.iter().rev().chain(newer.iter().rev()).copied()
    }

    /// Consume the value under the cursor, leaving a zero behind.
    pub fn take_front(&mut self) -> T {
        let value = std::mem::take(&mut self.buf[self.cursor]);
        self.cursor = self.wrap(1);
        value
    }
}

impl<T: Copy + Default + AddAssign> RingBuffer<T> {
    /// Accumulate `value` into the slot `offset` positions ahead of the cursor.
    pub fn add_at(&mut self, offset: usize, value: T) {
        let idx = self.wrap(offset);
        self.buf[idx] += value;
    }
}

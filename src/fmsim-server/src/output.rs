// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Sink that stores delivered blocks as raw IQ.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use fmsim_core::{Sample, SampleSink, SimError, SimResult};
use tracing::{error, trace};

/// Append `block` as interleaved little-endian f32 I/Q pairs.
pub fn encode_block(block: &[Sample], out: &mut Vec<u8>) {
    out.reserve(block.len() * 8);
    for s in block {
        out.extend_from_slice(&s.re.to_le_bytes());
        out.extend_from_slice(&s.im.to_le_bytes());
    }
}

struct IqFile {
    path: PathBuf,
    writer: BufWriter<File>,
    scratch: Vec<u8>,
}

/// Writes every block to an IQ file, or just counts them without one.
pub struct IqSink {
    file: Option<Mutex<IqFile>>,
    blocks: AtomicU64,
    samples: AtomicU64,
}

impl IqSink {
    pub fn create(path: Option<&Path>) -> SimResult<Self> {
        let file = match path {
            Some(path) => {
                let handle =
                    File::create(path).map_err(|e| SimError::Io(path.to_path_buf(), e.to_string()))?;
                Some(Mutex::new(IqFile {
                    path: path.to_path_buf(),
                    writer: BufWriter::new(handle),
                    scratch: Vec::new(),
                }))
            }
            None => None,
        };
        Ok(Self {
            file,
            blocks: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        })
    }

    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub fn finish(&self) -> SimResult<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
        let path = file.path.clone();
        file.writer
            .flush()
            .map_err(|e| SimError::Io(path, e.to_string()))
    }
}

impl SampleSink for IqSink {
    fn deliver(&self, block: &[Sample]) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
        self.samples.fetch_add(block.len() as u64, Ordering::Relaxed);
        trace!("Block of {} samples delivered", block.len());

        let Some(file) = &self.file else {
            return;
        };
        let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
        let IqFile {
            path,
            writer,
            scratch,
        } = &mut *file;
        scratch.clear();
        encode_block(block, scratch);
        if let Err(e) = writer.write_all(scratch) {
            error!("Failed to write {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_interleaved_little_endian() {
        let mut out = Vec::new();
        encode_block(&[Sample::new(1.0, -2.0)], &mut out);
        assert_eq!(out, [0, 0, 128, 63, 0, 0, 0, 192]);
    }

    #[test]
    fn file_receives_every_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.iq");
        let sink = IqSink::create(Some(&path)).unwrap();
        sink.deliver(&[Sample::new(0.5, 0.25); 3]);
        sink.deliver(&[Sample::new(-1.0, 0.0); 2]);
        sink.finish().unwrap();

        assert_eq!(sink.blocks(), 2);
        assert_eq!(sink.samples(), 5);
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 5 * 8);
        assert_eq!(&bytes[32..36], &(-1.0f32).to_le_bytes());
    }

    #[test]
    fn counting_sink_needs_no_file() {
        let sink = IqSink::create(None).unwrap();
        sink.deliver(&[Sample::default(); 4]);
        assert_eq!(sink.samples(), 4);
        assert!(sink.finish().is_ok());
    }
}

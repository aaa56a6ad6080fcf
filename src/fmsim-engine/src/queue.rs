// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bounded handoff between the scheduler and the delivery thread.
//!
//! The producer never blocks. When the consumer falls more than `max_depth`
//! blocks behind, the whole backlog is discarded along with the incoming
//! block.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use fmsim_core::{Sample, SampleSink, SimError, SimResult};
use tracing::{debug, error, trace, warn};

#[derive(Debug, Default)]
struct QueueState {
    blocks: VecDeque<Vec<Sample>>,
    max_depth: usize,
    shutting_down: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct UserDataQueue {
    shared: Arc<Shared>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl UserDataQueue {
    pub fn new(max_depth: usize) -> Self {
        let shared = Shared::default();
        shared.lock().max_depth = max_depth;
        Self {
            shared: Arc::new(shared),
            consumer: Mutex::new(None),
        }
    }

    /// Start the delivery thread. Any previous consumer is shut down first.
    pub fn spawn_consumer(&self, sink: Arc<dyn SampleSink>) -> SimResult<()> {
        self.shut_down();
        {
            let mut state = self.shared.lock();
            state.blocks.clear();
            state.shutting_down = false;
        }
        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name("fmsim-delivery".to_string())
            .spawn(move || consumer_loop(&shared, sink.as_ref()))
            .map_err(|e| SimError::Config("fmsim-delivery".into(), e.to_string()))?;
        *self.consumer.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Hand a block to the consumer without waiting.
    pub fn deliver(&self, block: Vec<Sample>) {
        let mut state = self.shared.lock();
        if state.shutting_down {
            trace!("Queue shutting down, dropping block");
            return;
        }
        if state.max_depth == 0 {
            if !state.blocks.is_empty() {
                state.blocks.clear();
            }
            error!("Queue size is zero, dropping block");
            return;
        }
        if state.blocks.len() > state.max_depth {
            warn!(
                "Consumer is {} blocks behind (max {}), flushing queue",
                state.blocks.len(),
                state.max_depth
            );
            state.blocks.clear();
            return;
        }
        state.blocks.push_back(block);
        drop(state);
        self.shared.ready.notify_one();
    }

    pub fn depth(&self) -> usize {
        self.shared.lock().blocks.len()
    }

    pub fn max_queue_size(&self) -> usize {
        self.shared.lock().max_depth
    }

    pub fn set_max_queue_size(&self, max_depth: usize) {
        if max_depth == 0 {
            warn!("Queue size set to zero, no data will be delivered");
        }
        self.shared.lock().max_depth = max_depth;
    }

    pub fn is_running(&self) -> bool {
        self.consumer
            .lock()
            .map(|c| c.is_some())
            .unwrap_or(false)
    }

    /// Stop and join the delivery thread. Safe to call repeatedly.
    pub fn shut_down(&self) {
        self.shared.lock().shutting_down = true;
        self.shared.ready.notify_all();
        let handle = self
            .consumer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Delivery thread panicked");
            }
            debug!("Delivery thread joined");
        }
    }
}

impl Drop for UserDataQueue {
    fn drop(&mut self) {
        self.shut_down();
    }
}

fn consumer_loop(shared: &Shared, sink: &dyn SampleSink) {
    loop {
        let block = {
            let mut state = shared.lock();
            while state.blocks.is_empty() && !state.shutting_down {
                state = shared
                    .ready
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
            }
            if state.shutting_down {
                break;
            }
            state.blocks.pop_front()
        };
        if let Some(block) = block {
            sink.deliver(&block);
        }
    }
}

//! Pre-generation buffer.
//!
//! A background task keeps up to `capacity` results ready for the current
//! request so the foreground can pop one immediately. When the buffer is
//! empty the foreground generates synchronously instead.

use crate::engine::ContentEngine;
use crate::generator::{GenerationRequest, GenerationResult};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer has no request; call start first")]
    NotStarted,
}

/// Snapshot of buffer counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BufferStats {
    pub buffered: usize,
    pub capacity: usize,
    pub generated: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct BufferState {
    queue: VecDeque<GenerationResult>,
    request: Option<GenerationRequest>,
    /// Bumped on every request change; results from an older epoch are dropped.
    epoch: u64,
    generated: u64,
    hits: u64,
    misses: u64,
}

impl BufferState {
    fn reset(&mut self, request: Option<GenerationRequest>) {
        self.queue.clear();
        self.request = request;
        self.epoch += 1;
    }
}

pub struct CardBuffer {
    engine: Arc<ContentEngine>,
    capacity: usize,
    state: Arc<Mutex<BufferState>>,
    wake: Arc<Notify>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CardBuffer {
    pub fn new(engine: Arc<ContentEngine>) -> Self {
        Self {
            engine,
            capacity: DEFAULT_CAPACITY,
            state: Arc::new(Mutex::new(BufferState::default())),
            wake: Arc::new(Notify::new()),
            task: std::sync::Mutex::new(None),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Begin buffering for `request`. Must be called inside a tokio runtime.
    pub async fn start(&self, request: GenerationRequest) {
        self.state.lock().await.reset(Some(request));
        {
            let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
            if task.as_ref().map_or(true, |handle| handle.is_finished()) {
                *task = Some(tokio::spawn(refill_loop(
                    self.engine.clone(),
                    self.state.clone(),
                    self.wake.clone(),
                    self.capacity,
                )));
            }
        }
        self.wake.notify_one();
    }

    /// Pop a buffered result, or generate one now on a miss.
    pub async fn next(&self) -> Result<GenerationResult, BufferError> {
        let request = {
            let mut state = self.state.lock().await;
            if let Some(result) = state.queue.pop_front() {
                state.hits += 1;
                drop(state);
                self.wake.notify_one();
                return Ok(result);
            }
            let request = state.request.clone().ok_or(BufferError::NotStarted)?;
            state.misses += 1;
            request
        };

        debug!(session = %request.session_id, "buffer miss");
        let result = self.engine.next_async(&request).await;
        self.wake.notify_one();
        Ok(result)
    }

    /// Switch to a new request, discarding everything buffered for the old one.
    pub async fn update_request(&self, request: GenerationRequest) -> Result<(), BufferError> {
        let mut state = self.state.lock().await;
        if state.request.is_none() {
            return Err(BufferError::NotStarted);
        }
        state.reset(Some(request));
        drop(state);
        self.wake.notify_one();
        Ok(())
    }

    /// Abort the background task and clear the buffer.
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        self.state.lock().await.reset(None);
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn stats(&self) -> BufferStats {
        let state = self.state.lock().await;
        let served = state.hits + state.misses;
        BufferStats {
            buffered: state.queue.len(),
            capacity: self.capacity,
            generated: state.generated,
            hits: state.hits,
            misses: state.misses,
            hit_rate: if served == 0 {
                0.0
            } else {
                state.hits as f64 / served as f64
            },
        }
    }
}

impl Drop for CardBuffer {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}

async fn refill_loop(
    engine: Arc<ContentEngine>,
    state: Arc<Mutex<BufferState>>,
    wake: Arc<Notify>,
    capacity: usize,
) {
    loop {
        let job = {
            let state = state.lock().await;
            match &state.request {
                Some(request) if state.queue.len() < capacity => Some((request.clone(), state.epoch)),
                _ => None,
            }
        };
        let Some((request, epoch)) = job else {
            wake.notified().await;
            continue;
        };

        // Generate without holding the lock so the foreground can still pop.
        let result = engine.next_async(&request).await;

        let mut state = state.lock().await;
        if state.epoch == epoch && state.queue.len() < capacity {
            state.queue.push_back(result);
            state.generated += 1;
        } else {
            debug!(session = %request.session_id, "discarding stale buffered card");
        }
        drop(state);
        tokio::task::yield_now().await;
    }
}

//! Bounded SPSC frame queue between the serial reader and analysis threads
//!
//! Strict FIFO; the consumer blocks on a condvar with a timeout so the
//! shutdown flag is observed. On overflow the oldest frame is dropped,
//! preserving latest-value semantics for the live exhibit.

use super::transport::CardiacFrame;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub struct FrameQueue {
    frames: Mutex<VecDeque<CardiacFrame>>,
    available: Condvar,
    capacity: usize,
}

impl FrameQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue a frame, dropping the oldest when full.
    ///
    /// Returns true when a frame was dropped.
    pub fn push(&self, frame: CardiacFrame) -> bool {
        let mut frames = self.frames.lock().unwrap();
        let dropped = if frames.len() == self.capacity {
            frames.pop_front();
            true
        } else {
            false
        };
        frames.push_back(frame);
        drop(frames);
        self.available.notify_one();
        dropped
    }

    /// Dequeue the oldest frame, waiting up to `timeout` for one to arrive
    pub fn pop_timeout(&self, timeout: Duration) -> Option<CardiacFrame> {
        let deadline = Instant::now() + timeout;
        let mut frames = self.frames.lock().unwrap();
        loop {
            if let Some(frame) = frames.pop_front() {
                return Some(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .available
                .wait_timeout(frames, deadline - now)
                .unwrap();
            frames = guard;
        }
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

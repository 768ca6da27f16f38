//! Many-producer, single-consumer hand-off queues.
//!
//! Producers push under a short lock; the consumer swaps the whole buffer out in one
//! step and processes it without holding the lock.

use crate::commands::GameCommand;
use log::warn;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub struct SwapQueue<T> {
    items: Mutex<Vec<T>>,
}

/// Per-shard inbox of commands awaiting the next tick.
pub type CommandQueue = SwapQueue<GameCommand>;

impl<T> Default for SwapQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T> SwapQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.items.lock().unwrap_or_else(|poisoned| {
            warn!("Queue lock was poisoned; recovering");
            poisoned.into_inner()
        })
    }

    pub fn push(&self, item: T) {
        self.lock().push(item);
    }

    /// Takes everything pushed so far, oldest first.
    pub fn drain(&self) -> Vec<T> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

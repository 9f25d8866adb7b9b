//! Concurrency governor
//!
//! A counting admission gate. Slots are granted strictly in the order they
//! were requested (the underlying tokio semaphore is fair), and a slot is freed
//! when its [`GovernorPermit`] is dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds how many callers may hold a slot at once
#[derive(Debug, Clone)]
pub struct Governor {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// A held governor slot; dropping it releases the slot
#[derive(Debug)]
pub struct GovernorPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for GovernorPermit {
    fn drop(&mut self) {
        // Runs before the semaphore permit field is released
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Governor {
    /// Creates a governor with `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits for a free slot
    ///
    /// Returns None only if the governor has been closed.
    pub async fn acquire(&self) -> Option<GovernorPermit> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Some(GovernorPermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Wakes every waiter with None and refuses future acquisitions
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of slots ever held at the same time
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

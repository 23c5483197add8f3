// Lock-free admission control: a bounded count of active job slots

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct Admission {
    active: AtomicUsize,
    max: usize,
}

impl Admission {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            max,
        })
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Takes a slot if one is free. Never blocks; retries only on CAS contention.
    /// The slot is released when the returned guard is dropped.
    pub fn try_reserve(self: &Arc<Self>) -> Option<AdmissionSlot> {
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if current >= self.max {
                return None;
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(AdmissionSlot {
                        admission: self.clone(),
                    });
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One held unit of the concurrency ceiling. Dropping it releases the slot, so
/// release happens exactly once on every exit path.
#[derive(Debug)]
pub struct AdmissionSlot {
    admission: Arc<Admission>,
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.admission.release();
        tracing::debug!(
            active = self.admission.active(),
            max = self.admission.max,
            "admission slot released"
        );
    }
}

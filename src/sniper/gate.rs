//! Bounded admission of pipeline runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Caps the number of pipelines in flight. Cheap to clone; clones share the
/// same counter.
#[derive(Clone)]
pub struct ConcurrencyGate {
    in_flight: Arc<AtomicUsize>,
    capacity: usize,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            capacity,
        }
    }

    /// Take a slot if one is free. Never waits.
    pub fn try_acquire(&self) -> Option<PipelineSlot> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .ok()
            .map(|prev| {
                debug!(in_flight = prev + 1, capacity = self.capacity, "pipeline slot acquired");
                PipelineSlot {
                    in_flight: self.in_flight.clone(),
                }
            })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// One unit of gate capacity. Released on drop.
#[must_use = "dropping the slot releases it immediately"]
pub struct PipelineSlot {
    in_flight: Arc<AtomicUsize>,
}

impl PipelineSlot {
    pub fn release(self) {}
}

impl Drop for PipelineSlot {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_one_admits_single_pipeline() {
        let gate = ConcurrencyGate::new(1);
        let slot = gate.try_acquire().unwrap();
        assert_eq!(gate.in_flight(), 1);
        assert!(gate.try_acquire().is_none());
        assert_eq!(gate.in_flight(), 1);

        slot.release();
        assert_eq!(gate.in_flight(), 0);
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn test_drop_releases() {
        let gate = ConcurrencyGate::new(2);
        {
            let _a = gate.try_acquire().unwrap();
            let _b = gate.try_acquire().unwrap();
            assert!(gate.try_acquire().is_none());
        }
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.capacity(), 2);
    }

    #[test]
    fn test_zero_capacity_admits_nothing() {
        let gate = ConcurrencyGate::new(0);
        assert!(gate.try_acquire().is_none());
    }

    #[tokio::test]
    async fn test_released_when_task_panics() {
        let gate = ConcurrencyGate::new(1);
        let slot = gate.try_acquire().unwrap();
        let handle = tokio::spawn(async move {
            let _slot = slot;
            panic!("pipeline blew up");
        });
        assert!(handle.await.is_err());
        assert_eq!(gate.in_flight(), 0);
    }

    #[test]
    fn test_concurrent_acquire_never_exceeds_capacity() {
        let gate = ConcurrencyGate::new(3);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || {
                    let mut held = Vec::new();
                    for _ in 0..1000 {
                        if let Some(slot) = gate.try_acquire() {
                            assert!(gate.in_flight() <= 3);
                            held.push(slot);
                        }
                        if held.len() > 1 {
                            held.clear();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(gate.in_flight(), 0);
    }
}

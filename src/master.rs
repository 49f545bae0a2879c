//! State shared between the slave state machines and the application
//! threads waiting on them.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Wake-up signal for requests. Waiters remember the generation they saw
/// and re-check their request once it moves.
#[derive(Debug, Default)]
pub struct WaitQueue {
    generation: AtomicUsize,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            generation: AtomicUsize::new(0),
        }
    }

    pub fn wake_all(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub fn generation(&self) -> usize {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether anything was woken since `seen` was read.
    pub fn has_woken_since(&self, seen: usize) -> bool {
        self.generation() != seen
    }
}

/// Number of slave configurations in progress.
#[derive(Debug, Default)]
pub struct ConfigBusy {
    count: AtomicUsize,
}

impl ConfigBusy {
    pub const fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
        }
    }

    pub fn begin(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn end(&self) {
        let _ = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.count() == 0
    }
}

#[derive(Debug, Default)]
pub struct MasterSignals {
    pub request_queue: WaitQueue,
    pub config_busy: ConfigBusy,
}

impl MasterSignals {
    pub const fn new() -> Self {
        Self {
            request_queue: WaitQueue::new(),
            config_busy: ConfigBusy::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_busy_never_underflows() {
        let busy = ConfigBusy::new();
        busy.begin();
        busy.begin();
        busy.end();
        assert_eq!(busy.count(), 1);
        busy.end();
        busy.end();
        assert!(busy.is_idle());
    }

    #[test]
    fn wake_moves_generation() {
        let queue = WaitQueue::new();
        let seen = queue.generation();
        assert!(!queue.has_woken_since(seen));
        queue.wake_all();
        assert!(queue.has_woken_since(seen));
    }
}

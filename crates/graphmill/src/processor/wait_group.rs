use std::pin::pin;
use std::sync::Arc;

use portable_atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Counts outstanding workers and wakes waiters when the count drops to zero.
///
/// Each worker holds a [`WaitGuard`]; dropping the guard (normally, on error
/// or while unwinding from a panic) releases exactly one slot.
#[derive(Debug, Clone, Default)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    count: AtomicUsize,
    notify: Notify,
}

/// A held wait group slot.
#[derive(Debug)]
#[must_use = "dropping the guard releases the slot immediately"]
pub struct WaitGuard {
    inner: Arc<Inner>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves one slot.
    pub fn add(&self) -> WaitGuard {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
        WaitGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of slots still held.
    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Resolves once every slot has been released.
    pub async fn wait(&self) {
        loop {
            let mut notified = pin!(self.inner.notify.notified());
            // Register before checking the count so a release between the
            // check and the await still wakes us.
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::*;

    fn fail() -> usize {
        panic!("worker failed")
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_time()
            .build()
            .unwrap()
    }

    #[test]
    fn empty_group_is_immediately_done() {
        runtime().block_on(WaitGroup::new().wait());
    }

    #[test]
    fn waits_for_every_guard() {
        runtime().block_on(async {
            let group = WaitGroup::new();
            for i in 0..16_u64 {
                let guard = group.add();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(i % 4)).await;
                    drop(guard);
                });
            }
            group.wait().await;
            assert_eq!(group.count(), 0);
        });
    }

    #[test]
    fn panicking_worker_still_releases_its_slot() {
        runtime().block_on(async {
            let group = WaitGroup::new();
            let guard = group.add();
            let handle = tokio::spawn(async move {
                let _guard = guard;
                fail()
            });
            group.wait().await;
            assert!(handle.await.unwrap_err().is_panic());
        });
    }
}

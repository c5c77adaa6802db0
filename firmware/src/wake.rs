//! Reference-counted CPU-frequency wake/idle guard.
//!
//! Any in-flight session (a CCID APDU, an SSH console command) acquires a
//! [`WakeToken`]; the frequency is raised to Max on the 0→1 transition and
//! dropped back to Min on 1→0 (SPEC_FULL §5, §9 "Cooperative CPU frequency
//! scaling"). The real ARM frequency scaling register is the out-of-scope
//! hardware collaborator; [`CpuFreq`] is its trait boundary.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub trait CpuFreq: Send + Sync {
    fn set_max(&self);
    fn set_min(&self);
}

/// Stand-in for the real ARM core frequency register.
pub struct NoopCpuFreq;

impl CpuFreq for NoopCpuFreq {
    fn set_max(&self) {
        tracing::debug!("cpu frequency -> max");
    }
    fn set_min(&self) {
        tracing::debug!("cpu frequency -> min");
    }
}

pub struct Waker {
    freq: Arc<dyn CpuFreq>,
    count: AtomicU32,
}

impl Waker {
    pub fn new(freq: Arc<dyn CpuFreq>) -> Waker {
        Waker { freq, count: AtomicU32::new(0) }
    }

    /// Acquires a wake token, raising the CPU frequency on the first
    /// concurrent acquisition. Releasing the last outstanding token lowers it
    /// again.
    pub fn acquire(self: &Arc<Self>) -> WakeToken {
        if self.count.fetch_add(1, Ordering::SeqCst) == 0 {
            self.freq.set_max();
        }
        WakeToken { waker: self.clone() }
    }

    pub fn awake(&self) -> bool {
        self.count.load(Ordering::SeqCst) > 0
    }
}

pub struct WakeToken {
    waker: Arc<Waker>,
}

impl Drop for WakeToken {
    fn drop(&mut self) {
        if self.waker.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.waker.freq.set_min();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingFreq {
        max_calls: Mutex<u32>,
        min_calls: Mutex<u32>,
    }

    impl CpuFreq for CountingFreq {
        fn set_max(&self) {
            *self.max_calls.lock().unwrap() += 1;
        }
        fn set_min(&self) {
            *self.min_calls.lock().unwrap() += 1;
        }
    }

    #[test]
    fn raises_only_on_first_acquire() {
        let freq = Arc::new(CountingFreq::default());
        let waker = Arc::new(Waker::new(freq.clone()));
        let t1 = waker.acquire();
        let t2 = waker.acquire();
        assert_eq!(*freq.max_calls.lock().unwrap(), 1);
        drop(t1);
        assert_eq!(*freq.min_calls.lock().unwrap(), 0);
        drop(t2);
        assert_eq!(*freq.min_calls.lock().unwrap(), 1);
    }

    #[test]
    fn awake_reflects_outstanding_tokens() {
        let freq = Arc::new(NoopCpuFreq);
        let waker = Arc::new(Waker::new(freq));
        assert!(!waker.awake());
        let t = waker.acquire();
        assert!(waker.awake());
        drop(t);
        assert!(!waker.awake());
    }
}

//! Cooperative watchdog timer.
//!
//! A background thread samples time every 100 ms. When the gap since the
//! last pet exceeds the timeout it fires the registered handler exactly
//! once, then re-arms `last_pet` so the handler is not re-fired on every
//! subsequent sample. The handler runs on the watchdog thread and is
//! contained: a panicking handler can never take the thread down.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{error, info, warn};

/// Sampling interval for the watchdog thread.
pub const WATCHDOG_POLL: Duration = Duration::from_millis(100);

type TimeoutHandler = Arc<dyn Fn() + Send + Sync>;

struct WatchdogShared {
    /// Process-lifetime time anchor for the millisecond counters.
    anchor: Instant,
    /// Armed flag; the thread only checks timeouts while set.
    enabled: AtomicBool,
    /// Thread liveness flag.
    running: AtomicBool,
    /// Timeout [ms].
    timeout_ms: AtomicU64,
    /// Milliseconds since `anchor` of the last pet.
    last_pet_ms: AtomicU64,
    handler: RwLock<Option<TimeoutHandler>>,
}

impl WatchdogShared {
    fn now_ms(&self) -> u64 {
        self.anchor.elapsed().as_millis() as u64
    }
}

/// Cooperative watchdog. Pet it from every external command; when starved
/// it fires the timeout handler.
pub struct Watchdog {
    shared: Arc<WatchdogShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    /// Disarmed watchdog; no thread yet.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(WatchdogShared {
                anchor: Instant::now(),
                enabled: AtomicBool::new(false),
                running: AtomicBool::new(false),
                timeout_ms: AtomicU64::new(5000),
                last_pet_ms: AtomicU64::new(0),
                handler: RwLock::new(None),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Arm the watchdog with `timeout_ms` and a timeout handler, starting
    /// the sampling thread if it is not already up.
    pub fn start(&self, timeout_ms: u64, on_timeout: TimeoutHandler) {
        let shared = &self.shared;
        shared.timeout_ms.store(timeout_ms, Ordering::Release);
        *shared.handler.write() = Some(on_timeout);
        shared.last_pet_ms.store(shared.now_ms(), Ordering::Release);
        shared.enabled.store(true, Ordering::Release);

        let mut thread = self.thread.lock();
        let stale = thread.as_ref().is_none_or(|h| h.is_finished());
        if stale {
            shared.running.store(true, Ordering::Release);
            let shared = Arc::clone(shared);
            *thread = Some(
                std::thread::Builder::new()
                    .name("rig-watchdog".into())
                    .spawn(move || watchdog_worker(shared))
                    .expect("spawn watchdog thread"),
            );
        }
        info!(timeout_ms, "watchdog started");
    }

    /// Disarm without stopping the thread; `start` re-arms.
    pub fn stop(&self) {
        self.shared.enabled.store(false, Ordering::Release);
        info!("watchdog stopped");
    }

    /// Refresh the activity timestamp.
    #[inline]
    pub fn pet(&self) {
        self.shared
            .last_pet_ms
            .store(self.shared.now_ms(), Ordering::Release);
    }

    /// Whether the watchdog is armed.
    #[inline]
    pub fn is_armed(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Configured timeout [ms].
    #[inline]
    pub fn timeout_ms(&self) -> u64 {
        self.shared.timeout_ms.load(Ordering::Acquire)
    }

    /// Milliseconds since the last pet.
    pub fn since_last_pet_ms(&self) -> u64 {
        self.shared
            .now_ms()
            .saturating_sub(self.shared.last_pet_ms.load(Ordering::Acquire))
    }

    /// Stop the sampling thread and join it.
    pub fn shutdown(&self) {
        self.shared.enabled.store(false, Ordering::Release);
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn watchdog_worker(shared: Arc<WatchdogShared>) {
    while shared.running.load(Ordering::Acquire) {
        std::thread::sleep(WATCHDOG_POLL);
        if !shared.enabled.load(Ordering::Acquire) {
            continue;
        }
        let now = shared.now_ms();
        let last_pet = shared.last_pet_ms.load(Ordering::Acquire);
        let timeout = shared.timeout_ms.load(Ordering::Acquire);
        if now.saturating_sub(last_pet) > timeout {
            warn!(
                timeout_ms = timeout,
                starved_ms = now.saturating_sub(last_pet),
                "watchdog timeout"
            );
            let handler = shared.handler.read().clone();
            if let Some(handler) = handler {
                if catch_unwind(AssertUnwindSafe(|| handler())).is_err() {
                    error!("watchdog timeout handler panicked");
                }
            }
            // Re-arm so the handler fires once per starvation, not once
            // per 100 ms sample.
            shared.last_pet_ms.store(shared.now_ms(), Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn fire_counter() -> (Arc<AtomicUsize>, TimeoutHandler) {
        let count = Arc::new(AtomicUsize::new(0));
        let captured = Arc::clone(&count);
        let handler: TimeoutHandler = Arc::new(move || {
            captured.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    #[test]
    fn fires_once_per_starvation() {
        let watchdog = Watchdog::new();
        let (count, handler) = fire_counter();
        watchdog.start(200, handler);

        // Starve well past one timeout but short of two.
        std::thread::sleep(Duration::from_millis(350));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        watchdog.shutdown();
    }

    #[test]
    fn petting_prevents_the_timeout() {
        let watchdog = Watchdog::new();
        let (count, handler) = fire_counter();
        watchdog.start(200, handler);

        for _ in 0..5 {
            std::thread::sleep(Duration::from_millis(100));
            watchdog.pet();
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        watchdog.shutdown();
    }

    #[test]
    fn disarmed_watchdog_never_fires() {
        let watchdog = Watchdog::new();
        let (count, handler) = fire_counter();
        watchdog.start(100, handler);
        watchdog.stop();
        assert!(!watchdog.is_armed());

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        watchdog.shutdown();
    }

    #[test]
    fn panicking_handler_does_not_kill_the_thread() {
        let watchdog = Watchdog::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let captured = Arc::clone(&fired);
        watchdog.start(
            100,
            Arc::new(move || {
                captured.fetch_add(1, Ordering::SeqCst);
                panic!("handler bug");
            }),
        );

        // Two starvation windows; a dead thread would only record one.
        std::thread::sleep(Duration::from_millis(600));
        assert!(fired.load(Ordering::SeqCst) >= 2);

        watchdog.shutdown();
    }
}

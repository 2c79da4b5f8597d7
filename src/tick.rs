use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Interval between advances when the clock is driven by the timer thread.
pub const TICK_INTERVAL: Duration = Duration::from_millis(10);

/// The simulator's virtual CPU clock.
///
/// `ticks` counts every advance since startup. `active_ticks` counts, summed
/// across cores, the ticks on which a worker actually issued an instruction;
/// the difference is idle time. Ticks are the only time unit the scheduler
/// and Sleep instructions observe.
pub struct TickClock {
    ticks: AtomicU64,
    active_ticks: AtomicU64,
}

impl TickClock {
    pub fn new() -> Self {
        TickClock {
            ticks: AtomicU64::new(0),
            active_ticks: AtomicU64::new(0),
        }
    }

    /// Current tick. Monotonic; may advance between two reads.
    pub fn now(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Advance the clock by one tick. Called from exactly one driver task.
    pub fn advance(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Record that a core issued an instruction on the current tick.
    pub fn note_active(&self) {
        self.active_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_ticks(&self) -> u64 {
        self.active_ticks.load(Ordering::Relaxed)
    }

    pub fn idle_ticks(&self) -> u64 {
        self.now().saturating_sub(self.active_ticks())
    }

    /// Block until the clock moves strictly past `last_seen` and return the
    /// new value. Busy-waits with `yield_now`; tick pacing is coarse (10 ms)
    /// so the spin window is short.
    pub fn wait_for_edge(&self, last_seen: u64) -> u64 {
        loop {
            let now = self.now();
            if now > last_seen {
                return now;
            }
            thread::yield_now();
        }
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Background timer advancing a [`TickClock`] every [`TICK_INTERVAL`].
///
/// Owns the driver thread; dropping the driver stops and joins it.
pub struct TickDriver {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TickDriver {
    pub fn spawn(clock: Arc<TickClock>) -> Self {
        Self::spawn_with_interval(clock, TICK_INTERVAL)
    }

    pub fn spawn_with_interval(clock: Arc<TickClock>, interval: Duration) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("tick-driver".into())
            .spawn(move || {
                while flag.load(Ordering::Relaxed) {
                    thread::sleep(interval);
                    clock.advance();
                }
            })
            .expect("failed to spawn tick driver thread");

        TickDriver {
            running,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TickDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

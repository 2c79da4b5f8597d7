use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use quantos::memory::backing_store::BackingStore;
use quantos::memory::MemoryManager;
use quantos::tick::{TickClock, TickDriver};

static NEXT_STORE: AtomicU32 = AtomicU32::new(0);

/// Unique swap-file path per call so parallel tests never collide.
pub fn temp_store_path(tag: &str) -> PathBuf {
    let n = NEXT_STORE.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "quantos-{}-{}-{}.swap",
        tag,
        std::process::id(),
        n
    ))
}

pub fn make_memory(tag: &str, total_bytes: u64, page_size: usize, slots: u32) -> Arc<MemoryManager> {
    let store = BackingStore::create(&temp_store_path(tag), slots, page_size)
        .expect("backing store creation failed");
    Arc::new(MemoryManager::new(total_bytes, page_size, store))
}

/// Clock plus a fast driver so execute() sees frequent tick edges.
pub fn fast_clock() -> (Arc<TickClock>, TickDriver) {
    let clock = Arc::new(TickClock::new());
    let driver = TickDriver::spawn_with_interval(Arc::clone(&clock), Duration::from_micros(200));
    (clock, driver)
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

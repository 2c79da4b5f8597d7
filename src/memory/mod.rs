pub mod backing_store;
pub mod page_table;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::process::Pid;
use backing_store::BackingStore;
use page_table::{Frame, ProcessMemorySpace, PteFlags};

/// Sentinel returned by [`MemoryManager::get_var_address`] when the symbol
/// table is full or the process is unknown. Callers must check for it.
pub const INVALID_VAR_ADDRESS: u32 = u32::MAX;

/// Per-process symbol table capacity.
pub const MAX_SYMBOLS_PER_PROCESS: usize = 32;

/// Every symbol occupies one 16-bit word.
pub const SYMBOL_STRIDE: u32 = 2;

/// Hard cap on virtual address space per process (1 GiB).
const MAX_VIRTUAL_BYTES_PER_PROCESS: u64 = 1 << 30;

struct MemoryCounters {
    page_faults: AtomicU64,
    pages_paged_in: AtomicU64,
    pages_paged_out: AtomicU64,
}

/// Snapshot of paging statistics for status displays.
#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    pub total_frames: usize,
    pub used_frames: usize,
    pub page_size: usize,
    pub process_count: usize,
    pub page_faults: u64,
    pub pages_paged_in: u64,
    pub pages_paged_out: u64,
}

struct MemoryInner {
    ram: Vec<u8>,
    frames: Vec<Frame>,
    free_frames: VecDeque<u32>,
    fifo_queue: VecDeque<u32>,
    spaces: HashMap<Pid, ProcessMemorySpace>,
    next_allocation_order: u64,
}

/// Owner of all physical frames, page tables and the swap store.
///
/// Every public operation takes the single interior lock; paging statistics
/// are lock-free atomics so the status reporter never blocks an access.
/// Backing-store I/O happens while the interior lock is held; the store's
/// own file lock nests strictly inside it.
pub struct MemoryManager {
    page_size: usize,
    total_frames: usize,
    max_pages_per_process: usize,
    inner: Mutex<MemoryInner>,
    store: BackingStore,
    counters: MemoryCounters,
}

impl MemoryManager {
    pub fn new(total_bytes: u64, page_size: usize, store: BackingStore) -> Self {
        let total_frames = (total_bytes as usize / page_size).max(1);
        MemoryManager {
            page_size,
            total_frames,
            max_pages_per_process: (MAX_VIRTUAL_BYTES_PER_PROCESS / page_size as u64) as usize,
            inner: Mutex::new(MemoryInner {
                ram: vec![0u8; total_frames * page_size],
                frames: vec![Frame::free(); total_frames],
                free_frames: (0..total_frames as u32).collect(),
                fifo_queue: VecDeque::new(),
                spaces: HashMap::new(),
                next_allocation_order: 0,
            }),
            store,
            counters: MemoryCounters {
                page_faults: AtomicU64::new(0),
                pages_paged_in: AtomicU64::new(0),
                pages_paged_out: AtomicU64::new(0),
            },
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Admission check: a process of `bytes` fits iff its page count does
    /// not exceed the per-process virtual cap. Physical pressure is handled
    /// later by eviction, not rejected here.
    pub fn can_allocate_process(&self, bytes: u64) -> bool {
        let pages_needed = bytes.div_ceil(self.page_size as u64) as usize;
        pages_needed <= self.max_pages_per_process
    }

    /// Create the address space for `pid`. Returns false if one exists.
    pub fn create_process_space(&self, pid: Pid, bytes: u64) -> bool {
        let max_pages = (bytes.div_ceil(self.page_size as u64) as usize)
            .clamp(1, self.max_pages_per_process);
        let mut inner = self.lock_inner();
        if inner.spaces.contains_key(&pid) {
            return false;
        }
        inner
            .spaces
            .insert(pid, ProcessMemorySpace::new(pid, max_pages));
        true
    }

    /// Widen `pid`'s virtual cap so that at least `bytes` of address space
    /// are reachable. Used when a program image is placed above the data
    /// segment at admission.
    pub fn reserve_virtual_range(&self, pid: Pid, bytes: u64) -> bool {
        let pages = (bytes.div_ceil(self.page_size as u64) as usize)
            .clamp(1, self.max_pages_per_process);
        let mut inner = self.lock_inner();
        match inner.spaces.get_mut(&pid) {
            Some(space) => {
                space.max_pages = space.max_pages.max(pages);
                true
            }
            None => false,
        }
    }

    /// Tear down `pid`'s space: release its frames back to the free list
    /// and its swap slots back to the store. Unknown pids are a no-op.
    pub fn destroy_process_space(&self, pid: Pid) {
        let mut inner = self.lock_inner();
        let Some(space) = inner.spaces.remove(&pid) else {
            return;
        };
        for slot in space.backing_slots.values() {
            self.store.free_slot(*slot);
        }
        let mut freed = Vec::new();
        for (idx, frame) in inner.frames.iter_mut().enumerate() {
            if matches!(frame.owner, Some((owner, _)) if owner == pid) {
                frame.owner = None;
                freed.push(idx as u32);
            }
        }
        if !freed.is_empty() {
            inner.fifo_queue.retain(|f| !freed.contains(f));
            inner.free_frames.extend(freed);
        }
    }

    /// Resolve a fault on `(pid, page)`, allocating (and possibly evicting)
    /// a frame. Returns false on segfault or when no frame can be secured.
    pub fn handle_page_fault(&self, pid: Pid, page: u32) -> bool {
        let mut inner = self.lock_inner();
        inner
            .ensure_present(pid, page, &self.store, self.page_size, &self.counters)
            .is_some()
    }

    pub fn read_byte(&self, pid: Pid, vaddr: u32) -> Option<u8> {
        let mut inner = self.lock_inner();
        let (page, offset) = self.split(vaddr);
        let frame =
            inner.ensure_present(pid, page, &self.store, self.page_size, &self.counters)?;
        inner.touch(pid, page, PteFlags::REFERENCED);
        Some(inner.ram[frame as usize * self.page_size + offset])
    }

    pub fn write_byte(&self, pid: Pid, vaddr: u32, value: u8) -> bool {
        let mut inner = self.lock_inner();
        let (page, offset) = self.split(vaddr);
        let Some(frame) =
            inner.ensure_present(pid, page, &self.store, self.page_size, &self.counters)
        else {
            return false;
        };
        inner.touch(pid, page, PteFlags::REFERENCED | PteFlags::DIRTY);
        inner.ram[frame as usize * self.page_size + offset] = value;
        true
    }

    /// Little-endian 16-bit read: two sequential byte accesses.
    pub fn read_word(&self, pid: Pid, vaddr: u32) -> Option<u16> {
        let low = self.read_byte(pid, vaddr)?;
        let high = self.read_byte(pid, vaddr.wrapping_add(1))?;
        Some(u16::from_le_bytes([low, high]))
    }

    pub fn write_word(&self, pid: Pid, vaddr: u32, value: u16) -> bool {
        let [low, high] = value.to_le_bytes();
        self.write_byte(pid, vaddr, low) && self.write_byte(pid, vaddr.wrapping_add(1), high)
    }

    /// Look up `name` in the symbol table, allocating the next stride-2
    /// address in `pid`'s symbol segment on first use. Returns
    /// [`INVALID_VAR_ADDRESS`] when the table is full or the pid unknown.
    pub fn get_var_address(
        &self,
        pid: Pid,
        symbol_table: &mut HashMap<String, u32>,
        name: &str,
    ) -> u32 {
        if let Some(&addr) = symbol_table.get(name) {
            return addr;
        }
        if symbol_table.len() >= MAX_SYMBOLS_PER_PROCESS {
            return INVALID_VAR_ADDRESS;
        }
        let mut inner = self.lock_inner();
        let Some(space) = inner.spaces.get_mut(&pid) else {
            return INVALID_VAR_ADDRESS;
        };
        let addr = space.next_var_address;
        space.next_var_address += SYMBOL_STRIDE;
        symbol_table.insert(name.to_string(), addr);
        addr
    }

    pub fn is_page_present(&self, pid: Pid, page: u32) -> bool {
        let inner = self.lock_inner();
        inner
            .spaces
            .get(&pid)
            .and_then(|space| space.entry(page))
            .map(|entry| entry.is_present())
            .unwrap_or(false)
    }

    pub fn allocated_pages(&self, pid: Pid) -> usize {
        let inner = self.lock_inner();
        inner
            .spaces
            .get(&pid)
            .map(|space| space.allocated_pages)
            .unwrap_or(0)
    }

    pub fn stats(&self) -> MemoryStats {
        let inner = self.lock_inner();
        MemoryStats {
            total_frames: self.total_frames,
            used_frames: self.total_frames - inner.free_frames.len(),
            page_size: self.page_size,
            process_count: inner.spaces.len(),
            page_faults: self.counters.page_faults.load(Ordering::Relaxed),
            pages_paged_in: self.counters.pages_paged_in.load(Ordering::Relaxed),
            pages_paged_out: self.counters.pages_paged_out.load(Ordering::Relaxed),
        }
    }

    fn split(&self, vaddr: u32) -> (u32, usize) {
        (
            vaddr / self.page_size as u32,
            (vaddr as usize) % self.page_size,
        )
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("memory lock poisoned")
    }
}

impl MemoryInner {
    /// Fault-in path. Returns the frame holding `(pid, page)`, or `None` on
    /// segfault (page beyond the cap, unknown pid) or frame exhaustion.
    fn ensure_present(
        &mut self,
        pid: Pid,
        page: u32,
        store: &BackingStore,
        page_size: usize,
        counters: &MemoryCounters,
    ) -> Option<u32> {
        {
            let space = self.spaces.get_mut(&pid)?;
            if page as usize >= space.max_pages {
                return None;
            }
            space.grow_to(page);
            let entry = space.page_table[page as usize];
            if entry.is_present() {
                return Some(entry.frame);
            }
        }

        counters.page_faults.fetch_add(1, Ordering::Relaxed);

        let frame = match self.free_frames.pop_front() {
            Some(frame) => {
                self.fifo_queue.push_back(frame);
                frame
            }
            None => self.evict_and_allocate(store, page_size, counters)?,
        };

        self.next_allocation_order += 1;
        self.frames[frame as usize] = Frame {
            owner: Some((pid, page)),
            allocation_order: self.next_allocation_order,
        };

        let start = frame as usize * page_size;
        let space = self.spaces.get_mut(&pid)?;
        if let Some(&slot) = space.backing_slots.get(&page) {
            if let Err(err) = store.read_page(slot, &mut self.ram[start..start + page_size]) {
                log::error!("swap-in of slot {} failed: {}", slot, err);
                self.release_frame(frame);
                return None;
            }
            counters.pages_paged_in.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ram[start..start + page_size].fill(0);
        }

        let space = self.spaces.get_mut(&pid)?;
        let entry = &mut space.page_table[page as usize];
        entry.frame = frame;
        entry.flags = PteFlags::PRESENT | PteFlags::VALID | PteFlags::REFERENCED;
        space.allocated_pages += 1;
        Some(frame)
    }

    /// FIFO replacement: the queue head is the victim. A dirty victim is
    /// written to its backing slot (allocated on demand) before the frame
    /// is handed back, re-queued as the newest allocation.
    fn evict_and_allocate(
        &mut self,
        store: &BackingStore,
        page_size: usize,
        counters: &MemoryCounters,
    ) -> Option<u32> {
        let victim = self.fifo_queue.pop_front()?;

        if let Some((owner, page)) = self.frames[victim as usize].owner {
            if let Some(space) = self.spaces.get_mut(&owner) {
                if space.page_table[page as usize].is_dirty() {
                    let slot = match space.backing_slots.get(&page).copied() {
                        Some(slot) => slot,
                        None => match store.allocate_slot() {
                            Some(slot) => {
                                space.backing_slots.insert(page, slot);
                                slot
                            }
                            None => {
                                self.fifo_queue.push_front(victim);
                                return None;
                            }
                        },
                    };
                    let start = victim as usize * page_size;
                    if let Err(err) = store.write_page(slot, &self.ram[start..start + page_size])
                    {
                        log::error!("swap-out to slot {} failed: {}", slot, err);
                        self.fifo_queue.push_front(victim);
                        return None;
                    }
                    counters.pages_paged_out.fetch_add(1, Ordering::Relaxed);
                }
                let space = self.spaces.get_mut(&owner)?;
                let entry = &mut space.page_table[page as usize];
                entry.flags.remove(PteFlags::PRESENT | PteFlags::DIRTY);
                space.allocated_pages -= 1;
            }
        }

        self.frames[victim as usize].owner = None;
        self.fifo_queue.push_back(victim);
        Some(victim)
    }

    fn touch(&mut self, pid: Pid, page: u32, flags: PteFlags) {
        if let Some(space) = self.spaces.get_mut(&pid) {
            if let Some(entry) = space.page_table.get_mut(page as usize) {
                entry.flags.insert(flags);
            }
        }
    }

    fn release_frame(&mut self, frame: u32) {
        self.frames[frame as usize] = Frame::free();
        self.fifo_queue.retain(|&f| f != frame);
        self.free_frames.push_back(frame);
    }
}

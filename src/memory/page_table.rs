use std::collections::HashMap;

use bitflags::bitflags;

use crate::process::Pid;

bitflags! {
    /// Page-table entry flags. `PRESENT` implies `VALID`; `DIRTY` means the
    /// page has been written since it was last brought in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PteFlags: u8 {
        const PRESENT    = 1 << 0;
        const DIRTY      = 1 << 1;
        const REFERENCED = 1 << 2;
        const VALID      = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PageTableEntry {
    pub frame: u32,
    pub flags: PteFlags,
}

impl PageTableEntry {
    pub fn is_present(&self) -> bool {
        self.flags.contains(PteFlags::PRESENT)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(PteFlags::DIRTY)
    }
}

/// Paged virtual address space of one process.
///
/// The page table grows on first touch of a page; `backing_slots` only ever
/// contains pages that were evicted dirty at least once. `next_var_address`
/// is the stride-2 allocation cursor for the symbol segment.
pub struct ProcessMemorySpace {
    pub pid: Pid,
    pub page_table: Vec<PageTableEntry>,
    pub backing_slots: HashMap<u32, u32>,
    pub allocated_pages: usize,
    pub max_pages: usize,
    pub next_var_address: u32,
}

impl ProcessMemorySpace {
    pub fn new(pid: Pid, max_pages: usize) -> Self {
        ProcessMemorySpace {
            pid,
            page_table: Vec::new(),
            backing_slots: HashMap::new(),
            allocated_pages: 0,
            max_pages,
            next_var_address: 0,
        }
    }

    /// Ensure the page table covers `page`, growing with empty entries.
    pub fn grow_to(&mut self, page: u32) {
        let needed = page as usize + 1;
        if self.page_table.len() < needed {
            self.page_table.resize(needed, PageTableEntry::default());
        }
    }

    pub fn entry(&self, page: u32) -> Option<&PageTableEntry> {
        self.page_table.get(page as usize)
    }
}

/// One physical frame's bookkeeping record. The frame contents themselves
/// live in the manager's flat RAM vector.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    /// Owning (process, virtual page) when the frame is in use.
    pub owner: Option<(Pid, u32)>,
    /// Monotonic stamp of the last allocation, for inspection of FIFO order.
    pub allocation_order: u64,
}

impl Frame {
    pub fn free() -> Self {
        Frame {
            owner: None,
            allocation_order: 0,
        }
    }

    pub fn is_free(&self) -> bool {
        self.owner.is_none()
    }
}

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// Disk-backed swap area organized as fixed-size slots.
///
/// Slot `i` occupies bytes `[i * page_size, (i + 1) * page_size)` of the
/// file; there is no header. The file is pre-sized at construction and the
/// store outlives individual process spaces within a run.
pub struct BackingStore {
    inner: Mutex<StoreInner>,
    page_size: usize,
    max_slots: u32,
}

struct StoreInner {
    file: File,
    allocated: Vec<bool>,
}

impl BackingStore {
    pub fn create(path: &Path, max_slots: u32, page_size: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(max_slots as u64 * page_size as u64)?;

        Ok(BackingStore {
            inner: Mutex::new(StoreInner {
                file,
                allocated: vec![false; max_slots as usize],
            }),
            page_size,
            max_slots,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn max_slots(&self) -> u32 {
        self.max_slots
    }

    pub fn allocated_slots(&self) -> u32 {
        let inner = self.inner.lock().expect("backing store lock poisoned");
        inner.allocated.iter().filter(|&&used| used).count() as u32
    }

    /// Reserve a free slot, or `None` when the store is exhausted.
    pub fn allocate_slot(&self) -> Option<u32> {
        let mut inner = self.inner.lock().expect("backing store lock poisoned");
        let slot = inner.allocated.iter().position(|&used| !used)?;
        inner.allocated[slot] = true;
        Some(slot as u32)
    }

    pub fn free_slot(&self, slot: u32) {
        let mut inner = self.inner.lock().expect("backing store lock poisoned");
        if let Some(used) = inner.allocated.get_mut(slot as usize) {
            *used = false;
        }
    }

    pub fn write_page(&self, slot: u32, buf: &[u8]) -> io::Result<()> {
        if slot >= self.max_slots || buf.len() != self.page_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "bad slot or page buffer size",
            ));
        }
        let mut inner = self.inner.lock().expect("backing store lock poisoned");
        inner
            .file
            .seek(SeekFrom::Start(slot as u64 * self.page_size as u64))?;
        inner.file.write_all(buf)
    }

    pub fn read_page(&self, slot: u32, buf: &mut [u8]) -> io::Result<()> {
        if slot >= self.max_slots || buf.len() != self.page_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "bad slot or page buffer size",
            ));
        }
        let mut inner = self.inner.lock().expect("backing store lock poisoned");
        inner
            .file
            .seek(SeekFrom::Start(slot as u64 * self.page_size as u64))?;
        inner.file.read_exact(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_store(name: &str, slots: u32, page: usize) -> (BackingStore, PathBuf) {
        let path = std::env::temp_dir().join(format!("quantos-test-{}-{}.bin", name, std::process::id()));
        let store = BackingStore::create(&path, slots, page).unwrap();
        (store, path)
    }

    #[test]
    fn slots_allocate_until_exhausted() {
        let (store, path) = temp_store("exhaust", 3, 64);
        assert_eq!(store.allocate_slot(), Some(0));
        assert_eq!(store.allocate_slot(), Some(1));
        assert_eq!(store.allocate_slot(), Some(2));
        assert_eq!(store.allocate_slot(), None);

        store.free_slot(1);
        assert_eq!(store.allocate_slot(), Some(1));
        drop(store);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn page_round_trip() {
        let (store, path) = temp_store("roundtrip", 4, 64);
        let slot = store.allocate_slot().unwrap();

        let page: Vec<u8> = (0..64).map(|i| i as u8 ^ 0xA5).collect();
        store.write_page(slot, &page).unwrap();

        let mut back = vec![0u8; 64];
        store.read_page(slot, &mut back).unwrap();
        assert_eq!(back, page);
        drop(store);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn bad_slot_and_size_are_rejected() {
        let (store, path) = temp_store("bounds", 2, 64);
        assert!(store.write_page(5, &[0u8; 64]).is_err());
        assert!(store.write_page(0, &[0u8; 32]).is_err());
        let mut buf = vec![0u8; 64];
        assert!(store.read_page(9, &mut buf).is_err());
        drop(store);
        let _ = std::fs::remove_file(path);
    }
}

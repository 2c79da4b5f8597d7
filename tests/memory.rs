mod common;

use quantos::memory::{INVALID_VAR_ADDRESS, MAX_SYMBOLS_PER_PROCESS};
use quantos::process::Pid;

use common::make_memory;

#[test]
fn words_are_little_endian() {
    let memory = make_memory("word-endian", 4096, 256, 16);
    let pid = Pid(1);
    memory.create_process_space(pid, 1024);

    assert!(memory.write_word(pid, 0x10, 0xBEEF));
    assert_eq!(memory.read_byte(pid, 0x10), Some(0xEF));
    assert_eq!(memory.read_byte(pid, 0x11), Some(0xBE));
    assert_eq!(memory.read_word(pid, 0x10), Some(0xBEEF));
}

#[test]
fn unknown_pid_and_out_of_range_accesses_fail() {
    let memory = make_memory("bad-access", 4096, 256, 16);
    let pid = Pid(1);
    memory.create_process_space(pid, 512); // 2 pages of 256

    assert_eq!(memory.read_byte(Pid(99), 0), None);
    assert!(!memory.write_byte(Pid(99), 0, 1));

    // Page 2 is beyond this process's cap: segfault.
    assert_eq!(memory.read_byte(pid, 512), None);
    assert!(!memory.write_byte(pid, 512, 1));
}

#[test]
fn fifo_eviction_follows_allocation_order() {
    // Two physical frames of 64 bytes; one process touching four pages.
    let memory = make_memory("fifo", 128, 64, 16);
    let pid = Pid(1);
    memory.create_process_space(pid, 256);

    assert!(memory.write_byte(pid, 0, 10)); // page 0
    assert!(memory.write_byte(pid, 64, 11)); // page 1
    assert_eq!(memory.stats().page_faults, 2);
    assert_eq!(memory.stats().pages_paged_out, 0);

    // Touching page 2 evicts the FIFO head: page 0.
    assert!(memory.write_byte(pid, 128, 12));
    assert!(!memory.is_page_present(pid, 0));
    assert!(memory.is_page_present(pid, 1));
    assert!(memory.is_page_present(pid, 2));
    assert_eq!(memory.stats().page_faults, 3);

    // Touching page 3 evicts page 1.
    assert!(memory.write_byte(pid, 192, 13));
    assert!(!memory.is_page_present(pid, 1));
    assert!(memory.is_page_present(pid, 2));
    assert!(memory.is_page_present(pid, 3));
    assert_eq!(memory.stats().page_faults, 4);

    // Both victims were dirty, so both were written out.
    assert_eq!(memory.stats().pages_paged_out, 2);
    assert_eq!(memory.stats().pages_paged_in, 0);
}

#[test]
fn evicted_pages_swap_back_in_with_contents_intact() {
    let memory = make_memory("swap-back", 128, 64, 16);
    let pid = Pid(1);
    memory.create_process_space(pid, 256);

    memory.write_byte(pid, 0, 0xAA);
    memory.write_byte(pid, 64, 0xBB);
    memory.write_byte(pid, 128, 0xCC); // evicts page 0
    memory.write_byte(pid, 192, 0xDD); // evicts page 1

    // Page 0 faults back in from the backing store.
    assert_eq!(memory.read_byte(pid, 0), Some(0xAA));
    assert!(memory.stats().pages_paged_in >= 1);
    assert_eq!(memory.read_byte(pid, 64), Some(0xBB));
    assert_eq!(memory.stats().pages_paged_in, 2);
}

#[test]
fn clean_pages_are_discarded_not_swapped() {
    let memory = make_memory("clean-evict", 128, 64, 16);
    let pid = Pid(1);
    memory.create_process_space(pid, 256);

    // Zero-fill faults via reads only: nothing is dirty.
    assert_eq!(memory.read_byte(pid, 0), Some(0));
    assert_eq!(memory.read_byte(pid, 64), Some(0));
    assert_eq!(memory.read_byte(pid, 128), Some(0));
    assert_eq!(memory.read_byte(pid, 192), Some(0));

    assert_eq!(memory.stats().page_faults, 4);
    assert_eq!(memory.stats().pages_paged_out, 0);
    assert_eq!(memory.stats().pages_paged_in, 0);
}

#[test]
fn backing_store_exhaustion_fails_the_access() {
    // One frame, zero swap slots: the second dirty page has nowhere to go.
    let memory = make_memory("exhausted", 64, 64, 0);
    let pid = Pid(1);
    memory.create_process_space(pid, 256);

    assert!(memory.write_byte(pid, 0, 1));
    assert!(!memory.write_byte(pid, 64, 2));
    // The original mapping survives the failed eviction.
    assert!(memory.is_page_present(pid, 0));
    assert_eq!(memory.read_byte(pid, 0), Some(1));
}

#[test]
fn var_addresses_stride_by_two_and_cap() {
    let memory = make_memory("symbols", 4096, 256, 16);
    let pid = Pid(1);
    memory.create_process_space(pid, 1024);

    let mut table = std::collections::HashMap::new();
    let a = memory.get_var_address(pid, &mut table, "a");
    let b = memory.get_var_address(pid, &mut table, "b");
    assert_eq!(a, 0);
    assert_eq!(b, 2);
    // Repeated lookups return the existing address.
    assert_eq!(memory.get_var_address(pid, &mut table, "a"), a);

    for i in 2..MAX_SYMBOLS_PER_PROCESS {
        let addr = memory.get_var_address(pid, &mut table, &format!("s{}", i));
        assert_eq!(addr, (i as u32) * 2);
    }
    assert_eq!(table.len(), MAX_SYMBOLS_PER_PROCESS);
    assert_eq!(
        memory.get_var_address(pid, &mut table, "one-too-many"),
        INVALID_VAR_ADDRESS
    );
    assert_eq!(table.len(), MAX_SYMBOLS_PER_PROCESS);
}

#[test]
fn unknown_pid_gets_no_var_address() {
    let memory = make_memory("symbols-nopid", 4096, 256, 16);
    let mut table = std::collections::HashMap::new();
    assert_eq!(
        memory.get_var_address(Pid(5), &mut table, "x"),
        INVALID_VAR_ADDRESS
    );
}

#[test]
fn admission_respects_the_virtual_cap() {
    let memory = make_memory("admission", 4096, 256, 16);
    assert!(memory.can_allocate_process(64));
    assert!(memory.can_allocate_process(65536));
    // The 1 GiB virtual cap, not physical size, is the limit.
    assert!(memory.can_allocate_process(1 << 30));
    assert!(!memory.can_allocate_process((1 << 30) + 1));
}

#[test]
fn destroying_a_space_releases_frames_and_slots() {
    let memory = make_memory("destroy", 256, 64, 16);
    let pid = Pid(1);
    memory.create_process_space(pid, 256);

    for page in 0..4u32 {
        memory.write_byte(pid, page * 64, page as u8);
    }
    assert_eq!(memory.stats().used_frames, 4);
    assert_eq!(memory.stats().process_count, 1);

    memory.destroy_process_space(pid);
    assert_eq!(memory.stats().used_frames, 0);
    assert_eq!(memory.stats().process_count, 0);

    // The frames are reusable by a fresh process.
    let pid2 = Pid(2);
    memory.create_process_space(pid2, 256);
    for page in 0..4u32 {
        assert!(memory.write_byte(pid2, page * 64, 0xFF));
    }
    assert_eq!(memory.stats().used_frames, 4);
}

#[test]
fn duplicate_space_creation_is_rejected() {
    let memory = make_memory("dup-space", 4096, 256, 16);
    let pid = Pid(1);
    assert!(memory.create_process_space(pid, 512));
    assert!(!memory.create_process_space(pid, 512));
}

#[test]
fn word_access_spanning_pages_faults_both_sides() {
    let memory = make_memory("span", 4096, 64, 16);
    let pid = Pid(1);
    memory.create_process_space(pid, 256);

    // Straddles the page 0 / page 1 boundary.
    assert!(memory.write_word(pid, 63, 0xABCD));
    assert_eq!(memory.read_word(pid, 63), Some(0xABCD));
    assert!(memory.is_page_present(pid, 0));
    assert!(memory.is_page_present(pid, 1));
}

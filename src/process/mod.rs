pub mod encoder;
pub mod generator;
pub mod instruction;

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use spin::Mutex as SpinMutex;

use crate::memory::MemoryManager;
use crate::tick::TickClock;
use crate::walltime;
use encoder::{EncodedInstruction, InstructionEncoder, INSTRUCTION_SIZE};
use instruction::Instruction;

/// Unique process identifier. Monotonic per run, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u16);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessState {
    Ready = 0,
    Running = 1,
    Waiting = 2,
    Finished = 3,
}

impl ProcessState {
    fn from_u8(raw: u8) -> ProcessState {
        match raw {
            1 => ProcessState::Running,
            2 => ProcessState::Waiting,
            3 => ProcessState::Finished,
            _ => ProcessState::Ready,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Ready => "Ready",
            ProcessState::Running => "Running",
            ProcessState::Waiting => "Waiting",
            ProcessState::Finished => "Finished",
        }
    }
}

/// Sentinel for "not assigned to any core".
pub const NO_CORE: u16 = u16::MAX;

/// Virtual address where the encoded program image begins. The symbol
/// segment (stride-2 variable words) occupies the addresses below it.
pub const CODE_SEGMENT_BASE: u32 = 0x100;

struct ProgramImage {
    instructions: Vec<Instruction>,
    encoder: InstructionEncoder,
    /// True once the program has been encoded into process memory; the
    /// program counter then advances in byte units through the pager.
    loaded: bool,
}

/// A simulated process: identity, program, cursor, symbol table and logs.
///
/// Single-value state (state, core, pc, sleep deadline) is atomic so the
/// status reporter can read it without taking any lock; aggregate state sits
/// behind short-held spin locks. The worker that currently runs the process
/// is the only mutator of the program cursor.
pub struct Process {
    pub id: Pid,
    pub name: String,
    memory: Arc<MemoryManager>,
    clock: Arc<TickClock>,
    state: AtomicU8,
    assigned_core: AtomicU16,
    sleep_until_tick: AtomicU64,
    program_counter: AtomicU32,
    program: SpinMutex<ProgramImage>,
    symbol_table: SpinMutex<HashMap<String, u32>>,
    print_log: SpinMutex<Vec<String>>,
    output_buffer: SpinMutex<Vec<String>>,
    created_at: SystemTime,
    start_time: SpinMutex<Option<SystemTime>>,
    end_time: SpinMutex<Option<SystemTime>>,
}

impl Process {
    pub fn new(id: Pid, name: &str, memory: Arc<MemoryManager>, clock: Arc<TickClock>) -> Self {
        Process {
            id,
            name: name.to_string(),
            memory,
            clock,
            state: AtomicU8::new(ProcessState::Ready as u8),
            assigned_core: AtomicU16::new(NO_CORE),
            sleep_until_tick: AtomicU64::new(0),
            program_counter: AtomicU32::new(0),
            program: SpinMutex::new(ProgramImage {
                instructions: Vec::new(),
                encoder: InstructionEncoder::new(),
                loaded: false,
            }),
            symbol_table: SpinMutex::new(HashMap::new()),
            print_log: SpinMutex::new(Vec::new()),
            output_buffer: SpinMutex::new(Vec::new()),
            created_at: SystemTime::now(),
            start_time: SpinMutex::new(None),
            end_time: SpinMutex::new(None),
        }
    }

    // ---- program management ----

    pub fn set_program(&self, instructions: Vec<Instruction>) {
        let mut program = self.program.lock();
        program.instructions = instructions;
    }

    pub fn add_instruction(&self, instruction: Instruction) {
        self.program.lock().instructions.push(instruction);
    }

    /// Default workload for interactively created screens.
    pub fn generate_print_program(&self, count: usize) {
        let mut program = self.program.lock();
        for _ in 0..count {
            program.instructions.push(Instruction::Print {
                message: format!("Hello world from {}!", self.name),
                variable: None,
            });
        }
    }

    pub fn program_len(&self) -> usize {
        self.program.lock().instructions.len()
    }

    /// Replace the program with its loop-free expansion.
    pub fn unroll_program(&self) {
        let mut program = self.program.lock();
        if program.instructions.is_empty() {
            return;
        }
        let expanded = instruction::unroll(&program.instructions);
        program.instructions = expanded;
    }

    /// Encode the (already unrolled) program into process memory: the code
    /// segment at [`CODE_SEGMENT_BASE`], the string table right behind it.
    /// On success the cursor switches to byte addressing.
    pub fn load_program_into_memory(&self) -> bool {
        let mut program = self.program.lock();
        let program = &mut *program;

        let mut encoded = Vec::with_capacity(program.instructions.len());
        for inst in &program.instructions {
            match program.encoder.encode(inst) {
                Some(e) => encoded.push(e),
                None => {
                    log::error!(
                        "process '{}': cannot encode {} instruction; program not loaded",
                        self.name,
                        inst.mnemonic()
                    );
                    return false;
                }
            }
        }

        let code_len = encoded.len() as u32 * INSTRUCTION_SIZE;
        let table_base = CODE_SEGMENT_BASE + code_len;
        let image_end = table_base + program.encoder.table_bytes();
        if !self.memory.reserve_virtual_range(self.id, image_end as u64) {
            log::warn!(
                "process '{}' has no address space; keeping in-memory program",
                self.name
            );
            return false;
        }

        let mut addr = CODE_SEGMENT_BASE;
        for record in &encoded {
            for (offset, byte) in record.to_bytes().iter().enumerate() {
                if !self.write_memory_byte(addr + offset as u32, *byte) {
                    log::error!(
                        "process '{}': fault while writing program image at 0x{:04X}",
                        self.name,
                        addr
                    );
                    return false;
                }
            }
            addr += INSTRUCTION_SIZE;
        }

        if !program.encoder.store_table(self, table_base) {
            log::error!(
                "process '{}': fault while writing string table at 0x{:04X}",
                self.name,
                table_base
            );
            return false;
        }

        program.loaded = true;
        self.program_counter
            .store(CODE_SEGMENT_BASE, Ordering::Release);
        true
    }

    /// Read and decode the instruction at the current cursor through the
    /// paging layer. `None` past the end of the code segment.
    pub fn fetch_instruction(&self) -> Option<Instruction> {
        let program = self.program.lock();
        if !program.loaded {
            return None;
        }
        let pc = self.program_counter.load(Ordering::Acquire);
        let end = CODE_SEGMENT_BASE + program.instructions.len() as u32 * INSTRUCTION_SIZE;
        if pc >= end {
            return None;
        }

        let mut bytes = [0u8; INSTRUCTION_SIZE as usize];
        for (offset, slot) in bytes.iter_mut().enumerate() {
            *slot = self.read_memory_byte(pc + offset as u32)?;
        }
        program.encoder.decode(&EncodedInstruction::from_bytes(bytes))
    }

    fn next_instruction(&self) -> Option<Instruction> {
        let program = self.program.lock();
        if program.loaded {
            drop(program);
            self.fetch_instruction()
        } else {
            let index = self.program_counter.load(Ordering::Acquire) as usize;
            program.instructions.get(index).cloned()
        }
    }

    fn advance_cursor(&self) {
        let step = if self.program.lock().loaded {
            INSTRUCTION_SIZE
        } else {
            1
        };
        self.program_counter.fetch_add(step, Ordering::AcqRel);
    }

    pub fn is_finished(&self) -> bool {
        let program = self.program.lock();
        let len = program.instructions.len() as u32;
        let pc = self.program_counter.load(Ordering::Acquire);
        if program.loaded {
            pc >= CODE_SEGMENT_BASE + len * INSTRUCTION_SIZE
        } else {
            pc >= len
        }
    }

    /// Zero-based index of the next instruction, for status displays.
    pub fn current_instruction_index(&self) -> u32 {
        let program = self.program.lock();
        let len = program.instructions.len() as u32;
        let pc = self.program_counter.load(Ordering::Acquire);
        let index = if program.loaded {
            pc.saturating_sub(CODE_SEGMENT_BASE) / INSTRUCTION_SIZE
        } else {
            pc
        };
        index.min(len)
    }

    // ---- execution ----

    /// Advance the process on `core_id` by at most `quantum` ticks (0 means
    /// run to completion). An instruction is issued every `delay + 1` ticks.
    /// Returns when the program ends, the quantum expires, or the process
    /// goes to sleep.
    pub fn execute(&self, core_id: u16, quantum: u32, delay: u32) {
        {
            let mut start = self.start_time.lock();
            if start.is_none() {
                *start = Some(SystemTime::now());
            }
        }
        self.set_assigned_core(core_id);

        let run_indefinitely = quantum == 0;
        let mut ticks_executed: u32 = 0;
        let mut last_tick = self.clock.now();

        while !self.is_finished() && (run_indefinitely || ticks_executed < quantum) {
            if self.state() == ProcessState::Waiting {
                break;
            }
            last_tick = self.clock.wait_for_edge(last_tick);
            ticks_executed += 1;

            if ticks_executed % (delay + 1) == 0 {
                let Some(instruction) = self.next_instruction() else {
                    break;
                };
                self.clock.note_active();
                instruction.execute(self);
                self.advance_cursor();
            }

            if self.state() == ProcessState::Waiting {
                break;
            }
        }

        if self.is_finished() {
            let mut end = self.end_time.lock();
            if end.is_none() {
                *end = Some(SystemTime::now());
            }
        }
    }

    // ---- atomic state ----

    pub fn state(&self) -> ProcessState {
        ProcessState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ProcessState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn assigned_core(&self) -> u16 {
        self.assigned_core.load(Ordering::Acquire)
    }

    pub fn set_assigned_core(&self, core: u16) {
        self.assigned_core.store(core, Ordering::Release);
    }

    pub fn sleep_until(&self) -> u64 {
        self.sleep_until_tick.load(Ordering::Acquire)
    }

    pub fn set_sleep_until(&self, tick: u64) {
        self.sleep_until_tick.store(tick, Ordering::Release);
    }

    pub fn clock_now(&self) -> u64 {
        self.clock.now()
    }

    // ---- memory access ----

    pub fn var_address(&self, name: &str) -> u32 {
        let mut symbols = self.symbol_table.lock();
        self.memory.get_var_address(self.id, &mut symbols, name)
    }

    pub fn symbol_count(&self) -> usize {
        self.symbol_table.lock().len()
    }

    pub fn read_memory_byte(&self, vaddr: u32) -> Option<u8> {
        self.memory.read_byte(self.id, vaddr)
    }

    pub fn write_memory_byte(&self, vaddr: u32, value: u8) -> bool {
        self.memory.write_byte(self.id, vaddr, value)
    }

    pub fn read_memory_word(&self, vaddr: u32) -> Option<u16> {
        self.memory.read_word(self.id, vaddr)
    }

    pub fn write_memory_word(&self, vaddr: u32, value: u16) -> bool {
        self.memory.write_word(self.id, vaddr, value)
    }

    // ---- logs and reporting ----

    fn core_label(&self) -> String {
        let core = self.assigned_core();
        if core == NO_CORE {
            "-".to_string()
        } else {
            core.to_string()
        }
    }

    /// Append a timestamped entry to the print log and the output buffer.
    pub fn log_line(&self, body: &str) {
        let entry = format!(
            "{} Core: {} \"{}\"",
            walltime::stamp(),
            self.core_label(),
            body
        );
        self.print_log.lock().push(entry.clone());
        self.output_buffer.lock().push(entry);
    }

    /// Same as [`log_line`](Self::log_line) but flags the user-facing copy.
    pub fn log_error(&self, body: &str) {
        let entry = format!(
            "{} Core: {} \"{}\"",
            walltime::stamp(),
            self.core_label(),
            body
        );
        self.print_log.lock().push(entry);
        self.output_buffer.lock().push(format!("[ERROR] {}", body));
    }

    pub fn push_print(&self, message: &str) {
        let entry = format!(
            "{} Core: {} \"PRINT {}\"",
            walltime::stamp(),
            self.core_label(),
            message
        );
        self.print_log.lock().push(entry);
        self.output_buffer.lock().push(format!("[PRINT] {}", message));
    }

    pub fn print_log_snapshot(&self) -> Vec<String> {
        self.print_log.lock().clone()
    }

    /// Move accumulated user-facing lines out of the process, for the shell
    /// to append to the attached session.
    pub fn drain_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.output_buffer.lock())
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// One-line status entry for `screen -ls` and the utilization report.
    pub fn status_line(&self) -> String {
        let state = self.state();
        let when = walltime::datetime(SystemTime::now());
        let current = self.current_instruction_index();
        let total = self.program_len();
        match state {
            ProcessState::Finished => format!(
                "{:<12} ({})  {:<10} {:>4}/{:<4}",
                self.name, when, "Finished", current, total
            ),
            ProcessState::Running => format!(
                "{:<12} ({})  Core: {:<4} {:>4}/{:<4}",
                self.name,
                when,
                self.core_label(),
                current,
                total
            ),
            other => format!(
                "{:<12} ({})  {:<10} {:>4}/{:<4}",
                self.name,
                when,
                other.as_str(),
                current,
                total
            ),
        }
    }

    /// Full per-process report used by the `process-smi` command.
    pub fn smi_string(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Process name: {}\n", self.name));
        out.push_str(&format!("ID: {}\n", self.id));
        if self.state() == ProcessState::Finished {
            out.push_str("Status: Finished!\n");
        }
        out.push_str("Logs:\n");
        for entry in self.print_log.lock().iter() {
            out.push_str("  ");
            out.push_str(entry);
            out.push('\n');
        }
        out.push_str(&format!(
            "Current instruction line: {}\n",
            self.current_instruction_index()
        ));
        out.push_str(&format!("Lines of code: {}\n", self.program_len()));
        out
    }

    /// Write the smi report to `logs/process_smi_<name>.txt`.
    pub fn save_smi_report(&self) -> io::Result<PathBuf> {
        fs::create_dir_all("logs")?;
        let path = PathBuf::from(format!("logs/process_smi_{}.txt", self.name));
        fs::write(&path, self.smi_string())?;
        Ok(path)
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        self.memory.destroy_process_space(self.id);
    }
}

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::config::{ConfigError, SystemConfig};
use crate::memory::backing_store::BackingStore;
use crate::memory::MemoryManager;
use crate::process::generator::{GeneratorConfig, ProcessGenerator};
use crate::process::{Pid, Process};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::tick::{TickClock, TickDriver};

/// Swap file created in the working directory at `initialize`.
pub const BACKING_STORE_FILE: &str = "quantos-backing-store.bin";

/// Swap capacity in pages.
const BACKING_SLOTS: u32 = 1024;

/// Instruction count of the default workload behind `screen -S`.
const SCREEN_PROGRAM_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("backing store: {0}")]
    Io(#[from] io::Error),
}

/// Why a process could not be admitted. The messages are the exact strings
/// shown in the session output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("invalid memory allocation")]
    InvalidMemorySize,
    #[error("not enough memory")]
    InsufficientMemory,
}

/// The assembled simulator: clock, memory, scheduler and (when started)
/// the background process generator. Built once by `initialize`; dropping
/// it shuts every thread down.
pub struct System {
    pub config: SystemConfig,
    pub clock: Arc<TickClock>,
    pub memory: Arc<MemoryManager>,
    pub scheduler: Arc<Scheduler>,
    ticker: Option<TickDriver>,
    generator: Option<ProcessGenerator>,
    next_pid: Arc<AtomicU16>,
}

impl System {
    pub fn initialize(config: SystemConfig) -> Result<System, SystemError> {
        Self::initialize_at(config, Path::new(BACKING_STORE_FILE))
    }

    /// Bring the core up with an explicit backing-store path (tests point
    /// this at a temp file).
    pub fn initialize_at(config: SystemConfig, store_path: &Path) -> Result<System, SystemError> {
        let clock = Arc::new(TickClock::new());
        let store = BackingStore::create(
            store_path,
            BACKING_SLOTS,
            config.mem_per_frame as usize,
        )?;
        let memory = Arc::new(MemoryManager::new(
            config.max_overall_mem,
            config.mem_per_frame as usize,
            store,
        ));
        let scheduler = Arc::new(Scheduler::new(
            SchedulerConfig {
                num_cores: config.num_cpu,
                kind: config.scheduler,
                quantum_cycles: config.quantum_cycles,
                delay: config.delays_per_exec,
                memory_backed_exec: config.memory_backed_exec,
            },
            Arc::clone(&clock),
        ));
        Scheduler::start(&scheduler);
        let ticker = TickDriver::spawn(Arc::clone(&clock));

        log::info!(
            "system up: {} cores, {:?}, {} bytes physical memory, {} byte pages",
            config.num_cpu,
            config.scheduler,
            config.max_overall_mem,
            config.mem_per_frame
        );

        Ok(System {
            config,
            clock,
            memory,
            scheduler,
            ticker: Some(ticker),
            generator: None,
            next_pid: Arc::new(AtomicU16::new(1)),
        })
    }

    /// Create, provision and admit a user process with `bytes` of memory.
    /// The size must be a power of two in [64, 65536].
    pub fn spawn_process(&self, name: &str, bytes: u64) -> Result<Arc<Process>, AdmissionError> {
        if !(64..=65536).contains(&bytes) || !bytes.is_power_of_two() {
            return Err(AdmissionError::InvalidMemorySize);
        }
        if !self.memory.can_allocate_process(bytes) {
            return Err(AdmissionError::InsufficientMemory);
        }

        let pid = Pid(self.next_pid.fetch_add(1, Ordering::Relaxed));
        self.memory.create_process_space(pid, bytes);
        let process = Arc::new(Process::new(
            pid,
            name,
            Arc::clone(&self.memory),
            Arc::clone(&self.clock),
        ));
        process.generate_print_program(SCREEN_PROGRAM_LEN);
        self.scheduler.add_process(Arc::clone(&process));
        Ok(process)
    }

    /// Start the background generator. False if it is already running.
    pub fn start_generator(&mut self) -> bool {
        if self.generator.is_some() {
            return false;
        }
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E3779B97F4A7C15);
        self.generator = Some(ProcessGenerator::spawn(
            Arc::clone(&self.scheduler),
            Arc::clone(&self.memory),
            Arc::clone(&self.clock),
            GeneratorConfig {
                batch_process_freq: self.config.batch_process_freq,
                min_ins: self.config.min_ins,
                max_ins: self.config.max_ins,
                min_mem_per_proc: self.config.min_mem_per_proc,
                max_mem_per_proc: self.config.max_mem_per_proc,
            },
            Arc::clone(&self.next_pid),
            seed,
        ));
        true
    }

    /// Stop the background generator. False if it was not running.
    pub fn stop_generator(&mut self) -> bool {
        match self.generator.take() {
            Some(mut generator) => {
                generator.stop();
                true
            }
            None => false,
        }
    }

    pub fn is_generating(&self) -> bool {
        self.generator.is_some()
    }

    /// Plain-text system summary for the `smi` command.
    pub fn smi_text(&self) -> String {
        let stats = self.memory.stats();
        let cores_used = self.scheduler.cores_used();
        let total_cores = self.config.num_cpu as usize;
        let utilization = if total_cores > 0 {
            cores_used as f32 / total_cores as f32 * 100.0
        } else {
            0.0
        };

        let mut out = String::new();
        out.push_str("--- quantos summary -------------------------\n");
        out.push_str(&format!(
            "Ticks: {} total, {} active, {} idle\n",
            self.clock.now(),
            self.clock.active_ticks(),
            self.clock.idle_ticks()
        ));
        out.push_str(&format!(
            "CPU:   {}/{} cores busy ({:.2}%)\n",
            cores_used, total_cores, utilization
        ));
        out.push_str(&format!(
            "Mem:   {}/{} frames used, {} B pages\n",
            stats.used_frames, stats.total_frames, stats.page_size
        ));
        out.push_str(&format!(
            "Pages: {} faults, {} in, {} out\n",
            stats.page_faults, stats.pages_paged_in, stats.pages_paged_out
        ));
        out.push_str(&format!(
            "Procs: {} spaces, {} queued/sleeping, {} finished\n",
            stats.process_count,
            self.scheduler.pending_count(),
            self.scheduler.finished_processes().len()
        ));
        out.push_str("---------------------------------------------\n");
        out
    }

    /// Cooperative teardown. The generator stops first, then the scheduler
    /// drains its workers; the tick driver stops last so in-flight FCFS
    /// slices can still make progress.
    pub fn shutdown(&mut self) {
        self.stop_generator();
        self.scheduler.stop();
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
    }
}

impl Drop for System {
    fn drop(&mut self) {
        self.shutdown();
    }
}

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::process::{Process, ProcessState, NO_CORE};
use crate::tick::TickClock;

/// Scheduling policy. FCFS is round-robin with an unbounded quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerType {
    Fcfs,
    Rr,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub num_cores: u16,
    pub kind: SchedulerType,
    pub quantum_cycles: u32,
    pub delay: u32,
    /// Encode admitted programs into process memory (bytecode fetch path)
    /// instead of interpreting the in-memory form.
    pub memory_backed_exec: bool,
}

/// Multi-core preemptive scheduler.
///
/// One worker thread per simulated core, each with a dedicated queue and
/// work-stealing from its peers. A separate admission thread wakes sleeping
/// processes and distributes newly admitted ones round-robin across the
/// core queues. Lock order where several are held: ready, then waiting,
/// then finished; core queues are only ever held one at a time.
pub struct Scheduler {
    config: SchedulerConfig,
    clock: Arc<TickClock>,
    ready_queue: Mutex<VecDeque<Arc<Process>>>,
    waiting_queue: Mutex<VecDeque<Arc<Process>>>,
    running_list: Mutex<Vec<Arc<Process>>>,
    finished_list: Mutex<Vec<Arc<Process>>>,
    core_queues: Vec<Mutex<VecDeque<Arc<Process>>>>,
    running: AtomicBool,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, clock: Arc<TickClock>) -> Self {
        let core_queues = (0..config.num_cores)
            .map(|_| Mutex::new(VecDeque::new()))
            .collect();
        Scheduler {
            config,
            clock,
            ready_queue: Mutex::new(VecDeque::new()),
            waiting_queue: Mutex::new(VecDeque::new()),
            running_list: Mutex::new(Vec::new()),
            finished_list: Mutex::new(Vec::new()),
            core_queues,
            running: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start the admission thread and one worker per core. Idempotent.
    pub fn start(scheduler: &Arc<Scheduler>) {
        if scheduler.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut threads = scheduler.lock(&scheduler.threads);
        for core in 0..scheduler.config.num_cores {
            let worker = Arc::clone(scheduler);
            threads.push(
                thread::Builder::new()
                    .name(format!("cpu-worker-{}", core))
                    .spawn(move || worker.worker_loop(core))
                    .expect("failed to spawn cpu worker thread"),
            );
        }
        let admission = Arc::clone(scheduler);
        threads.push(
            thread::Builder::new()
                .name("scheduler-admission".into())
                .spawn(move || admission.admission_loop())
                .expect("failed to spawn admission thread"),
        );
        log::info!(
            "scheduler started: {} cores, {:?}, quantum {}",
            scheduler.config.num_cores,
            scheduler.config.kind,
            scheduler.config.quantum_cycles
        );
    }

    /// Cooperative shutdown: workers finish their current quantum, then all
    /// threads are joined. The tick clock must keep advancing until this
    /// returns, or an unbounded FCFS slice could never complete.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let handles = std::mem::take(&mut *self.lock(&self.threads));
        for handle in handles {
            let _ = handle.join();
        }
        log::info!("scheduler stopped");
    }

    /// Admit a process: unroll its loops, optionally encode it into its
    /// memory image, and queue it for distribution to a core.
    pub fn add_process(&self, process: Arc<Process>) {
        process.unroll_program();
        if self.config.memory_backed_exec && !process.load_program_into_memory() {
            log::warn!(
                "process '{}' runs from its in-memory program",
                process.name
            );
        }
        process.set_state(ProcessState::Ready);
        self.lock(&self.ready_queue).push_back(process);
    }

    /// Quantum handed to `Process::execute`: unbounded under FCFS.
    fn quantum(&self) -> u32 {
        match self.config.kind {
            SchedulerType::Fcfs => 0,
            SchedulerType::Rr => self.config.quantum_cycles,
        }
    }

    /// Wake sleepers whose deadline passed and spread the global ready
    /// queue across the core queues round-robin.
    fn admission_loop(&self) {
        let mut next_core: usize = 0;
        let cores = self.core_queues.len();

        while self.running.load(Ordering::Acquire) {
            let now = self.clock.now();

            {
                let mut waiting = self.lock(&self.waiting_queue);
                let mut still_waiting = VecDeque::new();
                while let Some(process) = waiting.pop_front() {
                    if now >= process.sleep_until() {
                        process.set_state(ProcessState::Ready);
                        self.lock(&self.core_queues[next_core]).push_back(process);
                        next_core = (next_core + 1) % cores;
                    } else {
                        still_waiting.push_back(process);
                    }
                }
                *waiting = still_waiting;
            }

            {
                let mut ready = self.lock(&self.ready_queue);
                while let Some(process) = ready.pop_front() {
                    self.lock(&self.core_queues[next_core]).push_back(process);
                    next_core = (next_core + 1) % cores;
                }
            }

            thread::sleep(Duration::from_micros(200));
        }
    }

    /// Pull work for `core`: own queue first, then steal from peers.
    fn take_ready(&self, core: usize) -> Option<Arc<Process>> {
        if let Some(process) = self.lock(&self.core_queues[core]).pop_front() {
            return Some(process);
        }
        let cores = self.core_queues.len();
        for offset in 1..cores {
            let peer = (core + offset) % cores;
            if let Some(process) = self.lock(&self.core_queues[peer]).pop_front() {
                return Some(process);
            }
        }
        None
    }

    fn worker_loop(&self, core_id: u16) {
        while self.running.load(Ordering::Acquire) {
            let Some(process) = self.take_ready(core_id as usize) else {
                thread::yield_now();
                thread::sleep(Duration::from_micros(100));
                continue;
            };

            process.set_assigned_core(core_id);
            process.set_state(ProcessState::Running);
            self.lock(&self.running_list).push(Arc::clone(&process));

            process.execute(core_id, self.quantum(), self.config.delay);

            self.lock(&self.running_list)
                .retain(|p| !Arc::ptr_eq(p, &process));

            if process.is_finished() {
                process.set_assigned_core(NO_CORE);
                process.set_state(ProcessState::Finished);
                self.lock(&self.finished_list).push(process);
            } else if process.state() == ProcessState::Waiting {
                process.set_assigned_core(NO_CORE);
                self.lock(&self.waiting_queue).push_back(process);
            } else {
                // Quantum expired: back to this core's queue, FIFO.
                process.set_state(ProcessState::Ready);
                process.set_assigned_core(NO_CORE);
                self.lock(&self.core_queues[core_id as usize]).push_back(process);
            }
        }
    }

    pub fn running_processes(&self) -> Vec<Arc<Process>> {
        self.lock(&self.running_list).clone()
    }

    pub fn finished_processes(&self) -> Vec<Arc<Process>> {
        self.lock(&self.finished_list).clone()
    }

    /// Processes queued or sleeping, for status displays.
    pub fn pending_count(&self) -> usize {
        let mut count = self.lock(&self.ready_queue).len() + self.lock(&self.waiting_queue).len();
        for queue in &self.core_queues {
            count += self.lock(queue).len();
        }
        count
    }

    pub fn cores_used(&self) -> usize {
        self.running_processes()
            .iter()
            .filter(|p| p.state() == ProcessState::Running && p.assigned_core() != NO_CORE)
            .count()
    }

    /// Human-readable utilization report, also written by `report-util`.
    pub fn get_status_string(&self) -> String {
        let running = self.running_processes();
        let finished = self.finished_processes();

        let cores_used = running
            .iter()
            .filter(|p| p.state() == ProcessState::Running && p.assigned_core() != NO_CORE)
            .count();
        let total = self.config.num_cores as usize;
        let cores_available = total.saturating_sub(cores_used);
        let utilization = if total > 0 {
            cores_used as f32 / total as f32 * 100.0
        } else {
            0.0
        };

        let mut out = String::new();
        out.push_str("-----------------------------\n");
        out.push_str("CPU Utilization Report:\n");
        out.push_str(&format!("Cores used: {}\n", cores_used));
        out.push_str(&format!("Cores available: {}\n", cores_available));
        out.push_str(&format!("CPU utilization: {:.2}%\n", utilization));
        out.push_str("-----------------------------\n");

        out.push_str("Running processes:\n");
        for process in &running {
            if process.state() == ProcessState::Running && process.assigned_core() != NO_CORE {
                out.push_str(&process.status_line());
                out.push('\n');
            }
        }

        out.push_str("\nFinished processes:\n");
        for process in &finished {
            out.push_str(&process.status_line());
            out.push('\n');
        }
        out.push_str("-----------------------------\n");
        out
    }

    /// Write the status report to `logs/csopesy-log.txt`.
    pub fn write_utilization_report(&self) -> io::Result<PathBuf> {
        fs::create_dir_all("logs")?;
        let path = PathBuf::from("logs/csopesy-log.txt");
        fs::write(&path, self.get_status_string())?;
        Ok(path)
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex.lock().expect("scheduler lock poisoned")
    }
}

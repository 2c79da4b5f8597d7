use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::memory::MemoryManager;
use crate::scheduler::Scheduler;
use crate::tick::TickClock;

use super::instruction::{Instruction, Operand};
use super::{Pid, Process};

/// Fixed repeat count for generated loops.
const FOR_REPEATS: u16 = 5;

/// Maximum loop nesting depth in generated programs.
const MAX_FOR_DEPTH: u32 = 3;

/// Variable pool generated programs draw from; small enough that programs
/// share variables and large enough to stay below the symbol-table cap.
const VAR_POOL: [&str; 8] = ["v0", "v1", "v2", "v3", "v4", "v5", "v6", "v7"];

/// 64-bit linear congruential generator. The multiplier is the usual PCG
/// constant; the high bits are the usable output.
pub(crate) struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Lcg { state: seed | 1 }
    }

    fn next(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        self.state >> 33
    }

    /// Uniform draw from the inclusive range `[lo, hi]`.
    pub fn range(&mut self, lo: u64, hi: u64) -> u64 {
        debug_assert!(lo <= hi);
        lo + self.next() % (hi - lo + 1)
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Tick period between generation attempts.
    pub batch_process_freq: u64,
    pub min_ins: u32,
    pub max_ins: u32,
    pub min_mem_per_proc: u64,
    pub max_mem_per_proc: u64,
}

/// Background task that synthesizes random processes at a configured tick
/// frequency and submits them to the scheduler. A cycle whose memory draw
/// cannot be admitted is skipped silently.
pub struct ProcessGenerator {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ProcessGenerator {
    pub fn spawn(
        scheduler: Arc<Scheduler>,
        memory: Arc<MemoryManager>,
        clock: Arc<TickClock>,
        config: GeneratorConfig,
        next_pid: Arc<AtomicU16>,
        seed: u64,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("process-generator".into())
            .spawn(move || {
                generator_loop(flag, scheduler, memory, clock, config, next_pid, seed);
            })
            .expect("failed to spawn process generator thread");

        ProcessGenerator {
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

impl Drop for ProcessGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn generator_loop(
    running: Arc<AtomicBool>,
    scheduler: Arc<Scheduler>,
    memory: Arc<MemoryManager>,
    clock: Arc<TickClock>,
    config: GeneratorConfig,
    next_pid: Arc<AtomicU16>,
    seed: u64,
) {
    let mut rng = Lcg::new(seed);
    let mut last_generated: u64 = 0;

    while running.load(Ordering::Relaxed) {
        let tick = clock.now();
        if tick > 0 && tick % config.batch_process_freq == 0 && tick != last_generated {
            last_generated = tick;
            generate_one(&mut rng, &scheduler, &memory, &clock, &config, &next_pid);
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn generate_one(
    rng: &mut Lcg,
    scheduler: &Arc<Scheduler>,
    memory: &Arc<MemoryManager>,
    clock: &Arc<TickClock>,
    config: &GeneratorConfig,
    next_pid: &AtomicU16,
) {
    let bytes = draw_memory_size(rng, config.min_mem_per_proc, config.max_mem_per_proc);
    if !memory.can_allocate_process(bytes) {
        return;
    }

    let pid = Pid(next_pid.fetch_add(1, Ordering::Relaxed));
    let name = format!("process{:02}", pid.0);
    if !memory.create_process_space(pid, bytes) {
        return;
    }

    let process = Arc::new(Process::new(
        pid,
        &name,
        Arc::clone(memory),
        Arc::clone(clock),
    ));
    process.set_program(synthesize_program(
        rng,
        config.min_ins,
        config.max_ins,
        &name,
    ));

    log::info!("generated {} ({} bytes, {} instructions)", name, bytes, process.program_len());
    scheduler.add_process(process);
}

/// Draw a power-of-two size within `[min, max]`.
fn draw_memory_size(rng: &mut Lcg, min: u64, max: u64) -> u64 {
    let low = min.next_power_of_two().trailing_zeros() as u64;
    let high = (63 - max.leading_zeros() as u64).max(low);
    1 << rng.range(low, high)
}

/// Build a random program of roughly `min..=max` logical instructions.
/// Loop nesting is capped and each leaf inside a loop is charged by the
/// product of the enclosing repeat counts, so the unrolled stream stays
/// within the drawn budget.
pub(crate) fn synthesize_program(
    rng: &mut Lcg,
    min_ins: u32,
    max_ins: u32,
    name: &str,
) -> Vec<Instruction> {
    let target = rng.range(min_ins as u64, max_ins as u64) as i64;
    let mut program = Vec::new();
    let mut budget = target;
    while budget > 0 {
        emit_instruction(rng, &mut program, &mut budget, 0, 1, name);
    }
    program
}

fn emit_instruction(
    rng: &mut Lcg,
    out: &mut Vec<Instruction>,
    budget: &mut i64,
    depth: u32,
    multiplier: i64,
    name: &str,
) {
    let kind = rng.range(0, 5);
    if kind == 5 {
        let loop_cost = multiplier * FOR_REPEATS as i64;
        if depth < MAX_FOR_DEPTH && *budget >= loop_cost {
            let mut body = Vec::new();
            let body_len = rng.range(1, 3);
            for _ in 0..body_len {
                if *budget < loop_cost {
                    break;
                }
                emit_instruction(rng, &mut body, budget, depth + 1, loop_cost, name);
            }
            if !body.is_empty() {
                out.push(Instruction::For {
                    body,
                    repeats: FOR_REPEATS,
                });
                return;
            }
        }
        // Nesting or budget forbids a loop; fall through to a plain leaf.
    }
    emit_leaf(rng, out, budget, multiplier, name);
}

fn emit_leaf(rng: &mut Lcg, out: &mut Vec<Instruction>, budget: &mut i64, multiplier: i64, name: &str) {
    *budget -= multiplier;
    let instruction = match rng.range(0, 4) {
        0 => Instruction::Print {
            message: format!("Hello world from {}!", name),
            variable: if rng.range(0, 3) == 0 {
                Some(pick_var(rng).to_string())
            } else {
                None
            },
        },
        1 => Instruction::Declare {
            name: pick_var(rng).to_string(),
            value: rng.range(0, 100) as u16,
        },
        2 => Instruction::Add {
            dest: pick_var(rng).to_string(),
            lhs: pick_operand(rng),
            rhs: pick_operand(rng),
        },
        3 => Instruction::Sub {
            dest: pick_var(rng).to_string(),
            lhs: pick_operand(rng),
            rhs: pick_operand(rng),
        },
        _ => Instruction::Sleep {
            ticks: rng.range(1, 8) as u8,
        },
    };
    out.push(instruction);
}

fn pick_var(rng: &mut Lcg) -> &'static str {
    VAR_POOL[rng.range(0, VAR_POOL.len() as u64 - 1) as usize]
}

fn pick_operand(rng: &mut Lcg) -> Operand {
    if rng.range(0, 1) == 0 {
        Operand::Literal(rng.range(0, 50) as u16)
    } else {
        Operand::Var(pick_var(rng).to_string())
    }
}

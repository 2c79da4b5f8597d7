use crate::memory::{INVALID_VAR_ADDRESS, MAX_SYMBOLS_PER_PROCESS};
use crate::process::{Process, ProcessState};

/// Right-hand operand of an arithmetic or write instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Literal(u16),
    Var(String),
}

/// The simulated instruction set.
///
/// `For` only exists in freshly built programs; admission unrolls every loop
/// into a flat stream, so the executor never sees one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Print {
        message: String,
        variable: Option<String>,
    },
    Declare {
        name: String,
        value: u16,
    },
    Add {
        dest: String,
        lhs: Operand,
        rhs: Operand,
    },
    Sub {
        dest: String,
        lhs: Operand,
        rhs: Operand,
    },
    Sleep {
        ticks: u8,
    },
    For {
        body: Vec<Instruction>,
        repeats: u16,
    },
    Read {
        name: String,
        address: u32,
    },
    Write {
        address: u32,
        value: Operand,
    },
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Print { .. } => "PRINT",
            Instruction::Declare { .. } => "DECLARE",
            Instruction::Add { .. } => "ADD",
            Instruction::Sub { .. } => "SUBTRACT",
            Instruction::Sleep { .. } => "SLEEP",
            Instruction::For { .. } => "FOR",
            Instruction::Read { .. } => "READ",
            Instruction::Write { .. } => "WRITE",
        }
    }

    /// Run one instruction against the owning process. Faults never escape:
    /// a failed memory access or a full symbol table logs an error line into
    /// the process log and leaves state untouched.
    pub fn execute(&self, process: &Process) {
        match self {
            Instruction::Print { message, variable } => {
                let mut text = message.clone();
                if let Some(name) = variable {
                    let Some((value, _)) = read_variable(process, "PRINT", name) else {
                        return;
                    };
                    text = format!("{} {} = {}", message, name, value);
                }
                process.push_print(&text);
            }

            Instruction::Declare { name, value } => {
                let address = process.var_address(name);
                if address == INVALID_VAR_ADDRESS {
                    process.log_error(&format!(
                        "DECLARE: cannot declare variable '{}' - symbol table full (max {} variables)",
                        name, MAX_SYMBOLS_PER_PROCESS
                    ));
                    return;
                }
                if !process.write_memory_word(address, *value) {
                    process.log_error(&format!(
                        "DECLARE: access violation writing variable '{}'",
                        name
                    ));
                    return;
                }
                process.log_line(&format!("DECLARE {} = {}", name, value));
            }

            Instruction::Add { dest, lhs, rhs } => {
                let Some((dest_addr, a, a_text, b, b_text)) =
                    prepare_arithmetic(process, "ADD", dest, lhs, rhs)
                else {
                    return;
                };
                let result = a.saturating_add(b);
                if !process.write_memory_word(dest_addr, result) {
                    process.log_error(&format!("ADD: access violation writing '{}'", dest));
                    return;
                }
                process.log_line(&format!(
                    "ADD {} = {} + {} = {}",
                    dest, a_text, b_text, result
                ));
            }

            Instruction::Sub { dest, lhs, rhs } => {
                let Some((dest_addr, a, a_text, b, b_text)) =
                    prepare_arithmetic(process, "SUBTRACT", dest, lhs, rhs)
                else {
                    return;
                };
                let result = a.saturating_sub(b);
                if !process.write_memory_word(dest_addr, result) {
                    process.log_error(&format!("SUBTRACT: access violation writing '{}'", dest));
                    return;
                }
                process.log_line(&format!(
                    "SUBTRACT {} = {} - {} = {}",
                    dest, a_text, b_text, result
                ));
            }

            Instruction::Sleep { ticks } => {
                let start = process.clock_now();
                let until = start + *ticks as u64;
                // Deadline must be visible before any observer sees Waiting.
                process.set_sleep_until(until);
                process.set_state(ProcessState::Waiting);
                process.log_line(&format!("SLEEP start: {} end: {}", start, until));
            }

            Instruction::For { .. } => {
                // Unrolling at admission is a hard contract; reaching this
                // arm means the instruction stream is corrupt.
                log::error!(
                    "FOR instruction reached the executor in process '{}'; \
                     loops must be unrolled at admission. Aborting.",
                    process.name
                );
                std::process::abort();
            }

            Instruction::Read { name, address } => {
                let Some(value) = process.read_memory_word(*address) else {
                    process.log_error(&format!(
                        "READ: access violation at 0x{:04X}",
                        address
                    ));
                    return;
                };
                let var_addr = process.var_address(name);
                if var_addr == INVALID_VAR_ADDRESS {
                    process.log_error(&format!(
                        "READ: cannot access variable '{}' - symbol table full (max {} variables)",
                        name, MAX_SYMBOLS_PER_PROCESS
                    ));
                    return;
                }
                if !process.write_memory_word(var_addr, value) {
                    process.log_error(&format!("READ: access violation writing '{}'", name));
                    return;
                }
                process.log_line(&format!("READ {} @ 0x{:04X} -> {}", name, address, value));
            }

            Instruction::Write { address, value } => {
                let value = match value {
                    Operand::Literal(v) => *v,
                    Operand::Var(name) => {
                        let Some((v, _)) = read_variable(process, "WRITE", name) else {
                            return;
                        };
                        v
                    }
                };
                if !process.write_memory_word(*address, value) {
                    process.log_error(&format!(
                        "WRITE: access violation at 0x{:04X}",
                        address
                    ));
                    return;
                }
                process.log_line(&format!("WRITE @0x{:04X} -> {}", address, value));
            }
        }
    }
}

/// Resolve the destination and both operands of ADD/SUBTRACT. Operand text
/// carries `name(value)` for variables so log lines show what was read.
fn prepare_arithmetic(
    process: &Process,
    mnemonic: &str,
    dest: &str,
    lhs: &Operand,
    rhs: &Operand,
) -> Option<(u32, u16, String, u16, String)> {
    let dest_addr = process.var_address(dest);
    if dest_addr == INVALID_VAR_ADDRESS {
        process.log_error(&format!(
            "{}: cannot access variable '{}' - symbol table full (max {} variables)",
            mnemonic, dest, MAX_SYMBOLS_PER_PROCESS
        ));
        return None;
    }
    let (a, a_text) = resolve_operand(process, mnemonic, lhs)?;
    let (b, b_text) = resolve_operand(process, mnemonic, rhs)?;
    Some((dest_addr, a, a_text, b, b_text))
}

fn resolve_operand(process: &Process, mnemonic: &str, operand: &Operand) -> Option<(u16, String)> {
    match operand {
        Operand::Literal(v) => Some((*v, v.to_string())),
        Operand::Var(name) => {
            let (value, text) = read_variable(process, mnemonic, name)?;
            Some((value, text))
        }
    }
}

fn read_variable(process: &Process, mnemonic: &str, name: &str) -> Option<(u16, String)> {
    let address = process.var_address(name);
    if address == INVALID_VAR_ADDRESS {
        process.log_error(&format!(
            "{}: cannot access variable '{}' - symbol table full (max {} variables)",
            mnemonic, name, MAX_SYMBOLS_PER_PROCESS
        ));
        return None;
    }
    let value = match process.read_memory_word(address) {
        Some(v) => v,
        None => {
            process.log_error(&format!(
                "{}: access violation reading variable '{}'",
                mnemonic, name
            ));
            return None;
        }
    };
    Some((value, format!("{}({})", name, value)))
}

/// Expand every `For` node into its repeated body, depth first. The result
/// contains only flat instructions.
pub fn unroll(instructions: &[Instruction]) -> Vec<Instruction> {
    let mut expanded = Vec::with_capacity(instructions.len() * 2);
    unroll_into(instructions, &mut expanded);
    expanded
}

fn unroll_into(instructions: &[Instruction], target: &mut Vec<Instruction>) {
    for instruction in instructions {
        match instruction {
            Instruction::For { body, repeats } => {
                for _ in 0..*repeats {
                    unroll_into(body, target);
                }
            }
            other => target.push(other.clone()),
        }
    }
}

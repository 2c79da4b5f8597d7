mod common;

use std::sync::Arc;
use std::time::Duration;

use quantos::process::encoder::InstructionEncoder;
use quantos::process::instruction::{Instruction, Operand};
use quantos::process::{Pid, Process, ProcessState};
use quantos::tick::TickClock;

use common::{fast_clock, make_memory, wait_until};

fn process_with_space(tag: &str) -> (Arc<Process>, Arc<TickClock>) {
    let memory = make_memory(tag, 65536, 4096, 64);
    let clock = Arc::new(TickClock::new());
    let pid = Pid(1);
    memory.create_process_space(pid, 4096);
    let process = Arc::new(Process::new(pid, tag, memory, Arc::clone(&clock)));
    (process, clock)
}

fn read_var(process: &Process, name: &str) -> u16 {
    let addr = process.var_address(name);
    process.read_memory_word(addr).expect("variable readable")
}

#[test]
fn add_saturates_at_u16_max() {
    let (process, _clock) = process_with_space("add-sat");
    Instruction::Declare {
        name: "x".into(),
        value: 60000,
    }
    .execute(&process);
    Instruction::Add {
        dest: "x".into(),
        lhs: Operand::Var("x".into()),
        rhs: Operand::Literal(10000),
    }
    .execute(&process);
    assert_eq!(read_var(&process, "x"), 65535);
}

#[test]
fn sub_clamps_at_zero() {
    let (process, _clock) = process_with_space("sub-clamp");
    Instruction::Declare {
        name: "y".into(),
        value: 5,
    }
    .execute(&process);
    Instruction::Sub {
        dest: "y".into(),
        lhs: Operand::Var("y".into()),
        rhs: Operand::Literal(10),
    }
    .execute(&process);
    assert_eq!(read_var(&process, "y"), 0);
}

#[test]
fn add_and_sub_exact_values() {
    let (process, _clock) = process_with_space("arith");
    Instruction::Declare {
        name: "a".into(),
        value: 30,
    }
    .execute(&process);
    Instruction::Declare {
        name: "b".into(),
        value: 12,
    }
    .execute(&process);
    Instruction::Add {
        dest: "c".into(),
        lhs: Operand::Var("a".into()),
        rhs: Operand::Var("b".into()),
    }
    .execute(&process);
    assert_eq!(read_var(&process, "c"), 42);

    Instruction::Sub {
        dest: "d".into(),
        lhs: Operand::Var("a".into()),
        rhs: Operand::Var("b".into()),
    }
    .execute(&process);
    assert_eq!(read_var(&process, "d"), 18);
}

#[test]
fn read_and_write_move_words_through_memory() {
    let (process, _clock) = process_with_space("read-write");
    Instruction::Write {
        address: 0x80,
        value: Operand::Literal(1234),
    }
    .execute(&process);
    Instruction::Read {
        name: "r".into(),
        address: 0x80,
    }
    .execute(&process);
    assert_eq!(read_var(&process, "r"), 1234);

    Instruction::Declare {
        name: "s".into(),
        value: 77,
    }
    .execute(&process);
    Instruction::Write {
        address: 0x90,
        value: Operand::Var("s".into()),
    }
    .execute(&process);
    assert_eq!(process.read_memory_word(0x90), Some(77));
}

#[test]
fn symbol_table_caps_at_thirty_two() {
    let (process, _clock) = process_with_space("symcap");
    for i in 0..32 {
        Instruction::Declare {
            name: format!("var{}", i),
            value: i as u16,
        }
        .execute(&process);
    }
    assert_eq!(process.symbol_count(), 32);

    // The 33rd declaration must not mutate anything; it only logs.
    let log_len_before = process.print_log_snapshot().len();
    Instruction::Declare {
        name: "overflow".into(),
        value: 1,
    }
    .execute(&process);

    assert_eq!(process.symbol_count(), 32);
    let log = process.print_log_snapshot();
    assert_eq!(log.len(), log_len_before + 1);
    let last = log.last().unwrap();
    assert!(last.contains("overflow"), "error names the variable: {}", last);
    assert!(last.contains("symbol table full"), "error says why: {}", last);
}

#[test]
fn print_with_variable_reads_its_value() {
    let (process, _clock) = process_with_space("printvar");
    Instruction::Declare {
        name: "n".into(),
        value: 9,
    }
    .execute(&process);
    Instruction::Print {
        message: "value of".into(),
        variable: Some("n".into()),
    }
    .execute(&process);
    let log = process.print_log_snapshot();
    assert!(log.last().unwrap().contains("value of n = 9"));
}

#[test]
fn sleep_parks_the_process() {
    let (process, clock) = process_with_space("sleep");
    clock.advance();
    clock.advance();
    let at = clock.now();
    Instruction::Sleep { ticks: 10 }.execute(&process);
    assert_eq!(process.state(), ProcessState::Waiting);
    assert_eq!(process.sleep_until(), at + 10);
}

#[test]
fn bytecode_round_trip_preserves_every_kind() {
    let samples = vec![
        Instruction::Print {
            message: "hello".into(),
            variable: None,
        },
        Instruction::Print {
            message: "hello".into(),
            variable: Some("v".into()),
        },
        Instruction::Declare {
            name: "x".into(),
            value: 41,
        },
        Instruction::Add {
            dest: "x".into(),
            lhs: Operand::Literal(3),
            rhs: Operand::Var("y".into()),
        },
        Instruction::Add {
            dest: "x".into(),
            lhs: Operand::Var("y".into()),
            rhs: Operand::Var("z".into()),
        },
        Instruction::Sub {
            dest: "x".into(),
            lhs: Operand::Var("x".into()),
            rhs: Operand::Literal(7),
        },
        Instruction::Sleep { ticks: 200 },
        Instruction::Read {
            name: "r".into(),
            address: 0x0001_0040,
        },
        Instruction::Write {
            address: 0x2000,
            value: Operand::Literal(5),
        },
        Instruction::Write {
            address: 0x2000,
            value: Operand::Var("w".into()),
        },
    ];

    let mut encoder = InstructionEncoder::new();
    for instruction in samples {
        let encoded = encoder.encode(&instruction).expect("encodable");
        let decoded = encoder.decode(&encoded).expect("decodable");
        assert_eq!(decoded, instruction);
    }
}

#[test]
fn string_table_survives_a_trip_through_process_memory() {
    let (process, _clock) = process_with_space("strtable");
    let mut encoder = InstructionEncoder::new();
    let a = encoder.intern("first");
    let b = encoder.intern("second string");
    assert!(encoder.store_table(&process, 0x400));

    let mut reloaded = InstructionEncoder::new();
    assert!(reloaded.load_table(&process, 0x400));
    assert_eq!(reloaded.lookup(a), "first");
    assert_eq!(reloaded.lookup(b), "second string");
    assert_eq!(reloaded.intern("first"), a);
}

#[test]
fn loaded_program_executes_from_memory() {
    let memory = make_memory("bytecode-exec", 65536, 4096, 64);
    let (clock, _driver) = fast_clock();
    let pid = Pid(9);
    memory.create_process_space(pid, 4096);
    let process = Arc::new(Process::new(pid, "bytecode-exec", memory, clock));

    process.set_program(vec![
        Instruction::Declare {
            name: "x".into(),
            value: 40,
        },
        Instruction::Add {
            dest: "x".into(),
            lhs: Operand::Var("x".into()),
            rhs: Operand::Literal(2),
        },
        Instruction::Print {
            message: "result".into(),
            variable: Some("x".into()),
        },
    ]);
    process.unroll_program();
    assert!(process.load_program_into_memory());

    // Drive to completion on this thread; the fast ticker supplies edges.
    process.execute(0, 0, 0);
    assert!(wait_until(Duration::from_secs(5), || process.is_finished()));

    assert_eq!(read_var(&process, "x"), 42);
    let log = process.print_log_snapshot();
    assert!(log.last().unwrap().contains("result x = 42"));
}

#[test]
fn unrolled_loop_runs_body_repeatedly() {
    let memory = make_memory("loop-exec", 65536, 4096, 64);
    let (clock, _driver) = fast_clock();
    let pid = Pid(11);
    memory.create_process_space(pid, 4096);
    let process = Arc::new(Process::new(pid, "loop-exec", memory, clock));

    process.set_program(vec![
        Instruction::Declare {
            name: "acc".into(),
            value: 0,
        },
        Instruction::For {
            body: vec![Instruction::Add {
                dest: "acc".into(),
                lhs: Operand::Var("acc".into()),
                rhs: Operand::Literal(3),
            }],
            repeats: 4,
        },
    ]);
    process.unroll_program();
    assert_eq!(process.program_len(), 5);

    process.execute(0, 0, 0);
    assert_eq!(read_var(&process, "acc"), 12);
}

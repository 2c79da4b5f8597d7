use std::fs;
use std::path::PathBuf;

use quantos::shell::Shell;

const CONFIG: &str = "\
num-cpu 2
scheduler \"rr\"
quantum-cycles 4
batch-process-freq 2
min-ins 10
max-ins 20
delays-per-exec 0
max-overall-mem 16384
mem-per-frame 256
min-mem-per-proc 64
max-mem-per-proc 1024
";

fn temp_config() -> PathBuf {
    let path = std::env::temp_dir().join(format!("quantos-shell-{}.txt", std::process::id()));
    fs::write(&path, CONFIG).expect("write temp config");
    path
}

fn joined(lines: &[String]) -> String {
    lines.join("\n")
}

#[test]
fn help_and_unknown_commands_work_without_a_system() {
    let mut shell = Shell::new("nonexistent-config.txt");

    let help = joined(&shell.process_command("help"));
    assert!(help.contains("initialize"));
    assert!(help.contains("screen -S"));

    let unknown = joined(&shell.process_command("frobnicate now"));
    assert_eq!(unknown, "frobnicate now: command not found");

    let not_ready = joined(&shell.process_command("screen -ls"));
    assert!(not_ready.contains("initialize the system first"));
}

#[test]
fn missing_config_file_is_reported() {
    let mut shell = Shell::new("definitely-not-here.txt");
    let out = joined(&shell.process_command("initialize"));
    assert!(out.contains("file not found"), "got: {}", out);
}

#[test]
fn full_command_surface_flow() {
    let config_path = temp_config();
    let mut shell = Shell::new(config_path.clone());

    // Bring the system up; a second initialize is refused.
    let out = joined(&shell.process_command("initialize"));
    assert!(out.contains("initialized"), "got: {}", out);
    let out = joined(&shell.process_command("initialize"));
    assert!(out.contains("already initialized"));

    // Memory size validation: not a power of two, then out of range.
    let out = joined(&shell.process_command("screen -S bad 100"));
    assert!(out.contains("invalid memory allocation"));
    let out = joined(&shell.process_command("screen -S bad 131072"));
    assert!(out.contains("invalid memory allocation"));
    let out = joined(&shell.process_command("screen -S bad nonsense"));
    assert!(out.contains("invalid memory allocation"));

    // A valid screen attaches and prints its header.
    let out = joined(&shell.process_command("screen -S web 1024"));
    assert!(out.contains("Process name: web"), "got: {}", out);
    assert_eq!(shell.current_session().name, "web");

    // Duplicate screen names are rejected from inside the session too.
    let out = joined(&shell.process_command("screen -S web 1024"));
    assert!(out.contains("already exists"));

    // The per-process report renders and is saved next to the other logs.
    let out = joined(&shell.process_command("process-smi"));
    assert!(out.contains("Process name: web"));
    assert!(out.contains("Lines of code:"));
    assert!(PathBuf::from("logs/process_smi_web.txt").exists());

    // Leave the screen, land back on the root session.
    let out = joined(&shell.process_command("exit"));
    assert!(out.contains("[screen is terminating]"));
    assert_eq!(shell.current_session().name, "pts");
    assert!(!shell.quit);

    // Re-attach and leave again.
    shell.process_command("screen -r web");
    assert_eq!(shell.current_session().name, "web");
    shell.process_command("exit");
    let out = joined(&shell.process_command("screen -r nobody"));
    assert!(out.contains("no such session"));

    // Scheduler status and the utilization report.
    let out = joined(&shell.process_command("screen -ls"));
    assert!(out.contains("CPU Utilization Report"));
    let out = joined(&shell.process_command("report-util"));
    assert!(out.contains("Utilization report saved"));
    assert!(PathBuf::from("logs/csopesy-log.txt").exists());

    // Generator control is idempotent in both directions.
    let out = joined(&shell.process_command("scheduler-start"));
    assert!(out.contains("started"));
    let out = joined(&shell.process_command("scheduler-start"));
    assert!(out.contains("already"));
    let out = joined(&shell.process_command("scheduler-stop"));
    assert!(out.contains("stopped"));
    let out = joined(&shell.process_command("scheduler-stop"));
    assert!(out.contains("not generating"));

    // System summary.
    let out = joined(&shell.process_command("smi"));
    assert!(out.contains("Ticks:"));
    assert!(out.contains("frames used"));

    // clear wipes the buffer; exit from the root quits.
    shell.process_command("clear");
    assert!(shell.current_session().output.is_empty());
    shell.process_command("exit");
    assert!(shell.quit);

    let _ = fs::remove_file(config_path);
}

use crate::shell::Shell;

/// report-util — write the utilization report to the log file.
pub fn run(shell: &mut Shell) {
    if !shell.ensure_initialized() {
        return;
    }
    let result = shell
        .system
        .as_ref()
        .expect("checked above")
        .scheduler
        .write_utilization_report();
    match result {
        Ok(path) => shell.push_output(format!("Utilization report saved to {}", path.display())),
        Err(err) => shell.push_output(format!("could not write report: {}", err)),
    }
}

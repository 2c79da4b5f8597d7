use crate::shell::Shell;

/// scheduler-start — begin background process generation.
pub fn start(shell: &mut Shell) {
    if !shell.ensure_initialized() {
        return;
    }
    let started = shell.system.as_mut().expect("checked above").start_generator();
    if started {
        shell.push_output("scheduler started generating processes");
    } else {
        shell.push_output("scheduler is already generating processes");
    }
}

/// scheduler-stop — halt background process generation.
pub fn stop(shell: &mut Shell) {
    if !shell.ensure_initialized() {
        return;
    }
    let stopped = shell.system.as_mut().expect("checked above").stop_generator();
    if stopped {
        shell.push_output("scheduler stopped generating processes");
    } else {
        shell.push_output("scheduler is not generating processes");
    }
}

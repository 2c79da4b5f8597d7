use crate::shell::Shell;

/// clear — wipe the current session's output history.
pub fn run(shell: &mut Shell) {
    shell.current_session_mut().output.clear();
}

use crate::shell::Shell;

/// exit — detach from a screen, or quit when already at the root session.
pub fn run(shell: &mut Shell) {
    if shell.at_root() {
        shell.quit = true;
    } else {
        shell.attach_root();
        shell.push_output("[screen is terminating]");
    }
}

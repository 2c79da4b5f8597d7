use crate::shell::Shell;

/// smi — system-wide CPU and memory summary.
pub fn run(shell: &mut Shell) {
    if !shell.ensure_initialized() {
        return;
    }
    let text = shell.system.as_ref().expect("checked above").smi_text();
    shell.push_multiline(&text);
}

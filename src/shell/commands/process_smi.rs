use crate::shell::Shell;

/// process-smi — report on the process behind the current session, saved
/// alongside the other logs.
pub fn run(shell: &mut Shell) {
    let Some(process) = shell.current_session().process.clone() else {
        shell.push_output("no process attached to this session");
        return;
    };

    let report = process.smi_string();
    shell.push_multiline(&report);

    match process.save_smi_report() {
        Ok(path) => shell.push_output(format!("saved to {}", path.display())),
        Err(err) => shell.push_output(format!("could not save report: {}", err)),
    }
}

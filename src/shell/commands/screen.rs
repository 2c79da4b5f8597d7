use crate::shell::session::Session;
use crate::shell::Shell;

/// screen -S <name> <bytes> | screen -r <name> | screen -ls
pub fn run(shell: &mut Shell, args: &str) {
    let parts: Vec<&str> = args.split_whitespace().collect();
    match parts.as_slice() {
        &["-S", name, bytes] => create(shell, name, bytes),
        &["-r", name] => reattach(shell, name),
        &["-ls"] => list(shell),
        _ => shell.push_output("usage: screen -S <name> <bytes> | screen -r <name> | screen -ls"),
    }
}

fn create(shell: &mut Shell, name: &str, bytes_text: &str) {
    if !shell.ensure_initialized() {
        return;
    }
    if shell.find_session(name).is_some() {
        shell.push_output(format!("session '{}' already exists", name));
        return;
    }
    let Ok(bytes) = bytes_text.parse::<u64>() else {
        shell.push_output("invalid memory allocation");
        return;
    };

    let system = shell.system.as_ref().expect("checked above");
    match system.spawn_process(name, bytes) {
        Ok(process) => {
            let mut session = Session::new(name, Some(process));
            session.push_header();
            shell.open_session(session);
        }
        Err(err) => shell.push_output(err.to_string()),
    }
}

fn reattach(shell: &mut Shell, name: &str) {
    match shell.find_session(name) {
        Some(index) => {
            shell.attach(index);
            if shell.current_session().output.is_empty() {
                shell.current_session_mut().push_header();
            }
        }
        None => shell.push_output(format!("no such session: {}", name)),
    }
}

fn list(shell: &mut Shell) {
    if !shell.ensure_initialized() {
        return;
    }
    let status = shell
        .system
        .as_ref()
        .expect("checked above")
        .scheduler
        .get_status_string();
    shell.push_multiline(&status);
}

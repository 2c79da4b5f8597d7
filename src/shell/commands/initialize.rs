use crate::config;
use crate::shell::Shell;
use crate::system::System;

/// initialize — load the configuration file and bring the core up.
pub fn run(shell: &mut Shell, _args: &str) {
    if shell.system.is_some() {
        shell.push_output("already initialized");
        return;
    }

    let path = shell.config_path().clone();
    let config = match config::load_config(&path) {
        Ok(config) => config,
        Err(err) => {
            shell.push_output(format!("config error: {}", err));
            return;
        }
    };

    match System::initialize(config) {
        Ok(system) => {
            let summary = format!(
                "initialized: {} cores, {:?} scheduler, quantum {}, {} KiB memory",
                system.config.num_cpu,
                system.config.scheduler,
                system.config.quantum_cycles,
                system.config.max_overall_mem / 1024
            );
            shell.system = Some(system);
            shell.push_output(summary);
        }
        Err(err) => shell.push_output(format!("initialize failed: {}", err)),
    }
}

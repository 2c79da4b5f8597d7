use crate::shell::Shell;

pub fn run(shell: &mut Shell) {
    for line in [
        "Available commands:",
        "  initialize                 load config.txt and start the simulator",
        "  screen -S <name> <bytes>   create a process and attach to it",
        "  screen -r <name>           re-attach to an existing screen",
        "  screen -ls                 show scheduler status",
        "  scheduler-start            start the background process generator",
        "  scheduler-stop             stop the background process generator",
        "  report-util                write the utilization report to logs/",
        "  smi                        system-wide CPU and memory summary",
        "  process-smi                report on the current screen's process",
        "  clear                      clear this screen's output",
        "  exit                       leave the screen, or quit from the root",
    ] {
        shell.push_output(line);
    }
}

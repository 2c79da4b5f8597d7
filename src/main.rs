use std::io::{self, BufRead, Write};

use quantos::shell::Shell;

const BANNER: &str = r"
  __ _ _  _ __ _ _ _ | |_ ___ ___
 / _` | || / _` | ' \|  _/ _ (_-<
 \__, |\_,_\__,_|_||_|\__\___/__/
    |_|
";

fn main() {
    quantos::logger::init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.txt".to_string());
    let mut shell = Shell::new(config_path);

    println!("{}", BANNER);
    println!("Welcome to QuantOS!");
    println!("Type 'initialize' to start, 'help' for commands, 'exit' to quit.");
    println!();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}:~$ ", shell.current_session().name);
        let _ = io::stdout().flush();

        let Some(Ok(line)) = lines.next() else {
            break;
        };
        for out in shell.process_command(&line) {
            println!("{}", out);
        }
        if shell.quit {
            break;
        }
    }
}

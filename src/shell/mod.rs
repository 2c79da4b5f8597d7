pub mod commands;
pub mod session;

use std::path::PathBuf;

use crate::system::System;
use session::Session;

/// Name of the root session the shell starts in.
pub const ROOT_SESSION: &str = "pts";

/// Line-oriented command processor over the simulator core.
///
/// The terminal front-end feeds lines into [`process_command`] and renders
/// the returned text; everything else (sessions, the running `System`) lives
/// here so the front-end stays a thin loop.
///
/// [`process_command`]: Shell::process_command
pub struct Shell {
    pub system: Option<System>,
    pub quit: bool,
    config_path: PathBuf,
    sessions: Vec<Session>,
    current: usize,
}

impl Shell {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Shell {
            system: None,
            quit: false,
            config_path: config_path.into(),
            sessions: vec![Session::new(ROOT_SESSION, None)],
            current: 0,
        }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Execute one command line. Returns the lines the front-end should
    /// display: the full buffer after a session switch, otherwise only what
    /// this command appended.
    pub fn process_command(&mut self, input: &str) -> Vec<String> {
        let session_before = self.current;
        let len_before = self.sessions[self.current].output.len();

        self.dispatch(input);
        self.drain_process_output();

        let session = &self.sessions[self.current];
        if self.current != session_before {
            session.output.clone()
        } else {
            let start = len_before.min(session.output.len());
            session.output[start..].to_vec()
        }
    }

    fn dispatch(&mut self, input: &str) {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return;
        }
        let (command, args) = match trimmed.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (trimmed, ""),
        };

        match command.to_lowercase().as_str() {
            "initialize" => commands::initialize::run(self, args),
            "screen" => commands::screen::run(self, args),
            "scheduler-start" => commands::scheduler_cmd::start(self),
            "scheduler-stop" => commands::scheduler_cmd::stop(self),
            "report-util" => commands::report_util::run(self),
            "smi" => commands::smi::run(self),
            "process-smi" => commands::process_smi::run(self),
            "clear" => commands::clear::run(self),
            "help" => commands::help::run(self),
            "exit" => commands::exit_cmd::run(self),
            _ => self.push_output(format!("{}: command not found", trimmed)),
        }
    }

    // ---- session plumbing ----

    pub fn current_session(&self) -> &Session {
        &self.sessions[self.current]
    }

    pub fn current_session_mut(&mut self) -> &mut Session {
        &mut self.sessions[self.current]
    }

    pub fn find_session(&self, name: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.name == name)
    }

    pub fn open_session(&mut self, session: Session) {
        self.sessions.push(session);
        self.current = self.sessions.len() - 1;
    }

    pub fn attach(&mut self, index: usize) {
        if index < self.sessions.len() {
            self.current = index;
        }
    }

    pub fn attach_root(&mut self) {
        self.current = 0;
    }

    pub fn at_root(&self) -> bool {
        self.current == 0
    }

    pub fn push_output(&mut self, line: impl Into<String>) {
        self.current_session_mut().push_line(line);
    }

    pub fn push_multiline(&mut self, text: &str) {
        let session = self.current_session_mut();
        for line in text.lines() {
            session.push_line(line);
        }
    }

    /// Move lines the attached process produced into the session buffer.
    fn drain_process_output(&mut self) {
        let session = &mut self.sessions[self.current];
        if let Some(process) = &session.process {
            session.output.extend(process.drain_output());
        }
    }

    /// True when a `System` is up; otherwise reports the standard hint.
    pub fn ensure_initialized(&mut self) -> bool {
        if self.system.is_some() {
            true
        } else {
            self.push_output("initialize the system first");
            false
        }
    }
}

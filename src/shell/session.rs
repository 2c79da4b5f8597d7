use std::sync::Arc;
use std::time::SystemTime;

use crate::process::Process;
use crate::walltime;

/// A named binding from the terminal to one simulated process and its
/// output history. The root session carries no process.
pub struct Session {
    pub name: String,
    pub created_at: SystemTime,
    pub process: Option<Arc<Process>>,
    pub output: Vec<String>,
}

impl Session {
    pub fn new(name: &str, process: Option<Arc<Process>>) -> Self {
        Session {
            name: name.to_string(),
            created_at: SystemTime::now(),
            process,
            output: Vec::new(),
        }
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    /// Re-printable banner shown when a screen is created or re-attached
    /// onto an empty buffer.
    pub fn push_header(&mut self) {
        if let Some(process) = &self.process {
            self.output.push(format!("Process name: {}", process.name));
        }
        self.output
            .push(format!("Current time: {}", walltime::datetime(self.created_at)));
    }
}

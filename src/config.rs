use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

use crate::scheduler::SchedulerType;

/// Errors surfaced to the user by `initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("file not found")]
    FileNotFound,
    #[error("invalid format")]
    InvalidFormat,
    #[error("invalid value")]
    InvalidValue,
    #[error("missing parameter")]
    MissingParameter,
}

/// Fully validated simulator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    pub num_cpu: u16,
    pub scheduler: SchedulerType,
    pub quantum_cycles: u32,
    pub batch_process_freq: u64,
    pub min_ins: u32,
    pub max_ins: u32,
    pub delays_per_exec: u32,
    pub max_overall_mem: u64,
    pub mem_per_frame: u64,
    pub min_mem_per_proc: u64,
    pub max_mem_per_proc: u64,
    /// When set, admitted programs are encoded into process memory and
    /// fetched through the paging layer instead of interpreted from the AST.
    pub memory_backed_exec: bool,
}

impl SystemConfig {
    pub fn validate(&self) -> bool {
        self.num_cpu >= 1
            && self.num_cpu <= 128
            && self.quantum_cycles >= 1
            && self.batch_process_freq >= 1
            && self.batch_process_freq <= (1 << 24)
            && self.min_ins >= 1
            && self.max_ins >= 1
            && self.min_ins <= self.max_ins
            && self.mem_per_frame >= 1
            && self.max_overall_mem >= self.mem_per_frame
            && self.min_mem_per_proc >= 64
            && self.max_mem_per_proc <= 65536
            && self.min_mem_per_proc <= self.max_mem_per_proc
    }
}

/// Key-value configuration file reader.
///
/// Accepts `key value` lines; `#` and `//` start comments; quoted values
/// keep their content without the quotes. Unparseable lines are skipped.
pub struct ConfigReader {
    entries: HashMap<String, String>,
}

impl ConfigReader {
    pub fn new() -> Self {
        ConfigReader {
            entries: HashMap::new(),
        }
    }

    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let file = File::open(path).map_err(|_| ConfigError::FileNotFound)?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|_| ConfigError::InvalidFormat)?;
            if let Some((key, value)) = Self::parse_line(&line) {
                self.entries.insert(key, value);
            }
        }
        Ok(())
    }

    pub fn load_str(&mut self, contents: &str) {
        for line in contents.lines() {
            if let Some((key, value)) = Self::parse_line(line) {
                self.entries.insert(key, value);
            }
        }
    }

    fn parse_line(line: &str) -> Option<(String, String)> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            return None;
        }
        let (key, value) = line.split_once(' ')?;
        let key = key.trim();
        let mut value = value.trim();
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value = &value[1..value.len() - 1];
        }
        if key.is_empty() || value.is_empty() {
            return None;
        }
        Some((key.to_string(), value.to_string()))
    }

    fn get_str(&self, key: &str) -> Result<&str, ConfigError> {
        self.entries
            .get(key)
            .map(String::as_str)
            .ok_or(ConfigError::MissingParameter)
    }

    fn get_int(&self, key: &str) -> Result<u64, ConfigError> {
        self.get_str(key)?
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue)
    }

    pub fn parse_config(&self) -> Result<SystemConfig, ConfigError> {
        let scheduler = match self.get_str("scheduler")? {
            "fcfs" => SchedulerType::Fcfs,
            "rr" => SchedulerType::Rr,
            _ => return Err(ConfigError::InvalidValue),
        };

        let num_cpu = self.get_int("num-cpu")?;
        if num_cpu > u16::MAX as u64 {
            return Err(ConfigError::InvalidValue);
        }

        let config = SystemConfig {
            num_cpu: num_cpu as u16,
            scheduler,
            quantum_cycles: self.get_int("quantum-cycles")? as u32,
            batch_process_freq: self.get_int("batch-process-freq")?,
            min_ins: self.get_int("min-ins")? as u32,
            max_ins: self.get_int("max-ins")? as u32,
            delays_per_exec: self.get_int("delays-per-exec")? as u32,
            max_overall_mem: self.get_int("max-overall-mem")?,
            mem_per_frame: self.get_int("mem-per-frame")?,
            min_mem_per_proc: self.get_int("min-mem-per-proc")?,
            max_mem_per_proc: self.get_int("max-mem-per-proc")?,
            // Optional switch; absent means memory-backed execution.
            memory_backed_exec: match self.entries.get("memory-backed-exec") {
                Some(v) => v != "0",
                None => true,
            },
        };

        if !config.validate() {
            return Err(ConfigError::InvalidValue);
        }
        Ok(config)
    }
}

impl Default for ConfigReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience wrapper: load and validate a configuration file in one step.
pub fn load_config(path: &Path) -> Result<SystemConfig, ConfigError> {
    let mut reader = ConfigReader::new();
    reader.load_file(path)?;
    reader.parse_config()
}

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use sls_core::env::EnvMap;

use crate::error::CliError;

/// Where command results go: JSON (or `KEY: value` text) on stdout, problems
/// that did not stop the command as JSON on stderr.
pub struct Output<O, E> {
    out: O,
    err: E,
    text: bool,
}

impl Output<std::io::Stdout, std::io::Stderr> {
    pub fn stdio(text: bool) -> Self {
        Self::new(std::io::stdout(), std::io::stderr(), text)
    }
}

impl<O: Write, E: Write> Output<O, E> {
    pub fn new(out: O, err: E, text: bool) -> Self {
        Self { out, err, text }
    }

    pub fn display_json<T: Serialize>(&mut self, value: &T) -> Result<(), CliError> {
        let data = serde_json::to_string(value)?;
        writeln!(self.out, "{data}").map_err(|e| CliError::io("write failed", "stdout", e))
    }

    /// A map of names to values, titled with `label` in text mode.
    pub fn display_map(&mut self, label: &str, map: &EnvMap) -> Result<(), CliError> {
        if !self.text {
            return self.display_json(map);
        }

        let mut display = String::new();
        if !label.is_empty() {
            display.push_str(label);
            display.push('\n');
        }
        for (key, value) in map {
            display.push_str(&format!("{key}: {value}\n"));
        }
        write!(self.out, "{display}").map_err(|e| CliError::io("write failed", "stdout", e))
    }

    pub fn display_error_json<T: Serialize>(&mut self, value: &T) -> Result<(), CliError> {
        let data = serde_json::to_string(value)?;
        writeln!(self.err, "{data}").map_err(|e| CliError::io("write failed", "stderr", e))
    }

    pub fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }
}

pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), CliError> {
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(path, data).map_err(|e| CliError::io("write json file failed", path, e))
}

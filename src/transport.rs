//! Command transport to the `fab` CLI.
//!
//! Every platform interaction goes through [`Transport::execute`], which runs
//! one CLI command line and returns its cleaned standard output. The real
//! implementation, [`FabCli`], spawns `fab -c "<command>"` once per call. The
//! CLI reports most failures on stdout with a zero or non-zero exit code that
//! callers cannot rely on, so a non-zero exit is logged and the output is
//! still returned for the caller to inspect.
//!
//! [`ScriptedTransport`] is an in-memory stand-in used by tests: it records
//! every command and answers from a handler closure.

use regex::Regex;
use std::cell::RefCell;
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Executes one CLI command line.
pub trait Transport {
    /// Run `command` and return stdout without diagnostic lines.
    fn execute(&self, command: &str) -> Result<String>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, command: &str) -> Result<String> {
        (**self).execute(command)
    }
}

/// Drop the banner lines the CLI mixes into its output.
///
/// Lines starting with `!` (debug and warning banners) or with an escaped
/// quote entity are removed; the remainder is returned trimmed.
pub fn strip_diagnostics(output: &str) -> String {
    output
        .trim()
        .lines()
        .filter(|line| {
            let line = line.trim();
            !line.starts_with('!') && !line.starts_with("&#x27")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn secret_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(-p\s+)\S+",
            r"(servicePrincipalSecret=)[^,\s]+",
            r"(credentialDetails\.key=)[^,\s]+",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid redaction regex"))
        .collect()
    })
}

/// Mask passwords, client secrets and access tokens in a command line.
pub fn redact(command: &str) -> String {
    secret_patterns()
        .iter()
        .fold(command.to_string(), |acc, re| {
            re.replace_all(&acc, "${1}***").into_owned()
        })
}

/// The `fab` command-line tool.
#[derive(Debug, Clone)]
pub struct FabCli {
    program: PathBuf,
}

impl FabCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FabCli {
    fn default() -> Self {
        Self::new("fab")
    }
}

impl Transport for FabCli {
    fn execute(&self, command: &str) -> Result<String> {
        log::debug!("{} -c {}", self.program.display(), redact(command));

        let output = Command::new(&self.program)
            .args(["-c", command])
            .output()
            .map_err(|e| Error::Transport {
                command: redact(command),
                message: format!("failed to start {}: {}", self.program.display(), e),
            })?;

        if !output.status.success() {
            log::debug!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(strip_diagnostics(&String::from_utf8_lossy(&output.stdout)))
    }
}

type Handler = Box<dyn Fn(&str, &[String]) -> String>;

/// Records commands and answers them from a handler.
///
/// The handler receives the command and all commands issued before it, which
/// lets a test model state such as "exists after create".
pub struct ScriptedTransport {
    handler: Handler,
    calls: RefCell<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &[String]) -> String + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// All commands in the order they were issued.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Commands starting with `prefix`.
    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Commands containing `needle`.
    pub fn calls_containing(&self, needle: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.contains(needle))
            .cloned()
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, command: &str) -> Result<String> {
        let history = self.calls.borrow().clone();
        let response = (self.handler)(command, &history);
        self.calls.borrow_mut().push(command.to_string());
        Ok(strip_diagnostics(&response))
    }
}

//! Process enumeration and display names
//!
//! [`ProcessLister`] enumerates the process table. [`ProcessTable`] turns the
//! listing into pid → display name, where interpreter processes are named
//! after what they run (`python3:manage.py`) so several of them can be told
//! apart.

use crate::config::ProcessConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;

/// Name shown when a connection carries no pid
pub const UNKNOWN_PROCESS: &str = "<UNKNOWN>";

/// Name shown when a pid is absent from the process table
pub const PROCESS_NOT_FOUND: &str = "<NOT FOUND>";

/// One row of the process table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    /// Process ID
    pub pid: u32,
    /// Command name (`comm`)
    pub command_name: String,
    /// Command line, `args[0]` included
    pub args: Vec<String>,
}

/// Enumerates running processes
pub trait ProcessLister: Send + Sync {
    fn list(&self) -> Result<Vec<ProcessEntry>>;
}

/// Whether an I/O error means the process went away while it was inspected
pub(crate) fn is_process_gone(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::NotFound {
        return true;
    }
    #[cfg(unix)]
    {
        if err.raw_os_error() == Some(libc::ESRCH) {
            return true;
        }
    }
    false
}

/// Outcome of a pid lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessLookup<'a> {
    /// The pid is in the table
    Known(&'a str),
    /// The pid is not in the table
    NotFound,
    /// The connection had no pid
    Unknown,
}

impl ProcessLookup<'_> {
    /// Name used for the socket owner
    pub fn display_name(&self) -> &str {
        match self {
            ProcessLookup::Known(name) => name,
            ProcessLookup::NotFound => PROCESS_NOT_FOUND,
            ProcessLookup::Unknown => UNKNOWN_PROCESS,
        }
    }
}

/// Derives display names from process entries
#[derive(Debug, Clone)]
pub struct NameDeriver {
    interpreters: Vec<String>,
    argument_width: usize,
}

impl Default for NameDeriver {
    fn default() -> Self {
        Self::from_config(&ProcessConfig::default())
    }
}

impl NameDeriver {
    pub fn from_config(config: &ProcessConfig) -> Self {
        Self {
            interpreters: config.interpreters.clone(),
            argument_width: config.argument_width.max(1),
        }
    }

    /// Whether `command` is one of the interpreters, version suffix allowed
    pub fn is_interpreter(&self, command: &str) -> bool {
        self.interpreters.iter().any(|interpreter| {
            command
                .strip_prefix(interpreter.as_str())
                .map(|rest| rest.chars().all(|c| c.is_ascii_digit() || c == '.'))
                .unwrap_or(false)
        })
    }

    /// `<interpreter>:<argument>` for interpreters, the command name otherwise
    pub fn display_name(&self, entry: &ProcessEntry) -> String {
        if !self.is_interpreter(&entry.command_name) {
            return entry.command_name.clone();
        }

        match first_meaningful_arg(&entry.args) {
            Some(arg) => format!(
                "{}:{}",
                entry.command_name,
                truncate(basename(arg), self.argument_width)
            ),
            None => entry.command_name.clone(),
        }
    }
}

/// Options whose value is a search path rather than the program being run
const PATH_OPTIONS: &[&str] = &["-cp", "-classpath", "--class-path"];

fn first_meaningful_arg(args: &[String]) -> Option<&str> {
    let mut skip_next = false;
    for arg in args.iter().skip(1) {
        if skip_next {
            skip_next = false;
            continue;
        }
        if PATH_OPTIONS.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if arg.starts_with('-') || arg.is_empty() {
            continue;
        }
        return Some(arg);
    }
    None
}

fn basename(arg: &str) -> &str {
    arg.rsplit('/').find(|part| !part.is_empty()).unwrap_or(arg)
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

/// pid → display name for one poll cycle
#[derive(Debug, Default, Clone)]
pub struct ProcessTable {
    names: HashMap<u32, String>,
}

impl ProcessTable {
    pub fn new(entries: &[ProcessEntry], deriver: &NameDeriver) -> Self {
        let names = entries
            .iter()
            .map(|entry| (entry.pid, deriver.display_name(entry)))
            .collect();
        Self { names }
    }

    pub fn lookup(&self, pid: Option<u32>) -> ProcessLookup<'_> {
        match pid {
            None => ProcessLookup::Unknown,
            Some(pid) => self
                .names
                .get(&pid)
                .map(|name| ProcessLookup::Known(name.as_str()))
                .unwrap_or(ProcessLookup::NotFound),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Process lister reading a procfs mount
#[derive(Debug, Clone)]
pub struct ProcFsProcessLister {
    root: std::path::PathBuf,
}

impl Default for ProcFsProcessLister {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcFsProcessLister {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Read processes from another procfs root
    pub fn with_root(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ProcessLister for ProcFsProcessLister {
    fn list(&self) -> Result<Vec<ProcessEntry>> {
        use crate::error::DashnetError;
        use std::fs;

        if !self.root.exists() {
            return Err(DashnetError::UnsupportedPlatform(format!(
                "{} filesystem not available",
                self.root.display()
            )));
        }

        let mut processes = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let pid = match entry.file_name().to_string_lossy().parse::<u32>() {
                Ok(pid) => pid,
                Err(_) => continue,
            };

            match read_process(&entry.path(), pid) {
                Ok(process) => processes.push(process),
                Err(e) if is_process_gone(&e) => {
                    log::debug!("process {} exited during enumeration", pid);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(processes)
    }
}

fn read_process(dir: &std::path::Path, pid: u32) -> io::Result<ProcessEntry> {
    let command_name = std::fs::read_to_string(dir.join("comm"))?.trim().to_string();
    let cmdline = std::fs::read(dir.join("cmdline"))?;

    Ok(ProcessEntry {
        pid,
        command_name,
        args: parse_cmdline(&cmdline),
    })
}

/// Split a NUL separated `/proc/<pid>/cmdline`
pub fn parse_cmdline(raw: &[u8]) -> Vec<String> {
    raw.split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pid: u32, command: &str, args: &[&str]) -> ProcessEntry {
        ProcessEntry {
            pid,
            command_name: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_plain_process_uses_command_name() {
        let deriver = NameDeriver::default();
        let e = entry(10, "curl", &["curl", "-s", "https://example.com"]);
        assert_eq!(deriver.display_name(&e), "curl");
    }

    #[test]
    fn test_interpreter_uses_first_argument() {
        let deriver = NameDeriver::default();
        let e = entry(11, "python3", &["/usr/bin/python3", "-u", "/srv/app/manage.py", "runserver"]);
        assert_eq!(deriver.display_name(&e), "python3:manage.py");

        let e = entry(12, "python3.11", &["python3.11", "-m", "http.server"]);
        assert_eq!(deriver.display_name(&e), "python3.11:http.server");
    }

    #[test]
    fn test_java_skips_classpath_value() {
        let deriver = NameDeriver::default();
        let e = entry(
            13,
            "java",
            &["java", "-Xmx2g", "-cp", "/opt/lib/*", "org.example.ServerMain"],
        );
        assert_eq!(deriver.display_name(&e), "java:org.example.ServerMain");
    }

    #[test]
    fn test_interpreter_argument_is_truncated() {
        let deriver = NameDeriver::from_config(&ProcessConfig {
            interpreters: vec!["node".to_string()],
            argument_width: 6,
        });
        let e = entry(14, "node", &["node", "dist/webpack-dev-server.js"]);
        assert_eq!(deriver.display_name(&e), "node:webpac");
    }

    #[test]
    fn test_interpreter_without_arguments() {
        let deriver = NameDeriver::default();
        assert_eq!(deriver.display_name(&entry(15, "python3", &["python3"])), "python3");
    }

    #[test]
    fn test_interpreter_prefix_must_be_version() {
        let deriver = NameDeriver::default();
        assert!(deriver.is_interpreter("python"));
        assert!(deriver.is_interpreter("python2.7"));
        assert!(!deriver.is_interpreter("pythonista"));
        assert!(!deriver.is_interpreter("nodemon"));
    }

    #[test]
    fn test_lookup_outcomes_are_distinct() {
        let table = ProcessTable::new(&[entry(1, "sshd", &["sshd"])], &NameDeriver::default());

        assert_eq!(table.lookup(Some(1)), ProcessLookup::Known("sshd"));
        assert_eq!(table.lookup(Some(2)), ProcessLookup::NotFound);
        assert_eq!(table.lookup(None), ProcessLookup::Unknown);
        assert_eq!(table.lookup(Some(2)).display_name(), PROCESS_NOT_FOUND);
        assert_eq!(table.lookup(None).display_name(), UNKNOWN_PROCESS);
        assert_ne!(PROCESS_NOT_FOUND, UNKNOWN_PROCESS);
    }

    #[test]
    fn test_parse_cmdline() {
        assert_eq!(
            parse_cmdline(b"python3\0-m\0http.server\0"),
            vec!["python3", "-m", "http.server"]
        );
        assert!(parse_cmdline(b"").is_empty());
    }

    #[test]
    fn test_procfs_lister_reads_fake_root() {
        let root = tempfile::tempdir().unwrap();
        let pid_dir = root.path().join("4242");
        std::fs::create_dir(&pid_dir).unwrap();
        std::fs::write(pid_dir.join("comm"), "ruby\n").unwrap();
        std::fs::write(pid_dir.join("cmdline"), b"ruby\0bin/rails\0server\0").unwrap();
        std::fs::create_dir(root.path().join("self")).unwrap();

        // a pid directory whose files vanished is skipped
        std::fs::create_dir(root.path().join("4243")).unwrap();

        let processes = ProcFsProcessLister::with_root(root.path()).list().unwrap();
        assert_eq!(processes, vec![entry(4242, "ruby", &["ruby", "bin/rails", "server"])]);
        assert_eq!(NameDeriver::default().display_name(&processes[0]), "ruby:rails");
    }

    #[test]
    fn test_missing_root_is_unsupported() {
        let lister = ProcFsProcessLister::with_root("/definitely/not/a/procfs");
        assert!(lister.list().is_err());
    }
}

// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fs;
use std::path::{Path, PathBuf};

use nix::unistd::Pid;
use tracing::{trace, warn};

use crate::error::ErrorKind;
use crate::Error;

pub const PROC_ROOT: &str = "/proc";

/// A live entry from the process table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: Pid,
    /// The recorded command line, arguments separated by a single space
    pub cmdline: String,
}

/// Liveness probe over a procfs style directory, one numeric directory per process
///
/// Rules:
///   - a name is alive if it appears anywhere in any process's command line, including as part
///     of a longer token, i.e. `app` matches `myapp-helper`
///   - nothing is cached, every probe re-reads the table
///   - a table that cannot be listed reports not running
#[derive(Clone, Debug)]
pub struct ProcTable {
    root: PathBuf,
}

impl ProcTable {
    pub fn new() -> Self {
        Self::with_root(PROC_ROOT)
    }

    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists every process whose command line could be read
    ///
    /// Processes which exit while the table is being read are skipped.
    pub fn processes(&self) -> Result<Vec<ProcessEntry>, Error> {
        let dir = fs::read_dir(&self.root).map_err(|source| ErrorKind::ProcessTable {
            root: self.root.clone(),
            source,
        })?;

        let mut processes = Vec::new();
        for entry in dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };

            let pid = match entry.file_name().to_str().and_then(|n| n.parse::<i32>().ok()) {
                Some(pid) => Pid::from_raw(pid),
                None => continue,
            };

            match fs::read(entry.path().join("cmdline")) {
                Ok(raw) => processes.push(ProcessEntry {
                    pid,
                    cmdline: cmdline_text(&raw),
                }),
                Err(e) => trace!(%pid, error = %e, "skipping process"),
            }
        }

        Ok(processes)
    }

    /// Returns the first process whose command line contains `name`
    pub fn find(&self, name: &str) -> Result<Option<ProcessEntry>, Error> {
        Ok(self
            .processes()?
            .into_iter()
            .find(|p| p.cmdline.contains(name)))
    }

    pub fn is_running(&self, name: &str) -> bool {
        match self.find(name) {
            Ok(Some(process)) => {
                trace!(process = name, pid = %process.pid, cmdline = %process.cmdline, "process is running");
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(process = name, error = %e, "process table unavailable, assuming not running");
                false
            }
        }
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

/// procfs separates arguments with NUL and terminates the last one with NUL
fn cmdline_text(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
    String::from_utf8_lossy(raw).replace('\0', " ")
}

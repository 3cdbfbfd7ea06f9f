// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

pub mod launcher;
mod liveness;
mod supervisor;

pub use liveness::{ProcTable, ProcessEntry, PROC_ROOT};
pub use supervisor::{Outcome, ReconcileReport, Supervisor};

#[cfg(target_os = "linux")]
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nix::unistd::Pid;

use crate::config::ProcessSpec;
use crate::error::ErrorKind;
use crate::Error;

/// The result of a successful launch, not retained across reconciliation passes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunningProcess {
    pub pid: Pid,
}

/// A trait to define the host capabilities for starting and finding processes
pub trait ProcessBackend {
    /// Starts a new instance of `spec`, returning once the image is running
    fn start_process(&self, spec: &ProcessSpec) -> Result<RunningProcess, Error>;

    /// True if `name` appears anywhere in the command line of a live process
    fn is_process_running(&self, name: &str) -> bool;

    /// Collect any children started by this backend that have exited since the last pass
    ///
    /// Children the embedding program created by other means must never be waited on here.
    fn reap_exited(&self) {}
}

/// All supported hosts, chosen once at startup
#[derive(Clone, Debug)]
pub enum Backend {
    #[cfg(target_os = "linux")]
    Linux(LinuxBackend),
    Unsupported(Unsupported),
}

impl Backend {
    /// Selects the backend for the host this was compiled for
    pub fn detect() -> Self {
        #[cfg(target_os = "linux")]
        {
            Backend::Linux(LinuxBackend::new())
        }

        #[cfg(not(target_os = "linux"))]
        {
            Backend::Unsupported(Unsupported::new(std::env::consts::OS))
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Backend::Unsupported(_))
    }

    pub fn os(&self) -> &'static str {
        match self {
            #[cfg(target_os = "linux")]
            Backend::Linux(_) => "linux",
            Backend::Unsupported(unsupported) => unsupported.os,
        }
    }
}

impl ProcessBackend for Backend {
    fn start_process(&self, spec: &ProcessSpec) -> Result<RunningProcess, Error> {
        match self {
            #[cfg(target_os = "linux")]
            Backend::Linux(backend) => backend.start_process(spec),
            Backend::Unsupported(backend) => backend.start_process(spec),
        }
    }

    fn is_process_running(&self, name: &str) -> bool {
        match self {
            #[cfg(target_os = "linux")]
            Backend::Linux(backend) => backend.is_process_running(name),
            Backend::Unsupported(backend) => backend.is_process_running(name),
        }
    }

    fn reap_exited(&self) {
        match self {
            #[cfg(target_os = "linux")]
            Backend::Linux(backend) => backend.reap_exited(),
            Backend::Unsupported(backend) => backend.reap_exited(),
        }
    }
}

/// fork/exec launches with liveness read from procfs
#[cfg(target_os = "linux")]
#[derive(Clone, Debug, Default)]
pub struct LinuxBackend {
    table: ProcTable,
    children: Arc<Mutex<Vec<Pid>>>,
}

#[cfg(target_os = "linux")]
impl LinuxBackend {
    pub fn new() -> Self {
        Self::with_table(ProcTable::new())
    }

    pub fn with_table(table: ProcTable) -> Self {
        Self {
            table,
            children: Arc::default(),
        }
    }

    fn children(&self) -> MutexGuard<'_, Vec<Pid>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(target_os = "linux")]
impl ProcessBackend for LinuxBackend {
    fn start_process(&self, spec: &ProcessSpec) -> Result<RunningProcess, Error> {
        let process = launcher::launch(spec)?;
        self.children().push(process.pid);
        Ok(process)
    }

    fn is_process_running(&self, name: &str) -> bool {
        self.table.is_running(name)
    }

    fn reap_exited(&self) {
        launcher::reap_exited(&mut self.children());
    }
}

/// A host without an implementation, nothing is ever running and nothing can be started
#[derive(Clone, Copy, Debug)]
pub struct Unsupported {
    os: &'static str,
}

impl Unsupported {
    pub fn new(os: &'static str) -> Self {
        Self { os }
    }
}

impl ProcessBackend for Unsupported {
    fn start_process(&self, _spec: &ProcessSpec) -> Result<RunningProcess, Error> {
        Err(ErrorKind::Unsupported { os: self.os }.into())
    }

    fn is_process_running(&self, _name: &str) -> bool {
        false
    }
}

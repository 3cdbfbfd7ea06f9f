// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::error::Error as StdError;

use tracing::{debug, error, info};

use crate::config::{Config, ConfigLoader, ProcessSpec};
use crate::procs::{ProcessBackend, RunningProcess};
use crate::Error;

/// What a reconciliation pass did for a single spec
#[derive(Debug)]
pub enum Outcome {
    AlreadyRunning { name: String },
    Started { name: String, process: RunningProcess },
    Failed { name: String, error: Error },
}

impl Outcome {
    pub fn name(&self) -> &str {
        match self {
            Outcome::AlreadyRunning { name }
            | Outcome::Started { name, .. }
            | Outcome::Failed { name, .. } => name,
        }
    }

    /// True if a launch was attempted for this spec
    pub fn attempted(&self) -> bool {
        !matches!(self, Outcome::AlreadyRunning { .. })
    }
}

/// One outcome per configured spec, in configuration order
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub outcomes: Vec<Outcome>,
}

impl ReconcileReport {
    pub fn started(&self) -> impl Iterator<Item = (&str, RunningProcess)> {
        self.outcomes.iter().filter_map(|o| match o {
            Outcome::Started { name, process } => Some((name.as_str(), *process)),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.outcomes.iter().filter_map(|o| match o {
            Outcome::Failed { name, error } => Some((name.as_str(), error)),
            _ => None,
        })
    }

    pub fn launch_attempts(&self) -> usize {
        self.outcomes.iter().filter(|o| o.attempted()).count()
    }
}

/// Launch and monitor processes
///
/// Rules:
///   - each pass probes every spec fresh, liveness never relies on pids from earlier passes
///   - at most one launch per spec per pass, no retries
///   - a failed launch never stops the rest of the pass
///   - a configuration that fails to load never replaces the active one
///   - passes must not run concurrently, only one thread may own the supervisor
pub struct Supervisor<B, L> {
    backend: B,
    loader: L,
    config: Config,
}

impl<B: ProcessBackend, L: ConfigLoader> Supervisor<B, L> {
    /// Creates a supervisor with an empty configuration, see `reload`
    pub fn new(backend: B, loader: L) -> Self {
        Self::with_config(backend, loader, Config::default())
    }

    pub fn with_config(backend: B, loader: L, config: Config) -> Self {
        Self {
            backend,
            loader,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Replaces the active configuration with a freshly loaded one
    ///
    /// On failure the active configuration is left untouched.
    pub fn reload(&mut self) -> Result<&Config, Error> {
        let config = self.loader.load()?;
        info!(processes = config.len(), "loaded config");
        debug!(?config);

        self.config = config;
        Ok(&self.config)
    }

    /// Starts every configured process that is not already running
    pub fn reconcile(&mut self) -> ReconcileReport {
        self.backend.reap_exited();

        let outcomes = self
            .config
            .processes
            .iter()
            .map(|spec| reconcile_one(&self.backend, spec))
            .collect();

        ReconcileReport { outcomes }
    }

    /// Reloads the configuration and then reconciles
    ///
    /// A load failure is reported and the pass runs against the previous configuration.
    pub fn reload_and_reconcile(&mut self) -> ReconcileReport {
        if let Err(e) = self.reload() {
            error!(error = &e as &dyn StdError, "keeping previous config");
        }

        self.reconcile()
    }
}

fn reconcile_one<B: ProcessBackend>(backend: &B, spec: &ProcessSpec) -> Outcome {
    let name = spec.name.clone();

    if backend.is_process_running(&spec.name) {
        debug!(process = %spec.name, "already running");
        return Outcome::AlreadyRunning { name };
    }

    match backend.start_process(spec) {
        Ok(process) => {
            info!(process = %spec.name, path = %spec.path, pid = %process.pid, "started");
            Outcome::Started { name, process }
        }
        Err(error) => {
            error!(
                process = %spec.name,
                path = %spec.path,
                error = &error as &dyn StdError,
                "start failed"
            );
            Outcome::Failed { name, error }
        }
    }
}

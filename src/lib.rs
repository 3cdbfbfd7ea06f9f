// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A minimal process supervisor
//!
//! Keeps every process named in a configuration file running: each reconciliation pass probes the
//!  host process table and launches whatever is missing. The configuration is re-applied whenever
//!  the file changes on disk.

pub mod config;
mod error;
pub mod procs;
pub mod watch;

pub use config::{Config, ConfigLoader, JsonConfigLoader, ProcessSpec};
pub use error::{Error, ErrorKind};
pub use procs::{Backend, ProcessBackend, RunningProcess, Supervisor};
pub use watch::{ConfigWatcher, WatchEvent};

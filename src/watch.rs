// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Watches the configuration file for changes

use std::fmt;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

#[cfg(target_os = "linux")]
use nix::errno::Errno;
#[cfg(target_os = "linux")]
use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify};
use tracing::{debug, trace, warn};

use crate::error::ErrorKind;
use crate::Error;

/// The configuration file changed, no other detail is carried
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchEvent;

/// Blocking watch on a single configuration file
///
/// Every batch of kernel events is delivered as one `WatchEvent` regardless of the event kinds.
///  If the kernel drops the watch, i.e. the file was replaced or deleted, the path is registered
///  again. When that is not possible the watcher fails and no further events are delivered.
pub struct ConfigWatcher {
    path: PathBuf,
    #[cfg(target_os = "linux")]
    inotify: Inotify,
    failure: Option<Error>,
}

#[cfg(target_os = "linux")]
impl ConfigWatcher {
    fn mask() -> AddWatchFlags {
        AddWatchFlags::IN_MODIFY | AddWatchFlags::IN_MOVE_SELF | AddWatchFlags::IN_DELETE_SELF
    }

    /// Registers a watch on `path`, which must exist
    pub fn register<P: Into<PathBuf>>(path: P) -> Result<Self, Error> {
        let path = path.into();
        let inotify =
            Inotify::init(InitFlags::IN_CLOEXEC).map_err(|source| ErrorKind::WatchRegistration {
                path: path.clone(),
                source,
            })?;

        let watcher = Self {
            path,
            inotify,
            failure: None,
        };
        watcher.arm()?;

        Ok(watcher)
    }

    fn arm(&self) -> Result<(), Error> {
        self.inotify
            .add_watch(&self.path, Self::mask())
            .map_err(|source| ErrorKind::WatchRegistration {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), "watching config");
        Ok(())
    }

    /// Blocks until the file changes
    pub fn next_event(&mut self) -> Result<WatchEvent, Error> {
        if let Some(failure) = self.failure.take() {
            return Err(failure);
        }

        loop {
            let events = match self.inotify.read_events() {
                Ok(events) if events.is_empty() => continue,
                Ok(events) => events,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(ErrorKind::Watch(e).into()),
            };

            trace!(count = events.len(), "watch events");

            if events
                .iter()
                .any(|e| e.mask.contains(AddWatchFlags::IN_IGNORED))
            {
                warn!(path = %self.path.display(), "watch dropped, registering again");
                // the change itself is still delivered, the failure is returned on the next call
                if let Err(e) = self.arm() {
                    self.failure = Some(e);
                }
            }

            return Ok(WatchEvent);
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl ConfigWatcher {
    pub fn register<P: Into<PathBuf>>(path: P) -> Result<Self, Error> {
        Err(ErrorKind::WatchRegistration {
            path: path.into(),
            source: nix::Error::ENOSYS,
        }
        .into())
    }

    pub fn next_event(&mut self) -> Result<WatchEvent, Error> {
        match self.failure.take() {
            Some(failure) => Err(failure),
            None => Err(ErrorKind::ErrorStr("watch is not registered").into()),
        }
    }
}

impl fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("path", &self.path)
            .field("failure", &self.failure)
            .finish()
    }
}

impl ConfigWatcher {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Calls `on_change` for every event until it breaks or the watch fails
    ///
    /// Events are handled one at a time, `on_change` is never called concurrently.
    pub fn watch<F>(&mut self, mut on_change: F) -> Result<(), Error>
    where
        F: FnMut(WatchEvent) -> ControlFlow<()>,
    {
        loop {
            let event = self.next_event()?;
            debug!(path = %self.path.display(), "config changed");

            if on_change(event).is_break() {
                return Ok(());
            }
        }
    }
}

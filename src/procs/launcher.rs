// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::ffi::CString;
use std::fs::File;
use std::io::Read;
use std::os::raw::c_char;
use std::os::unix::io::{AsRawFd, OwnedFd};
use std::ptr;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, pipe2, ForkResult, Pid};
use tracing::{debug, info, warn};

use crate::config::ProcessSpec;
use crate::error::ErrorKind;
use crate::procs::RunningProcess;
use crate::Error;

/// Exit code of a child that could not load its image, matches the shell's "command not found"
pub const EXEC_FAILED: i32 = 127;

/// Launch programs
///
/// Rules:
/// - the new image is `path` with argv `[path, args...]`
/// - the child never returns into the caller, it either becomes `path` or exits with `EXEC_FAILED`
/// - a child that cannot load `path` is reported as an error and reaped
/// - the new image starts with the default SIGPIPE disposition, not the ignored one Rust sets up
pub fn launch(spec: &ProcessSpec) -> Result<RunningProcess, Error> {
    // everything the child needs is allocated before fork
    let argv = spec
        .argv()
        .into_iter()
        .map(CString::new)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ErrorKind::InvalidArgument {
            path: spec.path.clone(),
            source,
        })?;
    // null terminated, pointing into `argv` which outlives the fork
    let argv_ptrs: Vec<*const c_char> = argv
        .iter()
        .map(|arg| arg.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect();

    let (exec_status, exec_report) =
        pipe2(OFlag::O_CLOEXEC).map_err(|source| ErrorKind::ProcessStart {
            path: spec.path.clone(),
            source,
        })?;

    // This is safe because the child makes no allocations and only calls async-signal-safe
    //  functions before exec or _exit
    match unsafe { fork() } {
        Ok(ForkResult::Child) => unsafe { exec_child(&argv_ptrs, &exec_report) },
        Ok(ForkResult::Parent { child }) => {
            drop(exec_report);

            match read_exec_status(exec_status) {
                None => Ok(RunningProcess { pid: child }),
                Some(errno) => {
                    waitpid(child, None).ok();
                    Err(ErrorKind::Exec {
                        path: spec.path.clone(),
                        source: errno,
                    }
                    .into())
                }
            }
        }
        Err(source) => Err(ErrorKind::ProcessStart {
            path: spec.path.clone(),
            source,
        }
        .into()),
    }
}

/// Only async-signal-safe calls are allowed here, `argv` must be null terminated
unsafe fn exec_child(argv: &[*const c_char], exec_report: &OwnedFd) -> ! {
    libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    libc::execv(argv[0], argv.as_ptr());

    let code = (Errno::last() as i32).to_ne_bytes();
    // a failed write is ignored, the parent then sees a successful exec and a child exiting 127
    libc::write(
        exec_report.as_raw_fd(),
        code.as_ptr().cast(),
        code.len(),
    );

    libc::_exit(EXEC_FAILED)
}

/// The write end is close-on-exec, so EOF without data means the exec succeeded
fn read_exec_status(exec_status: OwnedFd) -> Option<Errno> {
    let mut status = File::from(exec_status);
    let mut buf = Vec::with_capacity(4);

    if let Err(e) = status.read_to_end(&mut buf) {
        warn!(error = %e, "could not read exec status, assuming success");
        return None;
    }

    let code: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    Some(Errno::from_raw(i32::from_ne_bytes(code)))
}

/// Collects the exited children among `children` without blocking, returns how many were reaped
///
/// Only the given pids are waited on, other children of this process are left to their owners.
///  Zombies keep an empty command line in the process table, so they are never seen as running,
///  this only keeps them from accumulating between passes.
pub fn reap_exited(children: &mut Vec<Pid>) -> usize {
    let before = children.len();
    children.retain(|&pid| !reap(pid));
    before - children.len()
}

/// True once `pid` is no longer ours to wait on
fn reap(pid: Pid) -> bool {
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => return false,
            Ok(WaitStatus::Exited(pid, code)) => {
                info!(%pid, code, "process exited");
                return true;
            }
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                info!(%pid, ?signal, "process killed");
                return true;
            }
            Ok(status) => {
                debug!(?status, "child changed state");
                return false;
            }
            Err(Errno::EINTR) => continue,
            Err(e) => {
                debug!(%pid, error = %e, "child is gone");
                return true;
            }
        }
    }
}

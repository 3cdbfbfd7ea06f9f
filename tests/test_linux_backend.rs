#![cfg(target_os = "linux")]

mod common;

use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;

use procsup::procs::{LinuxBackend, Outcome, ProcTable};
use procsup::{Config, ErrorKind, ProcessBackend, Supervisor};

use common::{spec, ScriptedLoader};

/// A name that only the process started by this test will carry
fn marker(test: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .subsec_nanos();
    format!("procsup-{}-{}-{}", test, std::process::id(), nanos)
}

/// `sh` stays in the foreground with the marker in its command line
fn sleeper(marker: &str) -> procsup::ProcessSpec {
    let script = format!("sleep 30; : {}", marker);
    spec(marker, "/bin/sh", &["-c", script.as_str()])
}

fn stop(pid: Pid) {
    kill(pid, Signal::SIGKILL).ok();
    waitpid(pid, None).ok();
}

#[test]
fn test_started_process_is_running_on_next_pass() {
    let marker = marker("rerun");
    let mut supervisor = Supervisor::with_config(
        LinuxBackend::new(),
        ScriptedLoader::new(),
        Config {
            processes: vec![sleeper(&marker)],
        },
    );

    let first = supervisor.reconcile();
    let (_, process) = first.started().next().expect("sh was started");

    let second = supervisor.reconcile();
    assert_eq!(second.launch_attempts(), 0);
    assert!(matches!(second.outcomes[0], Outcome::AlreadyRunning { .. }));

    let listed = ProcTable::new()
        .find(&marker)
        .expect("procfs is readable")
        .expect("started process is listed");
    assert_eq!(listed.pid, process.pid);
    assert!(listed.cmdline.starts_with("/bin/sh -c sleep 30;"));

    stop(process.pid);
}

#[test]
fn test_name_spanning_arguments_is_running() {
    let marker = marker("spanning");
    // argv is ["/bin/sh", "-c", "sleep 30; :", marker], the name crosses the last boundary
    let name = format!("sleep 30; : {}", marker);
    let mut supervisor = Supervisor::with_config(
        LinuxBackend::new(),
        ScriptedLoader::new(),
        Config {
            processes: vec![spec(&name, "/bin/sh", &["-c", "sleep 30; :", marker.as_str()])],
        },
    );

    let first = supervisor.reconcile();
    let (_, process) = first.started().next().expect("sh was started");

    let listed = ProcTable::new()
        .find(&name)
        .expect("procfs is readable")
        .expect("separators are matched as spaces");
    assert_eq!(listed.pid, process.pid);
    assert_eq!(listed.cmdline, format!("/bin/sh -c sleep 30; : {}", marker));

    let second = supervisor.reconcile();
    assert_eq!(second.launch_attempts(), 0);

    stop(process.pid);
}

#[test]
fn test_children_started_elsewhere_are_not_reaped() {
    let backend = LinuxBackend::new();
    let mut other = Command::new("/bin/sh")
        .args(["-c", "exit 0"])
        .spawn()
        .expect("sh spawns");
    let process = backend
        .start_process(&spec("procsup-own", "/bin/sh", &["-c", "exit 0"]))
        .expect("sh starts");
    let proc_dir = Path::new("/proc").join(process.pid.to_string());

    for _ in 0..250 {
        backend.reap_exited();
        if !proc_dir.exists() {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    assert!(!proc_dir.exists(), "own child {} was never reaped", process.pid);

    let status = other.wait().expect("child spawned elsewhere is still waitable");
    assert!(status.success());
}

#[test]
fn test_missing_image_does_not_stop_the_pass() {
    let marker = marker("missing");
    let mut supervisor = Supervisor::with_config(
        LinuxBackend::new(),
        ScriptedLoader::new(),
        Config {
            processes: vec![
                spec("procsup-missing-image", "/nonexistent/procsup/bin", &[]),
                sleeper(&marker),
            ],
        },
    );

    let report = supervisor.reconcile();

    let (name, error) = report.failed().next().expect("missing image fails");
    assert_eq!(name, "procsup-missing-image");
    assert!(matches!(
        error.kind(),
        ErrorKind::Exec {
            source: Errno::ENOENT,
            ..
        }
    ));

    let (name, process) = report.started().next().expect("next spec still starts");
    assert_eq!(name, marker);

    stop(process.pid);
}

#[test]
fn test_exited_children_are_reaped() {
    let backend = LinuxBackend::new();
    let process = backend
        .start_process(&spec("procsup-exits", "/bin/sh", &["-c", "exit 0"]))
        .expect("sh starts");
    let proc_dir = Path::new("/proc").join(process.pid.to_string());

    for _ in 0..250 {
        backend.reap_exited();
        if !proc_dir.exists() {
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }

    panic!("child {} was never reaped", process.pid);
}

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use nix::errno::Errno;
use nix::unistd::Pid;

use procsup::{
    Config, ConfigLoader, Error, ErrorKind, ProcessBackend, ProcessSpec, RunningProcess,
};

/// Records launches and emulates substring liveness over a list of command lines
#[allow(unused)]
#[derive(Default)]
pub struct FakeBackend {
    running: Mutex<Vec<String>>,
    launches: Mutex<Vec<Vec<String>>>,
    probes: Mutex<Vec<String>>,
    failing_paths: Vec<String>,
    next_pid: AtomicI32,
}

#[allow(unused)]
impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A process with this command line is already alive
    pub fn with_running(self, cmdline: &str) -> Self {
        self.running.lock().unwrap().push(cmdline.to_string());
        self
    }

    /// Launches of this path fail as if fork had failed
    pub fn failing(mut self, path: &str) -> Self {
        self.failing_paths.push(path.to_string());
        self
    }

    /// Simulates every process whose command line contains `name` exiting
    pub fn kill(&self, name: &str) {
        self.running.lock().unwrap().retain(|c| !c.contains(name));
    }

    /// argv of every launch attempt, in order
    pub fn launches(&self) -> Vec<Vec<String>> {
        self.launches.lock().unwrap().clone()
    }

    pub fn probes(&self) -> Vec<String> {
        self.probes.lock().unwrap().clone()
    }
}

impl ProcessBackend for FakeBackend {
    fn start_process(&self, spec: &ProcessSpec) -> Result<RunningProcess, Error> {
        let argv: Vec<String> = spec.argv().into_iter().map(String::from).collect();
        self.launches.lock().unwrap().push(argv.clone());

        if self.failing_paths.contains(&spec.path) {
            return Err(ErrorKind::ProcessStart {
                path: spec.path.clone(),
                source: Errno::EAGAIN,
            }
            .into());
        }

        self.running.lock().unwrap().push(argv.join(" "));
        let pid = 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        Ok(RunningProcess {
            pid: Pid::from_raw(pid),
        })
    }

    fn is_process_running(&self, name: &str) -> bool {
        self.probes.lock().unwrap().push(name.to_string());
        self.running
            .lock()
            .unwrap()
            .iter()
            .any(|cmdline| cmdline.contains(name))
    }
}

/// Hands out a scripted sequence of load results, then fails
#[allow(unused)]
#[derive(Default)]
pub struct ScriptedLoader {
    results: Mutex<VecDeque<Result<Config, Error>>>,
}

#[allow(unused)]
impl ScriptedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_config(self, config: Config) -> Self {
        self.results.lock().unwrap().push_back(Ok(config));
        self
    }

    pub fn then_json(self, json: &str) -> Self {
        let result: Result<Config, Error> = Config::from_json(json).map_err(|source| {
            ErrorKind::ConfigParse {
                path: "config.json".into(),
                source,
            }
            .into()
        });
        self.results.lock().unwrap().push_back(result);
        self
    }
}

impl ConfigLoader for ScriptedLoader {
    fn load(&self) -> Result<Config, Error> {
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::from("no more configs")))
    }
}

#[allow(unused)]
pub fn spec(name: &str, path: &str, args: &[&str]) -> ProcessSpec {
    args.iter()
        .fold(ProcessSpec::new(name, path), |spec, arg| spec.arg(*arg))
}

#[allow(unused)]
pub fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::ops::ControlFlow;
use std::path::PathBuf;

use clap::{App, Arg};
use futures::future::FutureExt;
use futures::{pin_mut, select};
use tokio::runtime;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use procsup::{
    Backend, ConfigLoader, ConfigWatcher, Error, ErrorKind, JsonConfigLoader, ProcessBackend,
    Supervisor,
};

const CONFIG: &str = "config";
const ONCE: &str = "once";
const LOG_LEVEL: &str = "log-level";

trait SetupClapApp {
    fn setup_clap_app(self) -> Self;
}

impl<'a, 'b> SetupClapApp for App<'a, 'b> {
    fn setup_clap_app(self) -> Self {
        self.version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
    }
}

fn main() -> Result<(), Error> {
    let args = App::new(env!("CARGO_PKG_NAME"))
        .setup_clap_app()
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name(CONFIG)
                .value_name("FILE")
                .default_value("config.json")
                .help("JSON file listing the processes to keep running"),
        )
        .arg(
            Arg::with_name(ONCE)
                .long(ONCE)
                .help("start missing processes once and exit, without watching the config"),
        )
        .arg(
            Arg::with_name(LOG_LEVEL)
                .long(LOG_LEVEL)
                .value_name("LEVEL")
                .default_value("info")
                .help("log filter used when RUST_LOG is not set"),
        )
        .get_matches();

    init_logging(args.value_of(LOG_LEVEL).unwrap_or("info"));

    // the only fatal startup error, everything after this is reported and survived
    let backend = Backend::detect();
    if !backend.is_supported() {
        error!(os = backend.os(), "no process backend for this host");
        return Err(ErrorKind::Unsupported { os: backend.os() }.into());
    }

    let config_path = args
        .value_of_os(CONFIG)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let once = args.is_present(ONCE);

    let runtime = runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(run(config_path, backend, once));

    // a watch worker blocked on the next event is abandoned, supervised processes keep running
    runtime.shutdown_background();
    result
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config_path: PathBuf, backend: Backend, once: bool) -> Result<(), Error> {
    // registered before the first load so that no write in between is missed
    let watcher = if once {
        None
    } else {
        ConfigWatcher::register(&config_path)
            .map_err(|e| {
                error!(
                    error = &e as &dyn std::error::Error,
                    "config will not be reloaded"
                )
            })
            .ok()
    };

    let mut supervisor = Supervisor::new(backend, JsonConfigLoader::new(&config_path));
    supervisor.reload_and_reconcile();

    if once {
        return Ok(());
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let shutdown = wait_for_shutdown(&mut sigterm).fuse();
    pin_mut!(shutdown);

    if let Some(watcher) = watcher {
        let mut worker =
            tokio::task::spawn_blocking(move || watch_worker(watcher, supervisor)).fuse();

        select! {
            finished = worker => match finished {
                Ok(Ok(())) => warn!("config watch stopped"),
                Ok(Err(e)) => error!(
                    error = &e as &dyn std::error::Error,
                    "config watch failed, hot reload disabled"
                ),
                Err(e) => error!(error = %e, "config watch worker panicked, hot reload disabled"),
            },
            () = shutdown => return Ok(()),
        }
    }

    info!("running without hot reload until shutdown");
    shutdown.await;
    Ok(())
}

/// The only place reconciliation runs after startup, one event at a time
fn watch_worker<B, L>(
    mut watcher: ConfigWatcher,
    mut supervisor: Supervisor<B, L>,
) -> Result<(), Error>
where
    B: ProcessBackend,
    L: ConfigLoader,
{
    info!(path = %watcher.path().display(), "watching config");

    watcher.watch(|_| {
        let report = supervisor.reload_and_reconcile();
        info!(
            processes = report.outcomes.len(),
            started = report.started().count(),
            failed = report.failed().count(),
            "reconciled"
        );
        ControlFlow::Continue(())
    })
}

async fn wait_for_shutdown(sigterm: &mut Signal) {
    let interrupt = tokio::signal::ctrl_c().fuse();
    let terminate = sigterm.recv().fuse();
    pin_mut!(interrupt, terminate);

    select! {
        _ = interrupt => info!("interrupted, shutting down"),
        _ = terminate => info!("terminated, shutting down"),
    }
}

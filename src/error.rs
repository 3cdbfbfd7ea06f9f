use std::ffi::NulError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("io error")]
    IoError(#[from] io::Error),
    #[error("nix error")]
    NixError(#[from] nix::Error),
    #[error("could not read configuration {}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not parse configuration {}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("process start failed: {path}")]
    ProcessStart {
        path: String,
        #[source]
        source: nix::Error,
    },
    #[error("process image could not be loaded: {path}")]
    Exec {
        path: String,
        #[source]
        source: nix::Error,
    },
    #[error("process start failed, argument contains a NUL byte: {path}")]
    InvalidArgument {
        path: String,
        #[source]
        source: NulError,
    },
    #[error("could not enumerate processes under {}", .root.display())]
    ProcessTable {
        root: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not watch {}", .path.display())]
    WatchRegistration {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
    #[error("reading watch events failed")]
    Watch(#[source] nix::Error),
    #[error("no process backend for this platform: {os}")]
    Unsupported { os: &'static str },
    #[error("an error occured: {0}")]
    ErrorMsg(String),
    #[error("an error occured: {0}")]
    ErrorStr(&'static str),
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// The configuration could not be read or parsed, the previous one stays active
    pub fn is_config_error(&self) -> bool {
        matches!(
            self.0,
            ErrorKind::ConfigRead { .. } | ErrorKind::ConfigParse { .. }
        )
    }

    /// A single process could not be started, others are unaffected
    pub fn is_launch_error(&self) -> bool {
        matches!(
            self.0,
            ErrorKind::ProcessStart { .. }
                | ErrorKind::Exec { .. }
                | ErrorKind::InvalidArgument { .. }
                | ErrorKind::Unsupported { .. }
        )
    }

    /// The watch on the configuration file is gone, hot reload is disabled
    pub fn is_watch_error(&self) -> bool {
        matches!(
            self.0,
            ErrorKind::WatchRegistration { .. } | ErrorKind::Watch(..)
        )
    }
}

impl<E> From<E> for Error
where
    E: Into<ErrorKind>,
{
    fn from(err: E) -> Self {
        Self::from_kind(err.into())
    }
}

impl From<&'static str> for Error {
    fn from(err: &'static str) -> Self {
        Self::from_kind(ErrorKind::ErrorStr(err))
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::from_kind(ErrorKind::ErrorMsg(err))
    }
}

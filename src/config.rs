// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The declarative list of processes to keep running

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::error::ErrorKind;
use crate::Error;

/// One process the supervisor is responsible for
///
/// `name` is the key used to detect the process in the process table, it does not need to match
///  the basename of `path`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ProcessSpec {
    pub name: String,
    pub path: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub args: Vec<String>,
}

impl ProcessSpec {
    pub fn new<N, P>(name: N, path: P) -> Self
    where
        N: Into<String>,
        P: Into<String>,
    {
        Self {
            name: name.into(),
            path: path.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<A: Into<String>>(mut self, arg: A) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The argument vector handed to the new process image, `path` followed by `args`
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.path.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

/// The full set of processes, replaced wholesale on every reload
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub processes: Vec<ProcessSpec>,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Source of fresh configurations
pub trait ConfigLoader {
    fn load(&self) -> Result<Config, Error>;
}

/// Loads the configuration from a JSON file on disk
#[derive(Clone, Debug)]
pub struct JsonConfigLoader {
    path: PathBuf,
}

impl JsonConfigLoader {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigLoader for JsonConfigLoader {
    fn load(&self) -> Result<Config, Error> {
        let bytes = std::fs::read(&self.path).map_err(|source| ErrorKind::ConfigRead {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_slice(&bytes).map_err(|source| {
            ErrorKind::ConfigParse {
                path: self.path.clone(),
                source,
            }
            .into()
        })
    }
}

// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};

use crate::errors::ConfigError;
use crate::runner::PackageManager;

pub const CONFIG_FILENAME: &str = "envprov.yml";

const DEFAULT_EXECUTABLE: &str = "conda";
const LOGNAME: &str = "envprov::config";

#[serde_as]
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    #[serde(skip)]
    source: Option<PathBuf>,

    executable: String,

    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    timeout: Option<Duration>,

    channels: Vec<String>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            source: None,
            executable: DEFAULT_EXECUTABLE.to_string(),
            timeout: None,
            channels: Vec::new(),
        }
    }
}

impl Config {
    /// The file this configuration was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn executable(&self) -> &str {
        self.executable.as_str()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn with_executable<S: Into<String>>(mut self, executable: S) -> Config {
        self.executable = executable.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Config {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the process runner for this configuration, placing the
    /// configured channels after the ones the environment file asks for.
    pub fn package_manager(&self, channels: &[String]) -> Result<PackageManager, ConfigError> {
        let words = shlex::split(&self.executable).unwrap_or_default();
        let (program, args) = match words.split_first() {
            Some((program, args)) if !program.is_empty() => (program, args),
            _ => {
                return Err(ConfigError::InvalidExecutable {
                    executable: self.executable.clone(),
                })
            }
        };

        let mut all = channels.to_vec();
        for channel in &self.channels {
            if !all.contains(channel) {
                all.push(channel.clone());
            }
        }

        Ok(PackageManager::new(program.clone())
            .with_args(args.to_vec())
            .with_channels(all)
            .with_timeout(self.timeout))
    }
}

impl Config {
    pub fn load<P>(file: P) -> Result<Config, ConfigError>
    where
        P: AsRef<Path>,
    {
        let file = file.as_ref();
        let reader = File::open(file).map_err(|source| ConfigError::Unreadable { source })?;
        let config: Config = serde_yaml::from_reader(reader)
            .map_err(|source| ConfigError::InvalidConfig { source })?;

        debug!(target: LOGNAME, "loaded configuration from {}", file.display());

        Ok(Config {
            source: Some(file.to_path_buf()),
            ..config
        })
    }

    /// Looks for a configuration file in `path` and each of its parents,
    /// falling back to the defaults when there isn't one.
    pub fn find<P>(path: P) -> Result<Config, ConfigError>
    where
        P: Into<PathBuf>,
    {
        let mut path = path.into();
        let target = loop {
            path.push(CONFIG_FILENAME);
            let found = path
                .try_exists()
                .map_err(|source| ConfigError::DirectoryTraversalError { source })?;
            if found && path.is_file() {
                break path;
            }

            // Remove the filename, and the parent, and
            // if that's not successful, there is no config.
            if !(path.pop() && path.pop()) {
                return Ok(Config::default());
            }
        };

        Config::load(target)
    }
}

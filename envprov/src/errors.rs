// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpecError {
    #[error("could not read environment file '{path}'")]
    Unreadable { path: String, source: vfs::VfsError },

    #[error("environment file '{path}' does not exist or is not a file")]
    NotFound { path: String },

    #[error("invalid environment file")]
    Invalid { source: serde_yaml::Error },

    #[error("environment name must not be empty")]
    EmptyName,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read configuration file")]
    Unreadable { source: std::io::Error },

    #[error("invalid configuration")]
    InvalidConfig { source: serde_yaml::Error },

    #[error("unable to traverse directory")]
    DirectoryTraversalError { source: std::io::Error },

    #[error("invalid package manager executable '{executable}'")]
    InvalidExecutable { executable: String },
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("could not start '{program}'")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("'{command}' failed with {status}{}", stderr_suffix(.stderr))]
    Failed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("'{command}' did not finish within {:?}", .timeout)]
    TimedOut { command: String, timeout: Duration },

    #[error("could not wait for '{command}'")]
    Wait {
        command: String,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("environment '{environment}' lists no runtime dependency to create it with")]
    NoRuntime { environment: String },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

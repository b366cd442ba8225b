// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

//! Provisions package manager environments from an `environment.yml` style
//! definition: either creating the environment with its runtime, or
//! installing the remaining dependencies into it one at a time.

pub use crate::config::{Config, CONFIG_FILENAME};
pub use crate::errors::{CommandError, ConfigError, ProvisionError, SpecError};
pub use crate::provisioner::{chain, Outcome, Provisioner, Report};
pub use crate::runner::{Invocation, PackageManager, Runner};
pub use crate::spec::{EnvironmentSpec, SPEC_FILENAME};
pub use crate::types::RuntimeSpec;

mod config;
mod errors;
mod progress;
mod provisioner;
mod runner;
mod spec;
mod types;

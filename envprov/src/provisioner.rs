// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

use std::error::Error;

use log::{error, info};
use serde::{Serialize, Serializer};

use crate::errors::{CommandError, ProvisionError};
use crate::progress::Progress;
use crate::runner::{Invocation, Runner};
use crate::spec::EnvironmentSpec;

const LOGNAME: &str = "envprov::provisioner";

/// What happened to a single package manager invocation.
#[derive(Serialize, Debug)]
pub struct Outcome {
    #[serde(flatten)]
    invocation: Invocation,
    #[serde(serialize_with = "serialize_error")]
    error: Option<CommandError>,
}

impl Outcome {
    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn dependency(&self) -> &str {
        self.invocation.dependency()
    }

    pub fn error(&self) -> Option<&CommandError> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Every outcome of one run against an environment, in the order the
/// commands were issued.
#[derive(Serialize, Debug)]
pub struct Report {
    environment: String,
    outcomes: Vec<Outcome>,
}

impl Report {
    pub fn new<S: Into<String>>(environment: S) -> Report {
        Report {
            environment: environment.into(),
            outcomes: Vec::new(),
        }
    }

    pub fn environment(&self) -> &str {
        self.environment.as_str()
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn push(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(Outcome::is_success)
    }
}

pub struct Provisioner<'p, R> {
    runner: R,
    progress: Progress<'p>,
}

impl<'p, R: Runner> Provisioner<'p, R> {
    pub fn new(runner: R) -> Provisioner<'p, R> {
        Provisioner {
            runner,
            progress: Progress::new(),
        }
    }

    pub fn with_progress_start(&mut self, cb: impl FnMut(&str, u64) + 'p) {
        self.progress.with_progress_start(cb)
    }

    pub fn with_progress_update(&mut self, cb: impl FnMut(&str, u64) + 'p) {
        self.progress.with_progress_update(cb)
    }

    pub fn with_progress_finish(&mut self, cb: impl FnMut(&str) + 'p) {
        self.progress.with_progress_finish(cb)
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }
}

impl<'p, R: Runner> Provisioner<'p, R> {
    /// Creates the environment, seeded with the runtime named by the first
    /// dependency. A failing command is reported in the returned outcome.
    pub fn create(&mut self, spec: &EnvironmentSpec) -> Result<Outcome, ProvisionError> {
        let runtime = spec.runtime().ok_or_else(|| ProvisionError::NoRuntime {
            environment: spec.name().to_string(),
        })?;

        info!(
            target: LOGNAME,
            "creating environment '{}' with {}",
            spec.name(),
            runtime
        );
        let invocation = Invocation::Create {
            environment: spec.name().to_string(),
            runtime,
        };
        let outcome = self.execute(invocation);

        match outcome.error() {
            None => info!(
                target: LOGNAME,
                "environment '{}' created successfully!",
                spec.name()
            ),
            Some(err) => error!(
                target: LOGNAME,
                "error creating environment '{}': {}",
                spec.name(),
                chain(err)
            ),
        }

        Ok(outcome)
    }

    /// Installs every dependency after the runtime entry into the existing
    /// environment, one command each, in file order. A failure is recorded
    /// and the remaining dependencies are still attempted.
    pub fn install(&mut self, spec: &EnvironmentSpec) -> Report {
        let packages = spec.packages();
        let mut report = Report::new(spec.name());

        info!(
            target: LOGNAME,
            "installing {} dependencies into '{}'",
            packages.len(),
            spec.name()
        );
        let bar = self.progress.bar(spec.name(), packages.len() as u64);
        for package in packages {
            let outcome = self.execute(Invocation::Install {
                environment: spec.name().to_string(),
                package: package.clone(),
            });

            match outcome.error() {
                None => info!(target: LOGNAME, "{} installed successfully!", package),
                Some(err) => error!(
                    target: LOGNAME,
                    "error installing {}: {}",
                    package,
                    chain(err)
                ),
            }

            report.push(outcome);
            bar.update(1);
        }
        bar.finish();

        report
    }

    fn execute(&mut self, invocation: Invocation) -> Outcome {
        let error = self.runner.run(&invocation).err();
        Outcome { invocation, error }
    }
}

/// Renders an error along with everything that caused it.
pub fn chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn serialize_error<S>(error: &Option<CommandError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match error {
        Some(err) => serializer.serialize_some(&chain(err)),
        None => serializer.serialize_none(),
    }
}

// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use console::style;
use indicatif::ProgressBar;
use vfs::{PhysicalFS, VfsPath};

use envprov::{
    Config, EnvironmentSpec, Outcome, PackageManager, Provisioner, Report, SPEC_FILENAME,
};

mod logging;
mod progress;

use progress::SuspendableBars;

#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {
    /// Environment definition to read
    #[clap(global = true, short, long)]
    file: Option<Utf8PathBuf>,

    /// Package manager to run, overriding the configuration file
    #[clap(global = true, long)]
    executable: Option<String>,

    /// Seconds to allow each package manager command before killing it
    #[clap(global = true, long)]
    timeout: Option<u64>,

    /// Write a JSON report of every command issued to this path
    #[clap(global = true, long)]
    report: Option<Utf8PathBuf>,

    #[clap(flatten)]
    verbose: Verbosity<InfoLevel>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the environment with the runtime named by its first dependency
    Create,
    /// Install the remaining dependencies into an existing environment
    Install,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let bars = SuspendableBars::new();
    logging::setup(bars.clone(), cli.verbose.log_level_filter())
        .context("could not initialize logging")?;

    let file = absolute(
        cli.file
            .clone()
            .unwrap_or_else(|| Utf8PathBuf::from(SPEC_FILENAME)),
    )?;
    let (dir, name) = match (file.parent(), file.file_name()) {
        (Some(dir), Some(name)) => (dir.to_path_buf(), name),
        _ => return Err(anyhow!("'{}' is not a file path", file)),
    };

    let fs: VfsPath = PhysicalFS::new(PathBuf::from(&dir)).into();
    let spec = EnvironmentSpec::load(&fs.join(name)?)
        .with_context(|| format!("invalid environment file '{}'", file))?;

    let mut config = Config::find(dir.as_std_path())
        .with_context(|| format!("could not load configuration for '{}'", dir))?;
    if let Some(executable) = cli.executable {
        config = config.with_executable(executable);
    }
    if let Some(timeout) = cli.timeout {
        config = config.with_timeout(Duration::from_secs(timeout));
    }
    let manager = config.package_manager(spec.channels())?;

    let report = match &cli.command {
        Commands::Create => {
            let outcome = Provisioner::new(manager).create(&spec)?;
            let mut report = Report::new(spec.name());
            report.push(outcome);
            report
        }
        Commands::Install => install(&bars, manager, &spec),
    };

    if let Some(path) = &cli.report {
        write_report(path, &report)?;
    }

    summarize(&report)
}

fn install(bars: &SuspendableBars, manager: PackageManager, spec: &EnvironmentSpec) -> Report {
    let active = RefCell::new(HashMap::<String, ProgressBar>::new());
    let mut provisioner = Provisioner::new(manager);

    provisioner.with_progress_start(|id, len| {
        let bar = bars.with_bar(ProgressBar::new(len).with_prefix(id.to_string()));
        active.borrow_mut().insert(id.to_string(), bar);
    });
    provisioner.with_progress_update(|id, delta| {
        if let Some(bar) = active.borrow().get(id) {
            bar.inc(delta);
        }
    });
    provisioner.with_progress_finish(|id| {
        if let Some(bar) = active.borrow_mut().remove(id) {
            bar.finish_and_clear();
        }
    });

    provisioner.install(spec)
}

fn summarize(report: &Report) -> Result<()> {
    let total = report.outcomes().len();
    let failed: Vec<&str> = report.failed().map(Outcome::dependency).collect();

    if failed.is_empty() {
        eprintln!(
            "{} {} of {} commands succeeded for '{}'",
            style("done").green().bold(),
            total,
            total,
            report.environment()
        );
        Ok(())
    } else {
        eprintln!(
            "{} {} of {} commands failed for '{}'",
            style("error").red().bold(),
            failed.len(),
            total,
            report.environment()
        );
        Err(anyhow!("failed: {}", failed.join(", ")))
    }
}

fn write_report(path: &Utf8Path, report: &Report) -> Result<()> {
    let file = File::create(path).with_context(|| format!("could not create '{}'", path))?;
    serde_json::to_writer_pretty(file, report)
        .with_context(|| format!("could not write report to '{}'", path))
}

fn absolute<P: AsRef<Path>>(path: P) -> Result<Utf8PathBuf> {
    let path = path.as_ref();
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    // Canonicalize what exists so that configuration lookup walks the real
    // parents; a missing file is reported by the loader.
    let path = match (path.parent(), path.file_name()) {
        (Some(dir), Some(name)) if dir.exists() => dunce::canonicalize(dir)?.join(name),
        _ => path,
    };

    Ok(Utf8PathBuf::try_from(path)?)
}

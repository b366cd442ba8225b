// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};
use serde::Serialize;

use crate::errors::CommandError;
use crate::types::RuntimeSpec;

const LOGNAME: &str = "envprov::runner";

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_TAIL_LINES: usize = 5;

/// One call out to the package manager.
#[derive(Serialize, Clone, Eq, Debug, PartialEq)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Invocation {
    Create {
        environment: String,
        runtime: RuntimeSpec,
    },
    Install {
        environment: String,
        package: String,
    },
}

impl Invocation {
    pub fn environment(&self) -> &str {
        match self {
            Invocation::Create { environment, .. } => environment,
            Invocation::Install { environment, .. } => environment,
        }
    }

    /// The dependency entry this invocation acts on.
    pub fn dependency(&self) -> &str {
        match self {
            Invocation::Create { runtime, .. } => runtime.specifier(),
            Invocation::Install { package, .. } => package,
        }
    }

    /// Arguments for the package manager, not including the program itself.
    pub fn args(&self, channels: &[String]) -> Vec<String> {
        let subcommand = match self {
            Invocation::Create { .. } => "create",
            Invocation::Install { .. } => "install",
        };

        let mut args = vec![
            subcommand.to_string(),
            "--name".to_string(),
            self.environment().to_string(),
        ];
        for channel in channels {
            args.push("--channel".to_string());
            args.push(channel.clone());
        }
        args.push(self.dependency().to_string());
        args.push("--yes".to_string());

        args
    }
}

pub trait Runner {
    fn run(&mut self, invocation: &Invocation) -> Result<(), CommandError>;
}

impl<R: Runner + ?Sized> Runner for &mut R {
    fn run(&mut self, invocation: &Invocation) -> Result<(), CommandError> {
        (**self).run(invocation)
    }
}

/// Runs invocations as child processes of a package manager executable such
/// as `conda` or `mamba`.
#[derive(Debug, Clone)]
pub struct PackageManager {
    program: String,
    args: Vec<String>,
    channels: Vec<String>,
    timeout: Option<Duration>,
}

impl PackageManager {
    pub fn new<S: Into<String>>(program: S) -> PackageManager {
        PackageManager {
            program: program.into(),
            args: Vec::new(),
            channels: Vec::new(),
            timeout: None,
        }
    }

    /// Arguments placed between the program and the subcommand, for
    /// executables like `python -m conda`.
    pub fn with_args(mut self, args: Vec<String>) -> PackageManager {
        self.args = args;
        self
    }

    pub fn with_channels(mut self, channels: Vec<String>) -> PackageManager {
        self.channels = channels;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> PackageManager {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        self.program.as_str()
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn command_line(&self, invocation: &Invocation) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 8);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv.extend(invocation.args(&self.channels));
        argv
    }
}

impl Runner for PackageManager {
    fn run(&mut self, invocation: &Invocation) -> Result<(), CommandError> {
        let argv = self.command_line(invocation);
        let command = render(&argv);
        debug!(target: LOGNAME, "running {}", command);

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // A timed command gets its own process group, so that whatever it
        // spawned can be stopped along with it.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if self.timeout.is_some() {
                cmd.process_group(0);
            }
        }

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match deadline {
            None => child.wait().map(Some),
            Some(deadline) => wait_until(&mut child, deadline),
        }
        .map_err(|source| CommandError::Wait {
            command: command.clone(),
            source,
        })?;

        let status = match status {
            Some(status) => status,
            None => {
                terminate(&mut child, self.timeout.is_some());
                return Err(CommandError::TimedOut {
                    command,
                    timeout: self.timeout.unwrap_or_default(),
                });
            }
        };

        let stdout = collect(&stdout, deadline);
        let stderr = collect(&stderr, deadline);
        if stdout.is_none() || stderr.is_none() {
            debug!(
                target: LOGNAME,
                "'{}' exited but its output was still open at the deadline",
                command
            );
            terminate(&mut child, self.timeout.is_some());
        }

        let stdout = stdout.unwrap_or_default();
        let stderr = stderr.unwrap_or_default();
        for line in stdout.lines().chain(stderr.lines()) {
            trace!(target: LOGNAME, "{}", line);
        }

        if status.success() {
            Ok(())
        } else {
            Err(CommandError::Failed {
                command,
                status,
                stderr: tail(&stderr, STDERR_TAIL_LINES),
            })
        }
    }
}

fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Kills the child, and with `group` everything else in its process group.
fn terminate(child: &mut Child, group: bool) {
    #[cfg(unix)]
    {
        if group {
            if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
                // SAFETY: kill takes no pointers; the group was created for
                // this child at spawn time.
                unsafe {
                    libc::kill(-pgid, libc::SIGKILL);
                }
            }
        }
    }
    #[cfg(not(unix))]
    let _ = group;

    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
    }
    rx
}

/// Waits for a drained pipe, giving up at the deadline. `None` means the
/// output never closed in time.
fn collect(rx: &Receiver<String>, deadline: Option<Instant>) -> Option<String> {
    match deadline {
        None => Some(rx.recv().unwrap_or_default()),
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(output) => Some(output),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => Some(String::new()),
            }
        }
    }
}

fn tail(output: &str, count: usize) -> String {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

pub(crate) fn render(argv: &[String]) -> String {
    shlex::try_join(argv.iter().map(String::as_str)).unwrap_or_else(|_| argv.join(" "))
}

#[cfg(test)]
mod tests {
    use super::{render, tail, Invocation, PackageManager, Runner};
    use crate::errors::CommandError;
    use crate::types::RuntimeSpec;

    fn install(package: &str) -> Invocation {
        Invocation::Install {
            environment: "envA".to_string(),
            package: package.to_string(),
        }
    }

    #[test]
    fn install_arguments() {
        assert_eq!(
            install("numpy").args(&[]),
            ["install", "--name", "envA", "numpy", "--yes"]
        );
    }

    #[test]
    fn create_arguments_use_the_entry_verbatim() {
        let invocation = Invocation::Create {
            environment: "envA".to_string(),
            runtime: RuntimeSpec::new("python=3.10"),
        };

        assert_eq!(
            invocation.args(&["conda-forge".to_string()]),
            [
                "create",
                "--name",
                "envA",
                "--channel",
                "conda-forge",
                "python=3.10",
                "--yes"
            ]
        );
    }

    #[test]
    fn command_line_includes_program_arguments() {
        let manager = PackageManager::new("python")
            .with_args(vec!["-m".to_string(), "conda".to_string()]);

        assert_eq!(
            manager.command_line(&install("numpy")),
            ["python", "-m", "conda", "install", "--name", "envA", "numpy", "--yes"]
        );
    }

    #[test]
    fn rendering_quotes_specifiers() {
        let argv = PackageManager::new("conda").command_line(&install("numpy>=1.20"));
        let rendered = render(&argv);

        assert!(!rendered.contains(" numpy>=1.20 "));
        assert_eq!(shlex::split(&rendered), Some(argv));
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\n\nb\nc\nd\n", 2), "c\nd");
        assert_eq!(tail("only\n", 5), "only");
        assert_eq!(tail("", 5), "");
    }

    #[test]
    fn missing_program() {
        let mut manager = PackageManager::new("envprov-definitely-not-installed");
        let err = manager.run(&install("numpy")).unwrap_err();

        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[cfg(unix)]
    mod unix {
        use std::time::{Duration, Instant};

        use super::install;
        use crate::errors::CommandError;
        use crate::runner::{PackageManager, Runner};

        fn shell(script: &str) -> PackageManager {
            PackageManager::new("sh").with_args(vec![
                "-c".to_string(),
                script.to_string(),
                "sh".to_string(),
            ])
        }

        #[test]
        fn success() {
            let mut manager = PackageManager::new("true");
            assert!(manager.run(&install("numpy")).is_ok());
        }

        #[test]
        fn nonzero_exit_is_a_failure() {
            let mut manager = PackageManager::new("false");
            let err = manager.run(&install("numpy")).unwrap_err();

            match err {
                CommandError::Failed { status, stderr, .. } => {
                    assert_eq!(status.code(), Some(1));
                    assert!(stderr.is_empty());
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }

        #[test]
        fn failure_carries_status_and_stderr() {
            let mut manager = shell("echo \"PackagesNotFoundError: $4\" >&2; exit 3");
            let err = manager.run(&install("nopkg")).unwrap_err();

            match err {
                CommandError::Failed { status, stderr, .. } => {
                    assert_eq!(status.code(), Some(3));
                    assert_eq!(stderr, "PackagesNotFoundError: nopkg");
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }

        #[test]
        fn large_output_does_not_block() {
            let mut manager =
                shell("i=0; while [ $i -lt 20000 ]; do echo line $i; i=$((i+1)); done");
            assert!(manager.run(&install("numpy")).is_ok());
        }

        #[test]
        fn finishes_within_timeout() {
            let mut manager =
                PackageManager::new("true").with_timeout(Some(Duration::from_secs(30)));
            assert!(manager.run(&install("numpy")).is_ok());
        }

        #[test]
        fn timeout_kills_the_command() {
            let mut manager =
                shell("sleep 10").with_timeout(Some(Duration::from_millis(200)));

            let started = Instant::now();
            let err = manager.run(&install("numpy")).unwrap_err();

            assert!(matches!(err, CommandError::TimedOut { .. }));
            assert!(started.elapsed() < Duration::from_secs(5));
        }

        #[test]
        fn background_process_cannot_outlast_the_timeout() {
            let mut manager =
                shell("sleep 5 & exit 0").with_timeout(Some(Duration::from_millis(200)));
            assert_eq!(manager.timeout(), Some(Duration::from_millis(200)));

            let started = Instant::now();
            let result = manager.run(&install("numpy"));

            assert!(result.is_ok());
            assert!(started.elapsed() < Duration::from_secs(2));
        }

        #[test]
        fn timeout_stops_spawned_processes() {
            let mut manager =
                shell("sleep 10 & wait").with_timeout(Some(Duration::from_millis(200)));

            let started = Instant::now();
            let err = manager.run(&install("numpy")).unwrap_err();

            assert!(matches!(err, CommandError::TimedOut { .. }));
            assert!(started.elapsed() < Duration::from_secs(2));
        }
    }
}

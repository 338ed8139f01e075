//! Command execution abstraction.
//!
//! Every external tool the orchestrator touches (`cryptsetup`, `lvchange`,
//! `mount`, `systemctl`, ...) is invoked through the [`Runner`] trait so
//! drivers stay testable against a scripted fake. The system-backed
//! implementation wraps each call with a configurable deadline; a timed-out
//! call is reported like any other failure of that call.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use snafu::ResultExt;

use crate::error::{CommandExecutionSnafu, Error, Result};

/// Captured result of one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// stderr if non-empty, otherwise stdout; for error messages.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Executes external commands on behalf of probes and drivers.
pub trait Runner {
    /// Runs a command, capturing stdout and stderr.
    fn run(&self, program: &str, args: &[&str]) -> Result<RunOutput>;

    /// Runs a command with the process's own stdio attached.
    ///
    /// Used for interactive secret entry, where the tool must talk to the
    /// terminal directly.
    fn run_interactive(&self, program: &str, args: &[&str]) -> Result<RunOutput>;
}

/// [`Runner`] implementation backed by `std::process::Command`.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the per-command deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn wait_with_deadline(&self, mut child: Child, command: &str) -> Result<i32> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait().context(CommandExecutionSnafu {
                command: command.to_string(),
            })? {
                Some(status) => return Ok(status.code().unwrap_or(-1)),
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::CommandTimeout {
                        command: command.to_string(),
                        seconds: self.timeout.as_secs(),
                    });
                }
                None => thread::sleep(Duration::from_millis(25)),
            }
        }
    }
}

impl Runner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<RunOutput> {
        let command = display_command(program, args);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context(CommandExecutionSnafu {
                command: command.clone(),
            })?;

        // Drain pipes on threads so a chatty tool cannot deadlock the wait.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_reader = thread::spawn(move || read_to_string(stdout_pipe));
        let stderr_reader = thread::spawn(move || read_to_string(stderr_pipe));

        let status = self.wait_with_deadline(child, &command)?;
        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        Ok(RunOutput {
            status,
            stdout,
            stderr,
        })
    }

    fn run_interactive(&self, program: &str, args: &[&str]) -> Result<RunOutput> {
        let command = display_command(program, args);

        // No deadline here: the user may legitimately take minutes to type
        // a passphrase.
        let status = Command::new(program)
            .args(args)
            .status()
            .context(CommandExecutionSnafu {
                command: command.clone(),
            })?;

        Ok(RunOutput {
            status: status.code().unwrap_or(-1),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

fn read_to_string(pipe: Option<impl Read>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf);
    }
    buf
}

/// Joins program and arguments for error messages and logs.
pub fn display_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

#![forbid(unsafe_code)]

//! Runs external commands through `sh -c` with every word escaped, and bounds each run with
//! a deadline.

use crate::error::ExecutionError;
use fleet_core::shell;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Flags whose value is a credential and must not reach the logs.
const SECRET_FLAGS: [&str; 2] = ["--token", "--registration-token"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// The runner binary prints some listings on stderr; prefer stdout when it has content.
    pub fn listing_text(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Seam between the lifecycle code and the operating system. Implementations block until
/// the command finishes or fails; callers run them off the async executor.
pub trait ProcessInvoker: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput, ExecutionError>;
}

#[derive(Clone, Debug)]
pub struct ShellInvoker {
    shell: PathBuf,
    timeout: Duration,
}

impl Default for ShellInvoker {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl ShellInvoker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
            timeout,
        }
    }

    fn timed_out(&self, program: &str) -> ExecutionError {
        ExecutionError::TimedOut {
            program: program.to_string(),
            after: self.timeout,
        }
    }
}

impl ProcessInvoker for ShellInvoker {
    fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput, ExecutionError> {
        // `exec` makes the shell replace itself, so a kill on timeout reaches the real process.
        let line = format!("exec {}", shell::command_line(program, args));
        tracing::debug!(command = %loggable_command_line(program, args), "running command");
        let deadline = Instant::now() + self.timeout;

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let (pipes_tx, pipes_rx) = mpsc::channel();
        drain(child.stdout.take(), Pipe::Stdout, pipes_tx.clone());
        drain(child.stderr.take(), Pipe::Stderr, pipes_tx);

        let status = match wait_with_deadline(&mut child, deadline) {
            Ok(Some(status)) => status,
            Ok(None) => {
                tracing::warn!(program, timeout = ?self.timeout, "command timed out; killed");
                return Err(self.timed_out(program));
            }
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExecutionError::Io {
                    program: program.to_string(),
                    source,
                });
            }
        };

        // A descendant that inherited the pipes can hold them open after the child exits.
        let Some(output) = collect(&pipes_rx, deadline) else {
            tracing::warn!(
                program,
                timeout = ?self.timeout,
                "command output still open at deadline; abandoning it"
            );
            return Err(self.timed_out(program));
        };

        if !status.success() {
            return Err(ExecutionError::NonZeroExit {
                program: program.to_string(),
                code: status.code(),
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}

/// Polls the child until it exits or the deadline passes. `Ok(None)` means the child was
/// killed for running too long.
fn wait_with_deadline(
    child: &mut Child,
    deadline: Instant,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[derive(Clone, Copy, Debug)]
enum Pipe {
    Stdout,
    Stderr,
}

fn drain<R: Read + Send + 'static>(
    pipe: Option<R>,
    which: Pipe,
    done: mpsc::Sender<(Pipe, Vec<u8>)>,
) {
    let Some(mut pipe) = pipe else {
        let _ = done.send((which, Vec::new()));
        return;
    };
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = done.send((which, buf));
    });
}

/// Waits for both pipes to reach EOF. `None` when the deadline passes first; the reader
/// threads are left to finish on their own.
fn collect(pipes: &mpsc::Receiver<(Pipe, Vec<u8>)>, deadline: Instant) -> Option<ProcessOutput> {
    let mut output = ProcessOutput::default();
    for _ in 0..2 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (which, bytes) = pipes.recv_timeout(remaining).ok()?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        match which {
            Pipe::Stdout => output.stdout = text,
            Pipe::Stderr => output.stderr = text,
        }
    }
    Some(output)
}

/// Escaped command line with credential values masked.
pub fn loggable_command_line(program: &str, args: &[String]) -> String {
    let mut masked = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        if hide_next {
            masked.push("***".to_string());
            hide_next = false;
            continue;
        }
        hide_next = SECRET_FLAGS.contains(&arg.as_str());
        masked.push(arg.clone());
    }
    shell::command_line(program, &masked)
}

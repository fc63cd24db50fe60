//! Shell command execution for the external toolchain.
//!
//! The compaction loop never talks to the simulators directly; every external
//! step is a shell command from the configuration, spawned as `/bin/sh -c`
//! in its own process group so a timeout can kill the whole tree. Three
//! higher-level operations classify the streams:
//! 1. **compile** — cross-compilation and HDL compilation; any stderr that is
//!    not purely warnings is a failure.
//! 2. **logic_simulate** — scans stdout for the simulation-ok marker and the
//!    test application time, with a per-command timeout.
//! 3. **fault_simulate** — like compile but with an allow-list of benign
//!    stderr patterns and a timeout.
//!
//! Timeouts surface as the sentinel pair `("TimeoutExpired",
//! "TimeoutExpired")` from [`Invoker::execute`], mirroring what the
//! higher-level operations test for.

use std::fmt;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::common::error::{Error, Result};
use crate::config::{FaultSimControl, LogicSimControl};

/// Sentinel stream content reported when a command timed out.
pub const TIMEOUT_SENTINEL: &str = "TimeoutExpired";

/// Poll interval while awaiting a child with a deadline.
const WAIT_POLL: Duration = Duration::from_millis(25);

/// Outcome of a compilation command sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compilation {
    /// stderr contained content that was not purely warnings.
    Error,
    /// None of the above.
    Success,
}

/// Outcome of a logic simulation command sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicSimulation {
    /// The per-command timeout expired.
    Timeout,
    /// stderr contained content, or the required stdout markers never
    /// appeared.
    SimError,
    /// Both the ok marker and the test application time were seen.
    Success,
}

impl fmt::Display for LogicSimulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::SimError => write!(f, "ERROR"),
            Self::Success => write!(f, "SUCCESS"),
        }
    }
}

/// Outcome of a fault simulation command sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSimulation {
    /// The per-command timeout expired.
    Timeout,
    /// stderr contained content not covered by the allow-list.
    FsimError,
    /// None of the above.
    Success,
}

impl fmt::Display for FaultSimulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::FsimError => write!(f, "ERROR"),
            Self::Success => write!(f, "SUCCESS"),
        }
    }
}

/// Case-insensitive warning matcher exempting compiler chatter on stderr.
fn warning_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        RegexBuilder::new("warning")
            .case_insensitive(true)
            .build()
            .unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

/// Wrapper for invoking the external compilation and simulation toolchain.
#[derive(Debug, Clone, Copy, Default)]
pub struct Invoker;

impl Invoker {
    /// Creates an invoker.
    pub fn new() -> Self {
        Self
    }

    /// Executes one shell instruction, returning `(stdout, stderr)`.
    ///
    /// The child runs in a fresh process group. When `timeout` expires the
    /// whole group is killed, the child reaped, and the sentinel pair
    /// `("TimeoutExpired", "TimeoutExpired")` returned.
    ///
    /// # Errors
    ///
    /// [`Error::Tool`] when `/bin/sh` cannot be spawned at all.
    pub fn execute(&self, instruction: &str, timeout: Option<Duration>) -> Result<(String, String)> {
        debug!("executing {instruction}...");

        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(instruction)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|e| Error::Tool(format!("failed to spawn `{instruction}`: {e}")))?;

        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let timed_out = wait_with_deadline(&mut child, timeout)?;

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        if timed_out {
            debug!("TIMEOUT during the execution of: {instruction}");
            return Ok((TIMEOUT_SENTINEL.to_string(), TIMEOUT_SENTINEL.to_string()));
        }

        Ok((stdout, stderr))
    }

    /// Runs a compilation command sequence.
    ///
    /// Commands run in order; the first one whose stderr is non-empty and not
    /// purely warnings aborts the sequence with [`Compilation::Error`].
    pub fn compile(&self, instructions: &[String]) -> Result<Compilation> {
        debug!("compiling sources");

        for cmd in instructions {
            let (stdout, stderr) = self.execute(cmd, None)?;

            if !stderr.is_empty() && !warning_regex().is_match(&stderr) {
                debug!("error during execution of {cmd}:\n{stderr}");
                return Ok(Compilation::Error);
            }

            for line in stdout.lines() {
                debug!("{cmd}: {}", line.trim_end());
            }
        }

        Ok(Compilation::Success)
    }

    /// Runs a logic simulation command sequence and captures the test
    /// application time.
    ///
    /// stdout is scanned line by line: `simulation_ok_regex` marks a graceful
    /// end, `test_application_time_regex` yields the TaT through the
    /// configured capture group, appended to `tat_out`. Success requires both
    /// markers across the whole sequence.
    ///
    /// # Errors
    ///
    /// [`Error::TatCapture`] when the designated capture group does not parse
    /// as an integer — a misconfigured regex the run cannot proceed with.
    pub fn logic_simulate(
        &self,
        instructions: &[String],
        control: &LogicSimControl,
        tat_out: &mut Vec<u64>,
    ) -> Result<LogicSimulation> {
        let mut status = None;
        let mut exit_success = false;
        let mut tat_success = false;

        for cmd in instructions {
            let (stdout, stderr) = self.execute(cmd, Some(control.timeout))?;

            if !stderr.is_empty() && stderr != TIMEOUT_SENTINEL {
                debug!("error during execution of {cmd}:\n{stderr}");
                status = Some(LogicSimulation::SimError);
                break;
            }
            if stderr == TIMEOUT_SENTINEL && stdout == TIMEOUT_SENTINEL {
                status = Some(LogicSimulation::Timeout);
                break;
            }

            for line in stdout.lines() {
                debug!("{cmd}: {}", line.trim_end());

                if control.simulation_ok_regex.is_match(line) {
                    debug!("exit success matched");
                    exit_success = true;
                }

                if let Some(captures) = control.test_application_time_regex.captures(line) {
                    let captured = captures
                        .get(control.test_application_time_regex_group_no)
                        .map(|m| m.as_str())
                        .unwrap_or_default();

                    let tat: u64 = captured
                        .trim()
                        .parse()
                        .map_err(|_| Error::TatCapture(captured.to_string()))?;
                    tat_out.push(tat);
                    tat_success = true;
                    debug!("TaT captured: {tat}");
                }

                if tat_success && exit_success {
                    break;
                }
            }
        }

        if tat_success && exit_success {
            debug!("simulation success (exit={exit_success}, tat={tat_success})");
            Ok(LogicSimulation::Success)
        } else if status == Some(LogicSimulation::Timeout) {
            Ok(LogicSimulation::Timeout)
        } else {
            debug!("simulation failed (exit={exit_success}, tat={tat_success})");
            Ok(LogicSimulation::SimError)
        }
    }

    /// Runs a fault simulation command sequence.
    ///
    /// stderr content matching any allow-list pattern is benign; anything
    /// else is [`FaultSimulation::FsimError`].
    pub fn fault_simulate(
        &self,
        instructions: &[String],
        control: &FaultSimControl,
    ) -> Result<FaultSimulation> {
        for cmd in instructions {
            let (stdout, stderr) = self.execute(cmd, Some(control.timeout))?;

            if !stderr.is_empty() && stderr != TIMEOUT_SENTINEL {
                let allowed = control
                    .allow_regexs
                    .iter()
                    .any(|pattern| pattern.is_match(&stderr));
                if allowed {
                    debug!("allowing stderr content of {cmd}");
                    continue;
                }

                debug!("error during execution of {cmd}:\n{stderr}");
                return Ok(FaultSimulation::FsimError);
            }
            if stderr == TIMEOUT_SENTINEL && stdout == TIMEOUT_SENTINEL {
                return Ok(FaultSimulation::Timeout);
            }
        }

        Ok(FaultSimulation::Success)
    }
}

/// Spawns a thread draining a child stream to a string.
fn drain<R: Read + Send + 'static>(stream: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = String::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_string(&mut buffer);
        }
        buffer
    })
}

/// Awaits a child, killing its whole process group on deadline expiry.
///
/// Returns whether the deadline expired.
fn wait_with_deadline(child: &mut Child, timeout: Option<Duration>) -> Result<bool> {
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
        match child.try_wait() {
            Ok(Some(_)) => return Ok(false),
            Ok(None) => {
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        kill_group(child);
                        let _ = child.wait();
                        return Ok(true);
                    }
                }
                thread::sleep(WAIT_POLL);
            }
            Err(e) => return Err(Error::Tool(format!("wait failed: {e}"))),
        }
    }
}

/// Kills the child's process group (the child is its own group leader).
fn kill_group(child: &Child) {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: plain syscall on a pgid we created via process_group(0); a
    // stale pgid at worst yields ESRCH, which is ignored.
    unsafe {
        let _ = libc::killpg(pgid, libc::SIGKILL);
    }
}

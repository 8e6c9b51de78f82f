//! Job runner
//!
//! Runs one upgrade cycle in a child process under a wall-clock timeout and
//! optional resource ceilings. Only one cycle runs at a time: a tick that
//! arrives while the previous cycle is still alive is skipped.
//!
//! On unix the child is started in its own process group. When the child
//! exits or is killed, whatever it left behind in that group is killed too.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ResourceLimits;

/// How long output readers may keep draining after the child is gone
const DEFAULT_OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Program and arguments of the cycle child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Variables set on top of the inherited environment
    pub envs: Vec<(String, String)>,
}

impl JobCommand {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// This executable with the hidden `cycle` subcommand
    pub fn current_exe_cycle() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, ["cycle"]))
    }
}

/// How a job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// The child exited on its own. `exit_code` is `None` when it was
    /// terminated by a signal.
    Completed { exit_code: Option<i32> },
    /// The child outlived the timeout and was killed
    TimedOut,
    /// A previous job was still running
    Skipped,
    /// The child could not be started
    SpawnFailed { error: String },
    /// Waiting on the child failed
    WaitFailed { error: String },
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Completed { exit_code: Some(0) })
    }
}

/// Record of one job execution
#[derive(Debug, Clone)]
pub struct JobRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub timeout: Duration,
    pub limits: ResourceLimits,
    pub pid: Option<u32>,
    pub duration: Duration,
    pub status: JobStatus,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Runs cycle jobs one at a time
pub struct JobRunner {
    command: JobCommand,
    timeout: Duration,
    limits: ResourceLimits,
    output_grace: Duration,
    lock: Arc<Mutex<()>>,
}

impl JobRunner {
    pub fn new(command: JobCommand, timeout: Duration) -> Self {
        Self {
            command,
            timeout,
            limits: ResourceLimits::default(),
            output_grace: DEFAULT_OUTPUT_GRACE,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_output_grace(mut self, grace: Duration) -> Self {
        self.output_grace = grace;
        self
    }

    /// Whether a job is currently running
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Run one job to completion, timeout or failure
    pub async fn run_job(&self) -> JobRun {
        let mut run = JobRun {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            timeout: self.timeout,
            limits: self.limits,
            pid: None,
            duration: Duration::ZERO,
            status: JobStatus::Skipped,
            stdout: Vec::new(),
            stderr: Vec::new(),
        };

        let Ok(_guard) = self.lock.try_lock() else {
            warn!(job_id = %run.id, "Previous upgrade cycle still running, tick skipped");
            return run;
        };

        let started = Instant::now();

        let mut child = match self.build_command().spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(
                    job_id = %run.id,
                    program = %self.command.program.display(),
                    error = %e,
                    "Failed to spawn upgrade cycle"
                );
                run.status = JobStatus::SpawnFailed { error: e.to_string() };
                run.duration = started.elapsed();
                return run;
            }
        };

        run.pid = child.id();
        info!(
            job_id = %run.id,
            pid = ?run.pid,
            timeout_secs = self.timeout.as_secs_f64(),
            max_memory_bytes = ?self.limits.max_memory_bytes,
            max_cpu_secs = ?self.limits.max_cpu_secs,
            "Upgrade cycle started"
        );

        let stdout = child
            .stdout
            .take()
            .map(|out| OutputReader::spawn(out, run.id, OutputStream::Stdout));
        let stderr = child
            .stderr
            .take()
            .map(|err| OutputReader::spawn(err, run.id, OutputStream::Stderr));

        run.status = match timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                kill_process_group(run.pid);
                JobStatus::Completed {
                    exit_code: status.code(),
                }
            }
            Ok(Err(e)) => {
                error!(job_id = %run.id, error = %e, "Failed to wait for upgrade cycle");
                terminate(&mut child, run.pid).await;
                JobStatus::WaitFailed { error: e.to_string() }
            }
            Err(_) => {
                warn!(
                    job_id = %run.id,
                    pid = ?run.pid,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Upgrade cycle exceeded timeout, killing it"
                );
                terminate(&mut child, run.pid).await;
                JobStatus::TimedOut
            }
        };

        let drain_deadline = tokio::time::Instant::now() + self.output_grace;
        if let Some(reader) = stdout {
            run.stdout = reader.finish(drain_deadline).await;
        }
        if let Some(reader) = stderr {
            run.stderr = reader.finish(drain_deadline).await;
        }
        run.duration = started.elapsed();

        match &run.status {
            JobStatus::Completed { exit_code: Some(0) } => info!(
                job_id = %run.id,
                duration_ms = run.duration.as_millis() as u64,
                "Upgrade cycle finished"
            ),
            JobStatus::Completed { exit_code } => warn!(
                job_id = %run.id,
                exit_code = ?exit_code,
                duration_ms = run.duration.as_millis() as u64,
                "Upgrade cycle exited with failure"
            ),
            _ => {}
        }

        run
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .envs(self.command.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            cmd.process_group(0);

            let limits = self.limits;
            if !limits.is_unlimited() {
                // SAFETY: the closure only calls setrlimit, which is
                // async-signal-safe, and allocates nothing.
                unsafe {
                    cmd.pre_exec(move || apply_limits(limits));
                }
            }
        }

        #[cfg(not(unix))]
        {
            if !self.limits.is_unlimited() {
                warn!("Resource limits are not supported on this platform, ignoring");
            }
        }

        cmd
    }
}

/// Kill the child and its process group, then reap it
async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_process_group(pid);

    if let Err(e) = child.kill().await {
        debug!(error = %e, "Child kill failed");
    }
}

/// SIGKILL every process in the group the child leads. A group that is
/// already empty is not an error.
fn kill_process_group(pid: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
            // SAFETY: plain syscall; a negative pid addresses the process
            // group the child leads.
            let rc = unsafe { libc::kill(-pid, libc::SIGKILL) };
            if rc != 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ESRCH) {
                    debug!(pid, error = %err, "Process group kill failed");
                }
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

#[cfg(unix)]
fn apply_limits(limits: ResourceLimits) -> std::io::Result<()> {
    if let Some(bytes) = limits.max_memory_bytes {
        let limit = rlimit(bytes, bytes);
        // SAFETY: `limit` is a valid rlimit for the duration of the call.
        if unsafe { libc::setrlimit(libc::RLIMIT_AS, &limit) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    if let Some(secs) = limits.max_cpu_secs {
        // SIGXCPU at the soft limit, SIGKILL one second later
        let limit = rlimit(secs, secs.saturating_add(1));
        // SAFETY: as above.
        if unsafe { libc::setrlimit(libc::RLIMIT_CPU, &limit) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    Ok(())
}

#[cfg(unix)]
fn rlimit(soft: u64, hard: u64) -> libc::rlimit {
    libc::rlimit {
        rlim_cur: soft as libc::rlim_t,
        rlim_max: hard as libc::rlim_t,
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Relays a child pipe into the log, line by line, and keeps the lines
struct OutputReader {
    handle: JoinHandle<()>,
    lines: mpsc::UnboundedReceiver<String>,
}

impl OutputReader {
    fn spawn<R>(pipe: R, job_id: Uuid, stream: OutputStream) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, lines) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            let mut reader = BufReader::new(pipe).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                match stream {
                    OutputStream::Stdout => info!(job_id = %job_id, output = %line, "cycle"),
                    OutputStream::Stderr => warn!(job_id = %job_id, output = %line, "cycle stderr"),
                }
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Self { handle, lines }
    }

    /// Wait until `deadline` for the pipe to close, then collect what was read
    async fn finish(mut self, deadline: tokio::time::Instant) -> Vec<String> {
        if timeout_at(deadline, &mut self.handle).await.is_err() {
            debug!("Output still open after child exit, abandoning reader");
            self.handle.abort();
        }

        let mut lines = Vec::new();
        while let Ok(line) = self.lines.try_recv() {
            lines.push(line);
        }
        lines
    }
}

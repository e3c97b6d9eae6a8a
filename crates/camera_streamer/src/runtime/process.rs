//! Supervised pipeline process

use crate::runtime::command::LaunchCommand;
use crate::runtime::signal::ShutdownSignal;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// Supervisor status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Nothing launched yet
    Idle,
    /// Process is being spawned
    Starting,
    /// Process is running
    Running,
    /// Process exited on its own with this exit code
    Exited(i32),
    /// Graceful termination requested
    Terminating,
    /// Process was stopped by the supervisor
    Terminated,
}

impl ProcessStatus {
    /// Check if process is running
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Starting | ProcessStatus::Running | ProcessStatus::Terminating
        )
    }
}

/// How supervision ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// Pipeline exited on its own
    Exited { code: i32 },
    /// Shutdown was requested and the pipeline was stopped
    Terminated,
}

impl SupervisorOutcome {
    /// Exit code for the supervisor process itself
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorOutcome::Exited { code } => *code,
            SupervisorOutcome::Terminated => 0,
        }
    }
}

/// Map an exit status to a shell-style exit code
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

/// Owns the single capture/encode child process
pub struct Supervisor {
    /// Name used as log prefix
    name: String,
    /// Command to launch
    command: LaunchCommand,
    /// Time granted between SIGTERM and SIGKILL
    shutdown_timeout: Duration,
    /// Current status
    status: ProcessStatus,
    /// Process ID (if running)
    pid: Option<u32>,
    /// Start time
    started_at: Option<Instant>,
    /// Child process handle
    child: Option<Child>,
}

impl Supervisor {
    pub fn new(name: impl Into<String>, command: LaunchCommand, shutdown_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            command,
            shutdown_timeout,
            status: ProcessStatus::Idle,
            pid: None,
            started_at: None,
            child: None,
        }
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Get uptime duration
    pub fn uptime(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    /// Spawn the pipeline
    ///
    /// On unix the child leads its own process group so that every stage of
    /// a shell pipeline receives the termination signals.
    pub fn start(&mut self) -> Result<(), ProcessError> {
        if self.status.is_running() {
            return Err(ProcessError::AlreadyRunning(self.name.clone()));
        }

        self.status = ProcessStatus::Starting;
        log::info!("[{}] Starting: {}", self.name, self.command);

        let mut cmd = Command::new(self.command.program());
        cmd.args(self.command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        match cmd.spawn() {
            Ok(mut child) => {
                let pid = child.id().unwrap_or(0);
                self.pid = Some(pid);
                self.status = ProcessStatus::Running;
                self.started_at = Some(Instant::now());
                log::info!("[{}] Process started with PID: {}", self.name, pid);

                if let Some(stdout) = child.stdout.take() {
                    forward_output(self.name.clone(), stdout, false);
                }
                if let Some(stderr) = child.stderr.take() {
                    forward_output(self.name.clone(), stderr, true);
                }

                self.child = Some(child);
                Ok(())
            }
            Err(e) => {
                self.status = ProcessStatus::Idle;
                log::error!("[{}] Failed to spawn process: {}", self.name, e);
                Err(ProcessError::SpawnFailed {
                    name: self.name.clone(),
                    source: e,
                })
            }
        }
    }

    /// Block until the pipeline exits or shutdown is requested
    pub async fn supervise(
        &mut self,
        shutdown: &mut ShutdownSignal,
    ) -> Result<SupervisorOutcome, ProcessError> {
        enum Event {
            Exited(std::io::Result<ExitStatus>),
            Shutdown,
        }

        let event = {
            let child = self
                .child
                .as_mut()
                .ok_or_else(|| ProcessError::NotRunning(self.name.clone()))?;

            tokio::select! {
                status = child.wait() => Event::Exited(status),
                _ = shutdown.recv() => Event::Shutdown,
            }
        };

        match event {
            Event::Exited(Ok(status)) => {
                let code = exit_code(status);
                self.child = None;
                self.pid = None;
                self.status = ProcessStatus::Exited(code);

                if code == 0 {
                    log::info!("[{}] Process exited normally", self.name);
                } else {
                    log::error!("[{}] Process exited with code {}", self.name, code);
                }
                Ok(SupervisorOutcome::Exited { code })
            }
            Event::Exited(Err(e)) => {
                log::error!("[{}] Error waiting for process: {}", self.name, e);
                self.stop().await?;
                Err(ProcessError::Wait {
                    name: self.name.clone(),
                    source: e,
                })
            }
            Event::Shutdown => {
                self.stop().await?;
                Ok(SupervisorOutcome::Terminated)
            }
        }
    }

    /// Stop the process gracefully (SIGTERM, then SIGKILL after timeout)
    ///
    /// Calling this without a running child does nothing.
    pub async fn stop(&mut self) -> Result<(), ProcessError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        self.status = ProcessStatus::Terminating;
        log::info!("[{}] Stopping camera stream...", self.name);

        #[cfg(unix)]
        self.signal_group(nix::sys::signal::Signal::SIGTERM);

        #[cfg(not(unix))]
        {
            // No graceful signal available, kill immediately
            let _ = child.start_kill();
        }

        match tokio::time::timeout(self.shutdown_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                log::info!(
                    "[{}] Process exited with code: {:?}",
                    self.name,
                    status.code()
                );
            }
            Ok(Err(e)) => {
                log::error!("[{}] Error waiting for process: {}", self.name, e);
            }
            Err(_) => {
                log::warn!("[{}] Force killing stream process...", self.name);

                #[cfg(unix)]
                self.signal_group(nix::sys::signal::Signal::SIGKILL);

                if let Err(e) = child.kill().await {
                    log::error!("[{}] Failed to kill process: {}", self.name, e);
                    self.pid = None;
                    self.status = ProcessStatus::Terminated;
                    return Err(ProcessError::Kill {
                        name: self.name.clone(),
                        source: e,
                    });
                }
            }
        }

        self.pid = None;
        self.status = ProcessStatus::Terminated;
        Ok(())
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        if let Some(pid) = self.pid.filter(|&pid| pid != 0) {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
                log::debug!("[{}] Failed to send {:?} to group: {}", self.name, signal, e);
            }
        }
    }
}

/// Longest output record kept; the rest of an overlong record is dropped
const MAX_RECORD_LEN: usize = 4096;

fn forward_output<R>(name: String, stream: R, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        read_records(stream, |record| {
            if is_stderr {
                log::info!("[{}] {}", name, record);
            } else {
                log::debug!("[{}] {}", name, record);
            }
        })
        .await;
    });
}

/// Split child output into records on `\n` and `\r`
///
/// Encoders redraw their progress line with a bare `\r`, so a plain line
/// reader would hold those updates until the child exits.
async fn read_records<R, F>(stream: R, mut on_record: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(stream);
    let mut record: Vec<u8> = Vec::with_capacity(256);

    loop {
        let chunk = match reader.fill_buf().await {
            Ok(chunk) if !chunk.is_empty() => chunk,
            _ => break,
        };
        let len = chunk.len();

        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                emit_record(&mut record, &mut on_record);
            } else if record.len() < MAX_RECORD_LEN {
                record.push(byte);
            }
        }
        reader.consume(len);
    }

    emit_record(&mut record, &mut on_record);
}

fn emit_record<F: FnMut(&str)>(record: &mut Vec<u8>, on_record: &mut F) {
    if record.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(record);
    let text = text.trim_end();
    if !text.is_empty() {
        on_record(text);
    }
    record.clear();
}

/// Errors that can occur with the supervised process
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Process '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Failed to spawn process '{name}': {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process '{0}' is not running")]
    NotRunning(String),

    #[error("Failed to wait for process '{name}': {source}")]
    Wait {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to kill process '{name}': {source}")]
    Kill {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

//! Host probing: external tool checks, device nodes and TCP ports

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;

/// Everything the streamer needs to know about the host before launching
///
/// A missing tool, a spawn error, a non-zero exit and a timeout all count as
/// a failed probe. None of them is an error.
#[async_trait]
pub trait HostProbe: Send + Sync {
    /// Run `program args...` and report whether it exited zero within `timeout`
    async fn command_succeeds(&self, program: &str, args: &[String], timeout: Duration) -> bool;

    /// Run `program args...` and return its stdout if it exited zero within `timeout`
    async fn command_output(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Option<String>;

    /// Whether a filesystem path (typically a device node) exists
    fn path_exists(&self, path: &Path) -> bool;

    /// Whether `host:port` accepts a TCP connection within `timeout`
    async fn port_open(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// [`HostProbe`] backed by the real operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl SystemProbe {
    fn command(program: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl HostProbe for SystemProbe {
    async fn command_succeeds(&self, program: &str, args: &[String], timeout: Duration) -> bool {
        let mut cmd = Self::command(program, args);
        cmd.stdout(Stdio::null());

        match tokio::time::timeout(timeout, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                log::debug!("{} unavailable: {}", program, e);
                false
            }
            Err(_) => {
                log::debug!("{} did not answer within {:?}", program, timeout);
                false
            }
        }
    }

    async fn command_output(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Option<String> {
        let mut cmd = Self::command(program, args);
        cmd.stdout(Stdio::piped());

        match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(Ok(output)) => {
                log::debug!("{} exited with {}", program, output.status);
                None
            }
            Ok(Err(e)) => {
                log::debug!("{} unavailable: {}", program, e);
                None
            }
            Err(_) => {
                log::debug!("{} did not answer within {:?}", program, timeout);
                None
            }
        }
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    async fn port_open(&self, host: &str, port: u16, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Recording test double with canned answers
    #[derive(Default)]
    pub struct ScriptedProbe {
        pub succeeding: HashSet<String>,
        pub outputs: HashMap<String, String>,
        pub paths: HashSet<PathBuf>,
        /// Port checks answer `true` from this attempt on (1-based), never if `None`
        pub port_open_from: Option<usize>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProbe {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_tool(mut self, program: &str) -> Self {
            self.succeeding.insert(program.to_string());
            self
        }

        pub fn with_output(mut self, program: &str, stdout: &str) -> Self {
            self.outputs.insert(program.to_string(), stdout.to_string());
            self
        }

        pub fn with_path(mut self, path: &str) -> Self {
            self.paths.insert(PathBuf::from(path));
            self
        }

        pub fn with_port_open_from(mut self, attempt: usize) -> Self {
            self.port_open_from = Some(attempt);
            self
        }

        /// Every probe issued so far, as `program args...` / `path:..` / `port:..`
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn port_calls(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.starts_with("port:") || c.starts_with("nc "))
                .count()
        }
    }

    #[async_trait]
    impl HostProbe for ScriptedProbe {
        async fn command_succeeds(&self, program: &str, args: &[String], _timeout: Duration) -> bool {
            self.record(format!("{} {}", program, args.join(" ")));
            if program == "nc" {
                return self
                    .port_open_from
                    .is_some_and(|from| self.port_calls() >= from);
            }
            self.succeeding.contains(program)
        }

        async fn command_output(&self, program: &str, args: &[String], _timeout: Duration) -> Option<String> {
            self.record(format!("{} {}", program, args.join(" ")));
            self.outputs.get(program).cloned()
        }

        fn path_exists(&self, path: &Path) -> bool {
            self.record(format!("path:{}", path.display()));
            self.paths.contains(path)
        }

        async fn port_open(&self, host: &str, port: u16, _timeout: Duration) -> bool {
            self.record(format!("port:{}:{}", host, port));
            self.port_open_from
                .is_some_and(|from| self.port_calls() >= from)
        }
    }
}

//! Streamer - waits for the server, picks a backend and supervises the pipeline

use crate::camera::{detect_backend, Backend, DetectError, HostProbe, SystemProbe};
use crate::config::{PolicyError, SettingsError, StreamSettings, StreamerPolicy};
use crate::runtime::command::LaunchCommand;
use crate::runtime::process::{ProcessError, Supervisor, SupervisorOutcome};
use crate::runtime::readiness::wait_for_server;
use crate::runtime::signal::ShutdownSignal;
use std::sync::Arc;

/// Resolved launch plan for dry-run mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPlan {
    pub settings: StreamSettings,
    pub backend: Backend,
    pub command: LaunchCommand,
}

/// Streaming controller
pub struct Streamer {
    settings: StreamSettings,
    policy: StreamerPolicy,
    probe: Arc<dyn HostProbe>,
}

impl Streamer {
    /// Create a streamer that probes the real host
    pub fn new(settings: StreamSettings, policy: StreamerPolicy) -> Self {
        Self::with_probe(settings, policy, Arc::new(SystemProbe))
    }

    pub fn with_probe(
        settings: StreamSettings,
        policy: StreamerPolicy,
        probe: Arc<dyn HostProbe>,
    ) -> Self {
        Self {
            settings,
            policy,
            probe,
        }
    }

    /// Detect the backend and build its command without launching anything
    pub async fn plan(&self) -> Result<StreamPlan, StreamerError> {
        let backend = detect_backend(&self.policy, self.probe.as_ref()).await?;
        let command = backend.build_command(&self.settings, &self.policy.encoder);

        Ok(StreamPlan {
            settings: self.settings.clone(),
            backend,
            command,
        })
    }

    /// Run the whole session until the pipeline exits or shutdown is requested
    pub async fn run(&self, shutdown: &mut ShutdownSignal) -> Result<SupervisorOutcome, StreamerError> {
        let settings = &self.settings;
        log::info!("Starting camera stream: {}", settings.camera_name);
        log::info!("Resolution: {} @ {}fps", settings.resolution(), settings.framerate);
        log::info!("Bitrate: {}", settings.bitrate);
        log::info!("RTSP URL: {}", settings.rtsp_url());

        tokio::select! {
            _ = wait_for_server(
                &settings.rtsp_server,
                settings.rtsp_port,
                &self.policy.readiness,
                self.probe.as_ref(),
            ) => {}
            _ = shutdown.recv() => {
                log::info!("Shutdown requested before streaming started");
                return Ok(SupervisorOutcome::Terminated);
            }
        }

        let plan = self.plan().await?;
        log::info!("Using camera method: {}", plan.backend);

        if shutdown.is_triggered() {
            log::info!("Shutdown requested before streaming started");
            return Ok(SupervisorOutcome::Terminated);
        }

        let mut supervisor = Supervisor::new(
            plan.backend.kind().name(),
            plan.command,
            self.policy.shutdown_timeout(),
        );
        supervisor.start()?;

        log::info!("Camera stream is running!");
        log::info!("Access stream at: {}", settings.rtsp_url());
        log::info!(
            "For Frigate, use: rtsp://<PI_IP>:{}/camera",
            settings.rtsp_port
        );

        let outcome = supervisor.supervise(shutdown).await?;
        if let Some(uptime) = supervisor.uptime() {
            log::info!("Stream ran for {:.1}s", uptime.as_secs_f64());
        }
        Ok(outcome)
    }
}

/// Errors that end a streaming session before or during launch
#[derive(Debug, thiserror::Error)]
pub enum StreamerError {
    #[error("Invalid configuration: {0}")]
    Settings(#[from] SettingsError),

    #[error("Invalid policy: {0}")]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error("Pipeline failed: {0}")]
    Process(#[from] ProcessError),

    #[error("Failed to register signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Display the stream plan in a human-readable format
impl std::fmt::Display for StreamPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Stream Plan")?;
        writeln!(f, "===========")?;
        writeln!(f)?;
        writeln!(f, "Camera:     {}", self.settings.camera_name)?;
        writeln!(
            f,
            "Resolution: {} @ {}fps",
            self.settings.resolution(),
            self.settings.framerate
        )?;
        writeln!(f, "Bitrate:    {}", self.settings.bitrate)?;
        writeln!(f, "RTSP URL:   {}", self.settings.rtsp_url())?;
        writeln!(f, "Backend:    {}", self.backend)?;
        writeln!(
            f,
            "Launch:     {}",
            if self.command.is_shell() { "shell pipeline" } else { "direct" }
        )?;
        writeln!(f, "Command:    {}", self.command)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::probe::testing::ScriptedProbe;
    use crate::camera::BackendKind;
    use crate::config::ReadinessPolicy;

    fn settings() -> StreamSettings {
        StreamSettings::from_lookup(|_| None).unwrap()
    }

    fn quick_policy(backends: &[BackendKind]) -> StreamerPolicy {
        StreamerPolicy {
            backends: backends.to_vec(),
            readiness: ReadinessPolicy {
                attempts: 2,
                interval_ms: 10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_plan_for_rpicam() {
        let probe = Arc::new(ScriptedProbe::new().with_tool("rpicam-vid"));
        let streamer = Streamer::with_probe(
            settings(),
            quick_policy(&[BackendKind::Rpicam, BackendKind::V4l2]),
            probe,
        );

        let plan = streamer.plan().await.unwrap();
        assert_eq!(plan.backend, Backend::Rpicam);
        assert!(plan.command.is_shell());

        let text = plan.to_string();
        assert!(text.contains("RTSP URL:   rtsp://mediamtx:8554/camera"));
        assert!(text.contains("Launch:     shell pipeline"));
    }

    #[tokio::test]
    async fn test_no_backend_is_fatal() {
        let probe = Arc::new(ScriptedProbe::new());
        let streamer = Streamer::with_probe(
            settings(),
            quick_policy(&[BackendKind::Rpicam, BackendKind::Libcamera, BackendKind::V4l2]),
            probe.clone(),
        );

        let mut shutdown = ShutdownSignal::new();
        let result = streamer.run(&mut shutdown).await;
        assert!(matches!(result, Err(StreamerError::Detect(_))));

        // readiness gave up after two attempts, then every backend was probed
        let calls = probe.calls();
        assert_eq!(
            calls,
            vec![
                "port:mediamtx:8554",
                "port:mediamtx:8554",
                "rpicam-vid --version",
                "libcamera-vid --version",
                "path:/dev/video0",
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_before_launch_is_graceful() {
        let probe = Arc::new(ScriptedProbe::new().with_tool("rpicam-vid"));
        let mut policy = quick_policy(&[BackendKind::Rpicam]);
        policy.readiness.attempts = 1000;
        let streamer = Streamer::with_probe(settings(), policy, probe.clone());

        let mut shutdown = ShutdownSignal::new();
        shutdown.handle().trigger();

        let outcome = streamer.run(&mut shutdown).await.unwrap();
        assert_eq!(outcome, SupervisorOutcome::Terminated);
        assert!(!probe.calls().iter().any(|c| c.contains("--version")));
    }

    #[cfg(unix)]
    #[test]
    fn test_pipeline_exit_code_propagates() {
        // Scripted encoder so the device-copy command can run for real. It is
        // written before any runtime thread exists.
        let dir = tempfile::tempdir().unwrap();
        let encoder = dir.path().join("fake-ffmpeg");
        std::fs::write(&encoder, "#!/bin/sh\nexit 137\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&encoder, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let probe = Arc::new(
            ScriptedProbe::new()
                .with_path("/dev/video0")
                .with_port_open_from(1),
        );
        let mut policy = quick_policy(&[BackendKind::V4l2]);
        policy.detect_format = false;
        policy.fallback_format = crate::camera::PixelFormat::H264;
        policy.encoder.program = encoder.display().to_string();
        let streamer = Streamer::with_probe(settings(), policy, probe);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let outcome = runtime.block_on(async {
            // A test thread forking elsewhere can briefly hold the script open
            // for writing, which makes exec fail with ETXTBSY
            for _ in 0..20 {
                let mut shutdown = ShutdownSignal::new();
                match streamer.run(&mut shutdown).await {
                    Err(StreamerError::Process(ProcessError::SpawnFailed { source, .. }))
                        if source.raw_os_error() == Some(nix::errno::Errno::ETXTBSY as i32) =>
                    {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    }
                    result => return result.unwrap(),
                }
            }
            panic!("encoder script stayed busy");
        });

        assert_eq!(outcome, SupervisorOutcome::Exited { code: 137 });
        assert_eq!(outcome.exit_code(), 137);
    }
}

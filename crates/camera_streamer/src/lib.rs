//! Camera Streamer
//!
//! Streams a single-board computer's camera to an RTSP server through an
//! external capture/encode pipeline.
//!
//! # Overview
//!
//! A streaming session:
//! - Reads its settings from the environment (`CAMERA_NAME`, `RTSP_SERVER`,
//!   `RTSP_PORT`, `RESOLUTION`, `FRAMERATE`, `BITRATE`)
//! - Waits (best effort) for the RTSP server's TCP port
//! - Probes camera backends in policy order and picks the first available
//! - Launches the pipeline and supervises it until it exits or a
//!   termination signal arrives
//!
//! # Example Policy File
//!
//! ```yaml
//! backends: [rpicam, libcamera, v4l2]
//! device: /dev/video0
//! detect_format: true
//!
//! readiness:
//!   method: tcp
//!   attempts: 30
//!   interval_ms: 1000
//!
//! shutdown_timeout_ms: 5000
//!
//! encoder:
//!   program: ffmpeg
//!   keyframe_interval: 30
//! ```

pub mod camera;
pub mod cli;
pub mod config;
pub mod runtime;

pub use camera::{Backend, BackendKind, DetectError, HostProbe, PixelFormat, SystemProbe};
pub use cli::StreamerArgs;
pub use config::{PolicyError, SettingsError, StreamSettings, StreamerPolicy};
pub use runtime::{
    LaunchCommand, ProcessError, ProcessStatus, Readiness, ShutdownSignal, StreamPlan, Streamer,
    StreamerError, Supervisor, SupervisorOutcome,
};

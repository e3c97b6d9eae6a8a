//! Camera backends: detection in priority order and pipeline construction

use super::format::{detect_format, PixelFormat};
use super::probe::HostProbe;
use crate::config::{EncoderPolicy, StreamSettings, StreamerPolicy};
use crate::runtime::command::LaunchCommand;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Candidate camera access methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// `rpicam-vid` from rpicam-apps
    Rpicam,
    /// `libcamera-vid`, the older name of the same tool
    Libcamera,
    /// Raw V4L2 device node read by the encoder
    V4l2,
}

/// How a backend is recognised on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendProbe<'a> {
    /// Tool answers `--version` with exit status zero
    Version(&'static str),
    /// Device node exists; nothing is executed
    Device(&'a Path),
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Rpicam => "rpicam",
            BackendKind::Libcamera => "libcamera",
            BackendKind::V4l2 => "v4l2",
        }
    }

    /// Probe for this backend given the configured raw device
    pub fn probe<'a>(&self, device: &'a Path) -> BackendProbe<'a> {
        match self {
            BackendKind::Rpicam => BackendProbe::Version("rpicam-vid"),
            BackendKind::Libcamera => BackendProbe::Version("libcamera-vid"),
            BackendKind::V4l2 => BackendProbe::Device(device),
        }
    }

    /// Run the probe against the host
    pub async fn is_available(&self, policy: &StreamerPolicy, probe: &dyn HostProbe) -> bool {
        match self.probe(&policy.device) {
            BackendProbe::Version(tool) => {
                probe
                    .command_succeeds(tool, &["--version".to_string()], policy.probe_timeout())
                    .await
            }
            BackendProbe::Device(path) => probe.path_exists(path),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rpicam" => Ok(BackendKind::Rpicam),
            "libcamera" => Ok(BackendKind::Libcamera),
            "v4l2" => Ok(BackendKind::V4l2),
            other => Err(format!(
                "Unknown camera backend '{}'. Expected rpicam, libcamera or v4l2",
                other
            )),
        }
    }
}

/// A detected, usable backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Rpicam,
    Libcamera,
    V4l2 { device: PathBuf, format: PixelFormat },
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Rpicam => BackendKind::Rpicam,
            Backend::Libcamera => BackendKind::Libcamera,
            Backend::V4l2 { .. } => BackendKind::V4l2,
        }
    }

    /// Build the pipeline command for this backend
    pub fn build_command(&self, settings: &StreamSettings, encoder: &EncoderPolicy) -> LaunchCommand {
        match self {
            Backend::Rpicam => capture_pipeline("rpicam-vid", settings, encoder),
            Backend::Libcamera => capture_pipeline("libcamera-vid", settings, encoder),
            Backend::V4l2 {
                device,
                format: PixelFormat::H264,
            } => device_copy(device, settings, encoder),
            Backend::V4l2 { device, format } => transcode(device, *format, settings, encoder),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::V4l2 { device, format } => {
                write!(f, "v4l2 ({}, {})", device.display(), format)
            }
            other => f.write_str(other.kind().name()),
        }
    }
}

fn to_args(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn rtsp_output(settings: &StreamSettings, encoder: &EncoderPolicy) -> Vec<String> {
    vec![
        "-f".to_string(),
        "rtsp".to_string(),
        "-rtsp_transport".to_string(),
        encoder.transport.clone(),
        settings.rtsp_url(),
    ]
}

fn v4l2_input(device: &Path, format: PixelFormat, settings: &StreamSettings) -> Vec<String> {
    vec![
        "-f".to_string(),
        "v4l2".to_string(),
        "-input_format".to_string(),
        format.ffmpeg_input_format().to_string(),
        "-video_size".to_string(),
        settings.resolution(),
        "-framerate".to_string(),
        settings.framerate.to_string(),
        "-i".to_string(),
        device.display().to_string(),
    ]
}

/// Capture tool emits H.264 on stdout, the encoder repackages it for RTSP
fn capture_pipeline(tool: &str, settings: &StreamSettings, encoder: &EncoderPolicy) -> LaunchCommand {
    let capture = vec![
        "--width".to_string(),
        settings.width.to_string(),
        "--height".to_string(),
        settings.height.to_string(),
        "--framerate".to_string(),
        settings.framerate.to_string(),
        "--bitrate".to_string(),
        settings.bitrate.to_string(),
        "--codec".to_string(),
        "h264".to_string(),
        "--inline".to_string(),
        "--flush".to_string(),
        "-t".to_string(),
        "0".to_string(),
        "-o".to_string(),
        "-".to_string(),
    ];

    let mut repackage = to_args(&["-re", "-f", "h264", "-i", "pipe:0", "-c:v", "copy"]);
    repackage.extend(rtsp_output(settings, encoder));

    LaunchCommand::pipeline(&[(tool, capture), (encoder.program.as_str(), repackage)])
}

/// Encoder reads H.264 straight from the device and repackages it
fn device_copy(device: &Path, settings: &StreamSettings, encoder: &EncoderPolicy) -> LaunchCommand {
    let mut args = v4l2_input(device, PixelFormat::H264, settings);
    args.extend(to_args(&["-c:v", "copy"]));
    args.extend(rtsp_output(settings, encoder));
    LaunchCommand::exec(encoder.program.clone(), args)
}

/// Encoder reads raw or MJPEG frames and encodes H.264 with low-latency tuning
fn transcode(
    device: &Path,
    format: PixelFormat,
    settings: &StreamSettings,
    encoder: &EncoderPolicy,
) -> LaunchCommand {
    let bitrate = settings.bitrate.to_string();
    let bufsize = (u64::from(settings.bitrate) * 2).to_string();

    let mut args = v4l2_input(device, format, settings);
    args.extend(to_args(&[
        "-c:v",
        "libx264",
        "-preset",
        "ultrafast",
        "-tune",
        "zerolatency",
    ]));
    args.extend([
        "-g".to_string(),
        encoder.keyframe_interval.to_string(),
        "-b:v".to_string(),
        bitrate.clone(),
        "-maxrate".to_string(),
        bitrate,
        "-bufsize".to_string(),
        bufsize,
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]);
    args.extend(rtsp_output(settings, encoder));
    LaunchCommand::exec(encoder.program.clone(), args)
}

/// Try each backend in policy order and return the first one available
///
/// Backends after the first hit are never probed.
pub async fn detect_backend(
    policy: &StreamerPolicy,
    probe: &dyn HostProbe,
) -> Result<Backend, DetectError> {
    for kind in &policy.backends {
        log::debug!("Probing camera backend: {}", kind);

        if !kind.is_available(policy, probe).await {
            log::debug!("Camera backend {} not available", kind);
            continue;
        }

        let backend = match kind {
            BackendKind::Rpicam => Backend::Rpicam,
            BackendKind::Libcamera => Backend::Libcamera,
            BackendKind::V4l2 => {
                let format = if policy.detect_format {
                    detect_format(
                        &policy.device,
                        policy.fallback_format,
                        policy.probe_timeout(),
                        probe,
                    )
                    .await
                } else {
                    policy.fallback_format
                };
                Backend::V4l2 {
                    device: policy.device.clone(),
                    format,
                }
            }
        };

        return Ok(backend);
    }

    Err(DetectError::NoBackend {
        tried: policy.backends.clone(),
    })
}

/// Errors from backend detection
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("No camera backend found (tried: {}). Ensure rpicam-apps is installed on the host or a capture device is present", join_kinds(.tried))]
    NoBackend { tried: Vec<BackendKind> },
}

fn join_kinds(kinds: &[BackendKind]) -> String {
    kinds.iter().map(|k| k.name()).collect::<Vec<_>>().join(", ")
}

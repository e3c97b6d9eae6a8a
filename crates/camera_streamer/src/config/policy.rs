//! Streamer policy file YAML schema

use crate::camera::{BackendKind, PixelFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root policy configuration
///
/// Every field has a default, so an empty file (or no file at all) yields
/// the stock policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerPolicy {
    /// Camera backends to try, in priority order
    pub backends: Vec<BackendKind>,

    /// Raw capture device used by the v4l2 backend
    pub device: PathBuf,

    /// Query the raw device for its capture formats
    pub detect_format: bool,

    /// Capture format used when detection is disabled or inconclusive
    pub fallback_format: PixelFormat,

    /// Timeout for each version/format probe in milliseconds
    pub probe_timeout_ms: u64,

    /// RTSP server readiness gate
    pub readiness: ReadinessPolicy,

    /// Time the pipeline gets to exit after SIGTERM before it is killed
    pub shutdown_timeout_ms: u64,

    /// Encoder/repackager settings
    pub encoder: EncoderPolicy,
}

impl Default for StreamerPolicy {
    fn default() -> Self {
        Self {
            backends: vec![BackendKind::Rpicam, BackendKind::Libcamera, BackendKind::V4l2],
            device: PathBuf::from("/dev/video0"),
            detect_format: true,
            fallback_format: PixelFormat::Yuyv,
            probe_timeout_ms: 2000,
            readiness: ReadinessPolicy::default(),
            shutdown_timeout_ms: 5000,
            encoder: EncoderPolicy::default(),
        }
    }
}

/// How the RTSP server is checked before streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessMethod {
    /// Native TCP connect
    #[default]
    Tcp,
    /// `nc -z host port`
    Netcat,
}

/// Readiness gate configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessPolicy {
    /// Skip the gate entirely when false
    pub enabled: bool,
    pub method: ReadinessMethod,
    /// Number of connection checks
    pub attempts: u32,
    /// Sleep between checks in milliseconds
    pub interval_ms: u64,
    /// Bound on a single check in milliseconds
    pub timeout_ms: u64,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            method: ReadinessMethod::Tcp,
            attempts: 30,
            interval_ms: 1000,
            timeout_ms: 2000,
        }
    }
}

impl ReadinessPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Encoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderPolicy {
    /// Encoder executable
    pub program: String,
    /// GOP length in frames for the transcode form
    pub keyframe_interval: u32,
    /// RTSP lower transport (`tcp` or `udp`)
    pub transport: String,
}

impl Default for EncoderPolicy {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            keyframe_interval: 30,
            transport: "tcp".to_string(),
        }
    }
}

impl StreamerPolicy {
    /// Load policy from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PolicyError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse policy from YAML string
    pub fn from_yaml(content: &str) -> Result<Self, PolicyError> {
        // serde_yaml rejects an empty document, treat it as all defaults
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let policy: StreamerPolicy = serde_yaml::from_str(content)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Apply `CAMERA_BACKENDS` and `CAMERA_DEVICE` overrides
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), PolicyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(list) = lookup("CAMERA_BACKENDS") {
            self.backends = parse_backend_list(&list).map_err(PolicyError::Validation)?;
        }
        if let Some(device) = lookup("CAMERA_DEVICE") {
            self.device = PathBuf::from(device);
        }
        self.validate()
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.backends.is_empty() {
            return Err(PolicyError::Validation(
                "at least one camera backend must be listed".to_string(),
            ));
        }

        for (i, backend) in self.backends.iter().enumerate() {
            if self.backends[..i].contains(backend) {
                return Err(PolicyError::Validation(format!(
                    "backend '{}' is listed more than once",
                    backend
                )));
            }
        }

        if self.readiness.attempts == 0 {
            return Err(PolicyError::Validation(
                "readiness.attempts must be at least 1".to_string(),
            ));
        }

        if self.encoder.keyframe_interval == 0 {
            return Err(PolicyError::Validation(
                "encoder.keyframe_interval must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Parse a comma-separated backend list such as `rpicam,v4l2`
pub fn parse_backend_list(s: &str) -> Result<Vec<BackendKind>, String> {
    s.split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::parse)
        .collect()
}

/// Errors that can occur when loading a policy file
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Failed to read policy file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse policy file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

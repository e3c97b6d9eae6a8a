//! Capture format detection for raw V4L2 devices

use super::probe::HostProbe;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Capture pixel formats the streamer knows how to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Already-encoded H.264, repackaged without re-encoding
    H264,
    /// Motion-JPEG, compressed but transcoded
    Mjpeg,
    /// Raw YUYV 4:2:2
    Yuyv,
}

impl PixelFormat {
    /// Detection preference, most preferred first
    pub const PREFERENCE: [PixelFormat; 3] = [PixelFormat::H264, PixelFormat::Mjpeg, PixelFormat::Yuyv];

    /// V4L2 FourCC as printed by `v4l2-ctl --list-formats`
    pub fn fourcc(&self) -> &'static str {
        match self {
            PixelFormat::H264 => "H264",
            PixelFormat::Mjpeg => "MJPG",
            PixelFormat::Yuyv => "YUYV",
        }
    }

    /// Value for ffmpeg's `-input_format`
    pub fn ffmpeg_input_format(&self) -> &'static str {
        match self {
            PixelFormat::H264 => "h264",
            PixelFormat::Mjpeg => "mjpeg",
            PixelFormat::Yuyv => "yuyv422",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fourcc())
    }
}

/// Extract the FourCC codes from `v4l2-ctl --list-formats` output
///
/// Lines look like `[1]: 'MJPG' (Motion-JPEG, compressed)`.
pub fn parse_fourccs(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let start = line.find('\'')?;
            let rest = &line[start + 1..];
            let end = rest.find('\'')?;
            let code = rest[..end].trim();
            (!code.is_empty()).then(|| code.to_string())
        })
        .collect()
}

/// Pick the preferred supported format from a list of advertised FourCCs
pub fn select_format(advertised: &[String], fallback: PixelFormat) -> PixelFormat {
    PixelFormat::PREFERENCE
        .into_iter()
        .find(|f| advertised.iter().any(|code| code == f.fourcc()))
        .unwrap_or(fallback)
}

/// Query a device for its capture formats and pick one
///
/// Falls back silently when `v4l2-ctl` is missing, fails or times out.
pub async fn detect_format(
    device: &Path,
    fallback: PixelFormat,
    timeout: Duration,
    probe: &dyn HostProbe,
) -> PixelFormat {
    let args = vec![
        "--device".to_string(),
        device.display().to_string(),
        "--list-formats".to_string(),
    ];

    match probe.command_output("v4l2-ctl", &args, timeout).await {
        Some(output) => {
            let advertised = parse_fourccs(&output);
            let format = select_format(&advertised, fallback);
            log::info!(
                "{} advertises [{}], using {}",
                device.display(),
                advertised.join(", "),
                format
            );
            format
        }
        None => {
            log::warn!(
                "Could not query formats of {}, using {}",
                device.display(),
                fallback
            );
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::probe::testing::ScriptedProbe;

    const LIST_FORMATS: &str = "ioctl: VIDIOC_ENUM_FMT
\tType: Video Capture

\t[0]: 'YUYV' (YUYV 4:2:2)
\t[1]: 'MJPG' (Motion-JPEG, compressed)
";

    #[test]
    fn test_parse_fourccs() {
        assert_eq!(parse_fourccs(LIST_FORMATS), vec!["YUYV", "MJPG"]);
        assert!(parse_fourccs("").is_empty());
    }

    #[test]
    fn test_prefers_compressed_format() {
        let advertised = vec!["YUYV".to_string(), "MJPG".to_string()];
        assert_eq!(select_format(&advertised, PixelFormat::Yuyv), PixelFormat::Mjpeg);

        let advertised = vec!["MJPG".to_string(), "H264".to_string()];
        assert_eq!(select_format(&advertised, PixelFormat::Yuyv), PixelFormat::H264);
    }

    #[test]
    fn test_unknown_formats_use_fallback() {
        let advertised = vec!["RG10".to_string()];
        assert_eq!(select_format(&advertised, PixelFormat::Yuyv), PixelFormat::Yuyv);
    }

    #[tokio::test]
    async fn test_detect_format_from_device() {
        let probe = ScriptedProbe::new().with_output("v4l2-ctl", LIST_FORMATS);
        let format = detect_format(
            Path::new("/dev/video0"),
            PixelFormat::Yuyv,
            Duration::from_secs(2),
            &probe,
        )
        .await;

        assert_eq!(format, PixelFormat::Mjpeg);
        assert_eq!(
            probe.calls(),
            vec!["v4l2-ctl --device /dev/video0 --list-formats"]
        );
    }

    #[tokio::test]
    async fn test_failed_query_uses_fallback() {
        let probe = ScriptedProbe::new();
        let format = detect_format(
            Path::new("/dev/video0"),
            PixelFormat::Yuyv,
            Duration::from_secs(2),
            &probe,
        )
        .await;
        assert_eq!(format, PixelFormat::Yuyv);
    }
}

//! Streaming session settings read from the environment

use std::num::ParseIntError;

pub const DEFAULT_CAMERA_NAME: &str = "pi-camera";
pub const DEFAULT_RTSP_SERVER: &str = "mediamtx";
pub const DEFAULT_RTSP_PORT: &str = "8554";
pub const DEFAULT_RESOLUTION: &str = "1280x720";
pub const DEFAULT_FRAMERATE: &str = "15";
pub const DEFAULT_BITRATE: &str = "2000000";

/// Immutable settings for one streaming session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Display name of the camera (logging only)
    pub camera_name: String,
    /// Hostname of the RTSP server
    pub rtsp_server: String,
    /// TCP port of the RTSP server
    pub rtsp_port: u16,
    /// Capture width in pixels
    pub width: u32,
    /// Capture height in pixels
    pub height: u32,
    /// Frames per second
    pub framerate: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
}

impl StreamSettings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through a variable lookup function
    ///
    /// Unset variables fall back to their defaults:
    /// `CAMERA_NAME`, `RTSP_SERVER`, `RTSP_PORT`, `RESOLUTION` (`WxH`),
    /// `FRAMERATE` and `BITRATE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let resolution = get("RESOLUTION", DEFAULT_RESOLUTION);
        let (width, height) = parse_resolution(&resolution)?;

        let port = get("RTSP_PORT", DEFAULT_RTSP_PORT);
        let rtsp_port = port
            .trim()
            .parse::<u16>()
            .map_err(|source| SettingsError::InvalidNumber {
                name: "RTSP_PORT",
                value: port.clone(),
                source,
            })?;
        if rtsp_port == 0 {
            return Err(SettingsError::NotPositive { name: "RTSP_PORT" });
        }

        Ok(Self {
            camera_name: get("CAMERA_NAME", DEFAULT_CAMERA_NAME),
            rtsp_server: get("RTSP_SERVER", DEFAULT_RTSP_SERVER),
            rtsp_port,
            width,
            height,
            framerate: parse_positive("FRAMERATE", &get("FRAMERATE", DEFAULT_FRAMERATE))?,
            bitrate: parse_positive("BITRATE", &get("BITRATE", DEFAULT_BITRATE))?,
        })
    }

    /// RTSP publish URL on the target server
    pub fn rtsp_url(&self) -> String {
        format!("rtsp://{}:{}/camera", self.rtsp_server, self.rtsp_port)
    }

    /// Resolution formatted as `WxH`
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Parse a `WxH` resolution string into positive dimensions
pub fn parse_resolution(s: &str) -> Result<(u32, u32), SettingsError> {
    let parts: Vec<&str> = s.trim().split('x').collect();
    if parts.len() != 2 {
        return Err(SettingsError::InvalidResolution(s.to_string()));
    }

    let width = parts[0]
        .trim()
        .parse::<u32>()
        .map_err(|_| SettingsError::InvalidResolution(s.to_string()))?;
    let height = parts[1]
        .trim()
        .parse::<u32>()
        .map_err(|_| SettingsError::InvalidResolution(s.to_string()))?;

    if width == 0 || height == 0 {
        return Err(SettingsError::InvalidResolution(s.to_string()));
    }

    Ok((width, height))
}

fn parse_positive(name: &'static str, value: &str) -> Result<u32, SettingsError> {
    let parsed = value
        .trim()
        .parse::<u32>()
        .map_err(|source| SettingsError::InvalidNumber {
            name,
            value: value.to_string(),
            source,
        })?;
    if parsed == 0 {
        return Err(SettingsError::NotPositive { name });
    }
    Ok(parsed)
}

/// Errors produced while reading session settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Invalid resolution '{0}'. Expected 'WIDTHxHEIGHT'")]
    InvalidResolution(String),

    #[error("Invalid value '{value}' for {name}: {source}")]
    InvalidNumber {
        name: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("{name} must be greater than zero")]
    NotPositive { name: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<StreamSettings, SettingsError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StreamSettings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = load(&[]).unwrap();
        assert_eq!(settings.camera_name, "pi-camera");
        assert_eq!(settings.rtsp_server, "mediamtx");
        assert_eq!(settings.rtsp_port, 8554);
        assert_eq!((settings.width, settings.height), (1280, 720));
        assert_eq!(settings.framerate, 15);
        assert_eq!(settings.bitrate, 2_000_000);
        assert_eq!(settings.rtsp_url(), "rtsp://mediamtx:8554/camera");
    }

    #[test]
    fn test_url_follows_server_and_port() {
        let settings = load(&[("RTSP_SERVER", "10.0.0.5"), ("RTSP_PORT", "9554")]).unwrap();
        assert_eq!(settings.rtsp_url(), "rtsp://10.0.0.5:9554/camera");
    }

    #[test]
    fn test_custom_resolution() {
        let settings = load(&[("RESOLUTION", "640x480")]).unwrap();
        assert_eq!(settings.width, 640);
        assert_eq!(settings.height, 480);
        assert_eq!(settings.resolution(), "640x480");
    }

    #[test]
    fn test_resolution_parts_are_trimmed() {
        assert_eq!(parse_resolution("1280 x 720").unwrap(), (1280, 720));
        assert_eq!(parse_resolution(" 640x 480 ").unwrap(), (640, 480));
    }

    #[test]
    fn test_malformed_resolution() {
        for bad in ["1280", "1280x720x3", "widexhigh", "1280x", "x720", "0x720", ""] {
            let result = load(&[("RESOLUTION", bad)]);
            assert!(
                matches!(result, Err(SettingsError::InvalidResolution(_))),
                "expected failure for {bad:?}"
            );
        }
    }

    #[test]
    fn test_invalid_framerate() {
        let result = load(&[("FRAMERATE", "fast")]);
        assert!(matches!(
            result,
            Err(SettingsError::InvalidNumber { name: "FRAMERATE", .. })
        ));
    }

    #[test]
    fn test_zero_bitrate() {
        let result = load(&[("BITRATE", "0")]);
        assert!(matches!(
            result,
            Err(SettingsError::NotPositive { name: "BITRATE" })
        ));
    }

    #[test]
    fn test_invalid_port() {
        assert!(load(&[("RTSP_PORT", "99999")]).is_err());
        assert!(load(&[("RTSP_PORT", "0")]).is_err());
    }
}

//! Command-line interface for camera_streamer

use crate::camera::BackendKind;
use crate::config::parse_backend_list;
use argh::FromArgs;

/// Detect a camera backend and stream it to an RTSP server
///
/// Session settings come from CAMERA_NAME, RTSP_SERVER, RTSP_PORT,
/// RESOLUTION, FRAMERATE and BITRATE.
#[derive(FromArgs, Debug)]
pub struct StreamerArgs {
    /// path to a YAML policy file (backend order, timeouts, encoder)
    #[argh(option, short = 'c')]
    pub config: Option<String>,

    /// camera backends to try in order (comma-separated: rpicam,libcamera,v4l2)
    #[argh(option, short = 'b', from_str_fn(parse_backends))]
    pub backends: Option<Vec<BackendKind>>,

    /// show the stream plan without waiting or launching
    #[argh(switch)]
    pub dry_run: bool,

    /// skip waiting for the RTSP server
    #[argh(switch)]
    pub no_wait: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,
}

/// Parse comma-separated backend list
fn parse_backends(s: &str) -> Result<Vec<BackendKind>, String> {
    let backends = parse_backend_list(s)?;
    if backends.is_empty() {
        return Err("Expected at least one camera backend".to_string());
    }
    Ok(backends)
}

impl StreamerArgs {
    /// Normalized log level for env_logger
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.to_lowercase().as_str() {
            "error" => "error",
            "warn" => "warn",
            "debug" => "debug",
            "trace" => "trace",
            _ => "info",
        }
    }
}

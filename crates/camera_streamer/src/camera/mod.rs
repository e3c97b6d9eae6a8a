//! Camera backend probing and selection

pub mod backend;
pub mod format;
pub mod probe;

pub use backend::*;
pub use format::{detect_format, PixelFormat};
pub use probe::{HostProbe, SystemProbe};

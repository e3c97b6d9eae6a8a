//! Runtime components: readiness, launch commands and process supervision

pub mod command;
pub mod process;
pub mod readiness;
pub mod signal;
pub mod streamer;

pub use command::*;
pub use process::*;
pub use readiness::*;
pub use signal::*;
pub use streamer::*;

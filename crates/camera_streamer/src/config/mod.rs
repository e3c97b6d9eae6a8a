//! Session settings and streamer policy

mod policy;
mod settings;

pub use policy::*;
pub use settings::*;

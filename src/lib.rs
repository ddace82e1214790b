//! A library for streaming frames from Spinnaker (GenICam) cameras.
//!
//! This library provides functionality for:
//! - Enumerating, initializing and configuring a camera through its node maps
//! - Grabbing frames, tracking frame IDs and converting them to BGR8
//! - Sharing the latest frame with a rate-limited ZMQ publisher
//! - Running against a simulated SDK when no hardware binding is linked

pub mod camera;
pub mod cli;
pub mod config;
pub mod error;
pub mod frame;
pub mod logging;
pub mod messaging;
pub mod node;
pub mod sdk;

pub use camera::{CameraSession, CameraSetting, SessionState, SessionStats};
pub use config::Config;
pub use error::{AppError, CameraError, Result};
pub use frame::{convert_to_image, Frame, LatestFrame};
pub use messaging::{FrameSink, PublishTimer, ZmqImagePublisher};
pub use node::{run_acquisition, AcquisitionOptions};
pub use sdk::sim::SimSystem;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
///
/// Sets up logging and announces the version. Call it once before any other
/// functionality.
///
/// # Arguments
///
/// * `debug` - Whether to enable debug logging
/// * `log_file` - Optional path to a log file. If None, logs will only be output to stdout.
pub fn initialize(debug: bool, log_file: Option<&str>) -> anyhow::Result<()> {
    logging::setup_logging(debug as u8, log_file)?;
    logging::log_app_start(VERSION);
    Ok(())
}

/// Creates a session on the simulated SDK described by `config`.
pub fn new_session(config: &Config) -> CameraSession<SimSystem> {
    CameraSession::new(SimSystem::new(config.sim.clone())).with_timeout(config.camera.grab_timeout())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty(), "Version should not be empty");
    }

    #[test]
    fn test_initialize_installs_logger() {
        initialize(false, None).unwrap();
        assert_eq!(log::max_level(), log::LevelFilter::Info);
        assert!(initialize(false, None).is_err());
    }

    #[test]
    fn test_new_session() {
        let session = new_session(&Config::default());
        assert_eq!(session.state(), SessionState::Created);
        assert!(session.last_image().is_none());
    }
}

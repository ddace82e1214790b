mod config;
mod sequence;
mod session;
mod settings;

pub use config::CameraConfig;
pub use sequence::{SequenceEvent, SequenceTracker, NO_FRAME};
pub use session::{CameraSession, SessionState, SessionStats, GET_NEXT_IMAGE_TIMEOUT};
pub use settings::{CameraSetting, SettingValue};

use std::time::Duration;

use thiserror::Error;

use crate::camera::SessionState;
use crate::sdk::{NodeKind, SdkError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("ZMQ communication error: {0}")]
    ZmqCommunication(#[from] zmq::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("No cameras detected")]
    NoDeviceFound,

    #[error("Cannot {operation} while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Failed to {operation}: {source}")]
    Device {
        operation: &'static str,
        source: SdkError,
    },

    #[error("Unable to set {setting} to {value}: {reason}")]
    Configuration {
        setting: String,
        value: String,
        reason: ConfigFailure,
    },

    #[error("Image incomplete with image status {status}")]
    FrameIncomplete { status: i32 },

    #[error("First frame ID was {frame_id} instead of zero")]
    SequenceAssertion { frame_id: i64 },

    #[error("Timed out after {0:?} waiting for the next image")]
    Timeout(Duration),

    #[error("Failed to convert frame: {0}")]
    Conversion(String),
}

/// Why a node write was refused.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigFailure {
    #[error("node is not available")]
    NodeUnavailable,

    #[error("node is of kind {found}, expected {expected}")]
    WrongKind { expected: NodeKind, found: NodeKind },

    #[error("node is not writable")]
    NotWritable,

    #[error("enumeration entry is not available")]
    EntryUnavailable,

    #[error("enumeration entry is not readable")]
    EntryNotReadable,

    #[error(transparent)]
    Sdk(#[from] SdkError),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl CameraError {
    pub fn device(operation: &'static str, source: SdkError) -> Self {
        CameraError::Device { operation, source }
    }

    pub fn configuration(
        setting: impl Into<String>,
        value: impl ToString,
        reason: ConfigFailure,
    ) -> Self {
        CameraError::Configuration {
            setting: setting.into(),
            value: value.to_string(),
            reason,
        }
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        CameraError::Conversion(msg.into())
    }

    /// Errors scoped to a single frame. The stream itself is still usable.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            CameraError::FrameIncomplete { .. }
                | CameraError::SequenceAssertion { .. }
                | CameraError::Timeout(_)
        )
    }
}

use log::{error, warn};

use crate::error::CameraError;

/// Frame ID value meaning no frame has been observed yet.
pub const NO_FRAME: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    First,
    Contiguous,
    Skipped { missing: u64 },
}

/// Tracks frame-ID continuity of the stream to detect dropped frames.
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    last_timestamp: Option<u64>,
    current_frame_id: i64,
    previous_frame_id: i64,
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self {
            last_timestamp: None,
            current_frame_id: NO_FRAME,
            previous_frame_id: NO_FRAME,
        }
    }
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a complete frame.
    ///
    /// The first frame of a stream must carry ID 0. A different first ID is
    /// still recorded, so tracking continues from it, but is reported as
    /// [`CameraError::SequenceAssertion`].
    pub fn observe(&mut self, frame_id: i64, timestamp: u64) -> Result<SequenceEvent, CameraError> {
        self.last_timestamp = Some(timestamp);

        if self.current_frame_id >= 0 {
            self.previous_frame_id = self.current_frame_id;
            self.current_frame_id = frame_id;
            let gap = i128::from(self.current_frame_id) - i128::from(self.previous_frame_id) - 1;
            if gap > 0 {
                let missing = u64::try_from(gap).unwrap_or(u64::MAX);
                warn!(
                    "Frames are being skipped! {} frame(s) lost between {} and {}",
                    missing, self.previous_frame_id, self.current_frame_id
                );
                return Ok(SequenceEvent::Skipped { missing });
            }
            return Ok(SequenceEvent::Contiguous);
        }

        self.current_frame_id = frame_id;
        if frame_id != 0 {
            error!(
                "First frame ID was {} instead of zero, frames may be out of sync",
                frame_id
            );
            return Err(CameraError::SequenceAssertion { frame_id });
        }
        Ok(SequenceEvent::First)
    }

    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    pub fn current_frame_id(&self) -> i64 {
        self.current_frame_id
    }

    pub fn previous_frame_id(&self) -> i64 {
        self.previous_frame_id
    }
}

use std::sync::{Arc, PoisonError, RwLock};

use super::types::ArcFrame;

/// The most recently grabbed frame, shared between the acquisition loop and
/// the publisher.
///
/// The slot holds an `Arc<Frame>` that is replaced as a whole, so a reader
/// always sees one complete frame, old or new.
#[derive(Clone, Default)]
pub struct LatestFrame {
    slot: Arc<RwLock<Option<ArcFrame>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps in `frame`, returning the one it replaced.
    pub fn store(&self, frame: ArcFrame) -> Option<ArcFrame> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.replace(frame)
    }

    pub fn load(&self) -> Option<ArcFrame> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use std::thread;

    fn frame(frame_id: i64, fill: u8) -> ArcFrame {
        Arc::new(Frame::new(vec![fill; 4 * 4 * 3], 4, 4, 0, 0, frame_id, 0))
    }

    #[test]
    fn test_empty_until_stored() {
        let latest = LatestFrame::new();
        assert!(latest.is_empty());
        assert!(latest.load().is_none());

        assert!(latest.store(frame(0, 0)).is_none());
        assert!(!latest.is_empty());
        assert_eq!(latest.load().unwrap().frame_id, 0);
    }

    #[test]
    fn test_store_returns_previous() {
        let latest = LatestFrame::new();
        latest.store(frame(0, 0));
        let previous = latest.store(frame(1, 1)).unwrap();
        assert_eq!(previous.frame_id, 0);
        assert_eq!(latest.load().unwrap().frame_id, 1);
    }

    #[test]
    fn test_readers_see_whole_frames() {
        let latest = LatestFrame::new();
        latest.store(frame(0, 0));

        let writer = {
            let latest = latest.clone();
            thread::spawn(move || {
                for i in 1..=200u8 {
                    latest.store(frame(i64::from(i), i));
                }
            })
        };

        for _ in 0..200 {
            let current = latest.load().unwrap();
            let fill = current.data[0];
            assert!(current.data.iter().all(|&b| b == fill));
            assert_eq!(current.frame_id, i64::from(fill));
        }
        writer.join().unwrap();
        assert_eq!(latest.load().unwrap().frame_id, 200);
    }
}

use serde::{Deserialize, Serialize};

use crate::frame::{Frame, ENCODING};

/// Metadata frame sent ahead of the pixel payload, laid out like a
/// `sensor_msgs/Image` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHeader {
    pub seq: u64,
    pub frame_id: i64,
    pub stamp_ns: u64,
    pub width: u32,
    pub height: u32,
    pub encoding: String,
    pub is_bigendian: u8,
    pub step: u32,
}

impl ImageHeader {
    pub fn for_frame(seq: u64, frame: &Frame) -> Self {
        Self {
            seq,
            frame_id: frame.frame_id,
            stamp_ns: frame.timestamp,
            width: frame.width,
            height: frame.height,
            encoding: ENCODING.to_string(),
            is_bigendian: 0,
            step: frame.step() as u32,
        }
    }

    /// Payload size the header promises.
    pub fn data_len(&self) -> usize {
        self.step as usize * self.height as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_for_frame() {
        let frame = Frame::new(vec![0; 6 * 2 * 3], 6, 2, 1, 0, 42, 1_500);
        let header = ImageHeader::for_frame(3, &frame);

        assert_eq!(header.seq, 3);
        assert_eq!(header.frame_id, 42);
        assert_eq!(header.stamp_ns, 1_500);
        assert_eq!(header.encoding, "bgr8");
        assert_eq!(header.step, 18);
        assert_eq!(header.data_len(), frame.data.len());
    }

    #[test]
    fn test_header_json_fields() {
        let frame = Frame::new(vec![0; 3], 1, 1, 0, 0, 0, 9);
        let json = serde_json::to_value(ImageHeader::for_frame(0, &frame)).unwrap();

        assert_eq!(json["encoding"], "bgr8");
        assert_eq!(json["stamp_ns"], 9);
        assert_eq!(json["width"], 1);

        let parsed: ImageHeader = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, ImageHeader::for_frame(0, &frame));
    }
}

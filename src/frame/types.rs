use std::path::Path;
use std::sync::Arc;

use image::{ImageBuffer, Rgb, RgbImage};

/// Channel layout of every [`Frame`].
pub const ENCODING: &str = "bgr8";
pub const CHANNELS: usize = 3;

/// An owned BGR8 image copied out of the SDK's buffer.
///
/// `width` and `height` include the padding the SDK reported; the picture
/// itself occupies the top-left `width - x_padding` by `height - y_padding`
/// region.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub x_padding: u32,
    pub y_padding: u32,
    pub frame_id: i64,
    pub timestamp: u64,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        x_padding: u32,
        y_padding: u32,
        frame_id: i64,
        timestamp: u64,
    ) -> Self {
        Self {
            data,
            width,
            height,
            x_padding,
            y_padding,
            frame_id,
            timestamp,
        }
    }

    /// Bytes per row.
    pub fn step(&self) -> usize {
        self.width as usize * CHANNELS
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn image_width(&self) -> u32 {
        self.width.saturating_sub(self.x_padding)
    }

    pub fn image_height(&self) -> u32 {
        self.height.saturating_sub(self.y_padding)
    }

    /// BGR triple at `(x, y)`, or `None` outside the buffer.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.step() + x as usize * CHANNELS;
        let bgr = self.data.get(offset..offset + CHANNELS)?;
        Some([bgr[0], bgr[1], bgr[2]])
    }

    /// Converts the picture region, padding excluded, to an RGB image.
    pub fn to_rgb_image(&self) -> RgbImage {
        ImageBuffer::from_fn(self.image_width(), self.image_height(), |x, y| {
            let [b, g, r] = self.pixel(x, y).unwrap_or_default();
            Rgb([r, g, b])
        })
    }

    /// Writes a snapshot; the format follows the file extension.
    pub fn save(&self, path: &Path) -> Result<(), image::ImageError> {
        self.to_rgb_image().save(path)
    }
}

pub type ArcFrame = Arc<Frame>;

#[cfg(test)]
mod tests {
    use super::*;

    fn padded_frame() -> Frame {
        // 2x1 picture plus one padding column and one padding row.
        #[rustfmt::skip]
        let data = vec![
            1, 2, 3,   4, 5, 6,   0, 0, 0,
            0, 0, 0,   0, 0, 0,   0, 0, 0,
        ];
        Frame::new(data, 3, 2, 1, 1, 7, 1_000)
    }

    #[test]
    fn test_dimensions() {
        let frame = padded_frame();
        assert_eq!(frame.step(), 9);
        assert_eq!(frame.image_width(), 2);
        assert_eq!(frame.image_height(), 1);
        assert_eq!(frame.as_bytes().len(), 18);
    }

    #[test]
    fn test_pixel_access() {
        let frame = padded_frame();
        assert_eq!(frame.pixel(0, 0), Some([1, 2, 3]));
        assert_eq!(frame.pixel(1, 0), Some([4, 5, 6]));
        assert_eq!(frame.pixel(3, 0), None);
        assert_eq!(frame.pixel(0, 2), None);
    }

    #[test]
    fn test_rgb_conversion_drops_padding() {
        let image = padded_frame().to_rgb_image();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(0, 0), &Rgb([3, 2, 1]));
        assert_eq!(image.get_pixel(1, 0), &Rgb([6, 5, 4]));
    }

    #[test]
    fn test_save_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.png");
        padded_frame().save(&path).unwrap();

        let loaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded.dimensions(), (2, 1));
        assert_eq!(loaded.get_pixel(1, 0), &Rgb([6, 5, 4]));
    }
}

use log::trace;

use super::types::{Frame, CHANNELS};
use crate::error::CameraError;
use crate::sdk::{ColorProcessing, ConvertedImage, PixelFormat, RawImage};

/// Converts a raw SDK image into an owned BGR8 [`Frame`].
///
/// The SDK converts on its side; this copies the result row by row,
/// honoring the reported stride, into a buffer of
/// `(height + y_padding) * (width + x_padding) * 3` bytes. The copy does not
/// borrow from the SDK, so the raw image can be released right after.
pub fn convert_to_image<I: RawImage>(raw: &I) -> Result<Frame, CameraError> {
    let converted = raw
        .convert(PixelFormat::Bgr8, ColorProcessing::NearestNeighbor)
        .map_err(|e| CameraError::device("convert image to BGR8", e))?;

    let mut frame = copy_converted(&converted)?;
    frame.frame_id = raw.frame_id();
    frame.timestamp = raw.timestamp();
    trace!(
        "Converted frame {} to {}x{} BGR8",
        frame.frame_id,
        frame.width,
        frame.height
    );
    Ok(frame)
}

fn copy_converted<C: ConvertedImage>(converted: &C) -> Result<Frame, CameraError> {
    let cols = converted.width() + converted.x_padding();
    let rows = converted.height() + converted.y_padding();
    let row_bytes = cols * CHANNELS;

    // A zero stride means rows are packed.
    let stride = match converted.stride() {
        0 => row_bytes,
        stride => stride,
    };
    if stride < row_bytes {
        return Err(CameraError::conversion(format!(
            "stride {} is shorter than a {} byte row",
            stride, row_bytes
        )));
    }

    let source = converted.data();
    let required = match rows {
        0 => 0,
        rows => (rows - 1) * stride + row_bytes,
    };
    if source.len() < required {
        return Err(CameraError::conversion(format!(
            "buffer holds {} bytes, {}x{} view with stride {} needs {}",
            source.len(),
            cols,
            rows,
            stride,
            required
        )));
    }

    let mut data = Vec::with_capacity(rows * row_bytes);
    for row in 0..rows {
        let start = row * stride;
        data.extend_from_slice(&source[start..start + row_bytes]);
    }

    let dimension = |value: usize| {
        u32::try_from(value).map_err(|_| CameraError::conversion(format!("dimension {} out of range", value)))
    };

    Ok(Frame::new(
        data,
        dimension(cols)?,
        dimension(rows)?,
        dimension(converted.x_padding())?,
        dimension(converted.y_padding())?,
        0,
        0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::SdkError;
    use std::cell::Cell;

    struct TestConverted {
        width: usize,
        height: usize,
        x_padding: usize,
        y_padding: usize,
        stride: usize,
        data: Vec<u8>,
    }

    impl ConvertedImage for TestConverted {
        fn width(&self) -> usize {
            self.width
        }
        fn height(&self) -> usize {
            self.height
        }
        fn x_padding(&self) -> usize {
            self.x_padding
        }
        fn y_padding(&self) -> usize {
            self.y_padding
        }
        fn stride(&self) -> usize {
            self.stride
        }
        fn data(&self) -> &[u8] {
            &self.data
        }
    }

    struct TestRaw {
        width: usize,
        height: usize,
        x_padding: usize,
        y_padding: usize,
        stride: usize,
        conversions: Cell<usize>,
    }

    impl RawImage for TestRaw {
        type Converted = TestConverted;

        fn frame_id(&self) -> i64 {
            12
        }
        fn timestamp(&self) -> u64 {
            345
        }
        fn is_incomplete(&self) -> bool {
            false
        }
        fn status(&self) -> i32 {
            0
        }
        fn convert(
            &self,
            format: PixelFormat,
            algorithm: ColorProcessing,
        ) -> Result<TestConverted, SdkError> {
            assert_eq!(format, PixelFormat::Bgr8);
            assert_eq!(algorithm, ColorProcessing::NearestNeighbor);
            self.conversions.set(self.conversions.get() + 1);

            let rows = self.height + self.y_padding;
            let data = (0..rows * self.stride).map(|i| (i % 251) as u8).collect();
            Ok(TestConverted {
                width: self.width,
                height: self.height,
                x_padding: self.x_padding,
                y_padding: self.y_padding,
                stride: self.stride,
                data,
            })
        }
        fn release(self) -> Result<(), SdkError> {
            Ok(())
        }
    }

    fn raw(width: usize, height: usize, x_padding: usize, y_padding: usize, stride: usize) -> TestRaw {
        TestRaw {
            width,
            height,
            x_padding,
            y_padding,
            stride,
            conversions: Cell::new(0),
        }
    }

    #[test]
    fn test_owned_buffer_size() {
        for (w, h, xp, yp) in [(4, 3, 0, 0), (5, 2, 3, 1), (1, 1, 0, 4), (640, 480, 16, 2)] {
            let image = raw(w, h, xp, yp, (w + xp) * 3);
            let frame = convert_to_image(&image).unwrap();
            image.release().unwrap();

            assert_eq!(frame.data.len(), (h + yp) * (w + xp) * 3);
            assert_eq!(frame.width as usize, w + xp);
            assert_eq!(frame.height as usize, h + yp);
            assert_eq!(frame.frame_id, 12);
            assert_eq!(frame.timestamp, 345);
        }
    }

    #[test]
    fn test_stride_is_honored() {
        // Rows of 2 pixels (6 bytes) laid out every 8 bytes.
        let image = raw(2, 3, 0, 0, 8);
        let frame = convert_to_image(&image).unwrap();
        assert_eq!(image.conversions.get(), 1);

        let expected: Vec<u8> = [0..6, 8..14, 16..22]
            .into_iter()
            .flatten()
            .map(|i| i as u8)
            .collect();
        assert_eq!(frame.data, expected);
    }

    #[test]
    fn test_zero_stride_means_packed() {
        let converted = TestConverted {
            width: 2,
            height: 2,
            x_padding: 0,
            y_padding: 0,
            stride: 0,
            data: (0..12).collect(),
        };
        let frame = copy_converted(&converted).unwrap();
        assert_eq!(frame.data, (0..12).collect::<Vec<u8>>());
    }

    #[test]
    fn test_short_stride_is_rejected() {
        let image = raw(4, 2, 0, 0, 6);
        assert!(matches!(
            convert_to_image(&image),
            Err(CameraError::Conversion(_))
        ));
    }

    #[test]
    fn test_truncated_buffer_is_rejected() {
        let converted = TestConverted {
            width: 2,
            height: 2,
            x_padding: 0,
            y_padding: 0,
            stride: 6,
            data: vec![0; 11],
        };
        assert!(matches!(
            copy_converted(&converted),
            Err(CameraError::Conversion(_))
        ));
    }
}

mod latest;
mod processor;
mod types;

pub use latest::LatestFrame;
pub use processor::convert_to_image;
pub use types::{ArcFrame, Frame, CHANNELS, ENCODING};

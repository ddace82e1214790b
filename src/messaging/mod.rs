mod timer;
mod types;
mod zmq;

pub use self::timer::PublishTimer;
pub use self::types::ImageHeader;
pub use self::zmq::ZmqImagePublisher;

use crate::error::Result;
use crate::frame::Frame;

/// Destination of published frames.
pub trait FrameSink: Send {
    fn publish(&mut self, frame: &Frame) -> Result<()>;
}

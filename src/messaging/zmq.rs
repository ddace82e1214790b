use log::{debug, info};

use super::types::ImageHeader;
use super::FrameSink;
use crate::error::Result;
use crate::frame::Frame;

/// Publishes frames on a ZMQ PUB socket as `[topic, header json, pixels]`.
pub struct ZmqImagePublisher {
    publisher: zmq::Socket,
    topic: String,
    seq: u64,
}

impl ZmqImagePublisher {
    pub fn new(address: &str, port: u16, topic: &str) -> Result<Self> {
        let context = zmq::Context::new();
        let publisher = context.socket(zmq::PUB)?;
        publisher.set_sndhwm(1)?;
        let endpoint = format!("tcp://{}:{}", address, port);
        publisher.bind(&endpoint)?;
        info!("Publishing {} on {}", topic, endpoint);
        Ok(Self {
            publisher,
            topic: topic.to_string(),
            seq: 0,
        })
    }
}

impl FrameSink for ZmqImagePublisher {
    fn publish(&mut self, frame: &Frame) -> Result<()> {
        let header = serde_json::to_vec(&ImageHeader::for_frame(self.seq, frame))?;
        self.publisher.send_multipart(
            [self.topic.as_bytes(), header.as_slice(), frame.as_bytes()],
            0,
        )?;
        debug!("Published frame {} as message {}", frame.frame_id, self.seq);
        self.seq += 1;
        Ok(())
    }
}

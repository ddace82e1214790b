use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, select, Sender};
use log::{debug, error, trace};

use super::FrameSink;
use crate::frame::LatestFrame;

/// Publishes the latest frame at a fixed rate on its own thread.
///
/// Each tick sends whatever frame is cached at that moment; ticks before the
/// first frame arrives are skipped.
pub struct PublishTimer {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<u64>>,
}

impl PublishTimer {
    pub fn spawn<P>(mut sink: P, latest: LatestFrame, period: Duration) -> Self
    where
        P: FrameSink + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(period);

        let handle = thread::spawn(move || {
            let mut published = 0u64;
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        match latest.load() {
                            Some(frame) => match sink.publish(&frame) {
                                Ok(()) => published += 1,
                                Err(e) => error!("Failed to publish frame {}: {}", frame.frame_id, e),
                            },
                            None => trace!("No frame captured yet, skipping publish"),
                        }
                    }
                }
            }
            debug!("Publish timer stopped after {} message(s)", published);
            published
        });

        Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Stops the timer thread and returns how many frames it published.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        // Dropping the sender disconnects the channel, which ends the loop.
        drop(self.stop.take());
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(published)) => published,
            Some(Err(_)) => {
                error!("Publish timer thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for PublishTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::frame::Frame;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSink {
        frame_ids: Arc<Mutex<Vec<i64>>>,
    }

    impl FrameSink for RecordingSink {
        fn publish(&mut self, frame: &Frame) -> Result<()> {
            self.frame_ids.lock().unwrap().push(frame.frame_id);
            Ok(())
        }
    }

    #[test]
    fn test_nothing_published_before_first_frame() {
        let sink = RecordingSink::default();
        let timer = PublishTimer::spawn(sink.clone(), LatestFrame::new(), Duration::from_millis(2));
        thread::sleep(Duration::from_millis(30));

        assert_eq!(timer.stop(), 0);
        assert!(sink.frame_ids.lock().unwrap().is_empty());
    }

    #[test]
    fn test_publishes_latest_frame() {
        let sink = RecordingSink::default();
        let latest = LatestFrame::new();
        let timer = PublishTimer::spawn(sink.clone(), latest.clone(), Duration::from_millis(2));

        latest.store(Arc::new(Frame::new(vec![0; 3], 1, 1, 0, 0, 8, 0)));
        thread::sleep(Duration::from_millis(50));
        let published = timer.stop();

        let ids = sink.frame_ids.lock().unwrap();
        assert!(published > 0);
        assert_eq!(ids.len() as u64, published);
        assert!(ids.iter().all(|&id| id == 8));
    }

    #[test]
    fn test_drop_stops_thread() {
        let sink = RecordingSink::default();
        let latest = LatestFrame::new();
        latest.store(Arc::new(Frame::new(vec![0; 3], 1, 1, 0, 0, 1, 0)));
        drop(PublishTimer::spawn(sink.clone(), latest, Duration::from_millis(1)));

        let count = sink.frame_ids.lock().unwrap().len();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(sink.frame_ids.lock().unwrap().len(), count);
    }
}

//! The acquisition side of the streaming node: drives a [`CameraSession`]
//! through its whole lifecycle while the publish timer sends whatever frame
//! is cached.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use crate::camera::{CameraSession, CameraSetting, SessionStats};
use crate::config::Config;
use crate::error::{AppError, CameraError, Result};
use crate::sdk::System;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionOptions {
    pub settings: Vec<CameraSetting>,
    pub buffer_count: Option<i64>,
    pub buffer_handling_mode: Option<String>,
    pub max_frames: Option<u64>,
    pub snapshot: Option<PathBuf>,
}

impl AcquisitionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            settings: config.camera.settings.clone(),
            buffer_count: Some(config.stream.buffer_count).filter(|&count| count > 0),
            buffer_handling_mode: config.stream.buffer_handling_mode.clone(),
            max_frames: None,
            snapshot: None,
        }
    }

    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn with_snapshot(mut self, snapshot: Option<PathBuf>) -> Self {
        self.snapshot = snapshot;
        self
    }
}

/// Installs a Ctrl+C handler and returns the flag it clears.
pub fn setup_shutdown_handler() -> std::result::Result<Arc<AtomicBool>, ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })?;
    Ok(running)
}

/// Runs load, init, settings, acquisition and shutdown in order.
///
/// The grab loop runs while `running` is set and the frame limit, if any,
/// is not reached. Frame-level errors are logged and skipped; anything else
/// stops the loop. Acquisition is ended and the device released exactly once
/// whenever the loop was started.
pub fn run_acquisition<S: System>(
    session: &mut CameraSession<S>,
    options: &AcquisitionOptions,
    running: &AtomicBool,
) -> Result<SessionStats> {
    session.load_devices()?;
    session.init()?;
    session.apply_settings(&options.settings)?;
    if let Some(count) = options.buffer_count {
        session.set_buffer_size(count)?;
    }
    if let Some(mode) = &options.buffer_handling_mode {
        session.set_buffer_handling_mode(mode)?;
    }
    session.begin_acquisition()?;

    let grabbed = grab_loop(session, options.max_frames, running);

    let snapshot = match (&options.snapshot, session.last_image()) {
        (Some(path), Some(frame)) => {
            info!("Saving frame {} to {}", frame.frame_id, path.display());
            frame.save(path).map_err(AppError::from)
        }
        (Some(_), None) => {
            warn!("No frame captured, snapshot skipped");
            Ok(())
        }
        (None, _) => Ok(()),
    };

    let ended = session.end_acquisition();
    let released = session.deinit();

    grabbed?;
    ended?;
    released?;
    snapshot?;

    let stats = session.stats();
    info!(
        "Acquisition finished: {} grabbed, {} skipped, {} incomplete, {} timeouts",
        stats.grabbed, stats.skipped, stats.incomplete, stats.timeouts
    );
    Ok(stats)
}

fn grab_loop<S: System>(
    session: &mut CameraSession<S>,
    max_frames: Option<u64>,
    running: &AtomicBool,
) -> std::result::Result<(), CameraError> {
    info!("Entering main acquisition loop");
    while running.load(Ordering::SeqCst) {
        if max_frames.map_or(false, |max| session.stats().grabbed >= max) {
            info!("Frame limit reached");
            break;
        }
        match session.grab_frame() {
            Ok(_) => {}
            Err(e) if e.is_frame_error() => warn!("Skipping frame: {}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SessionState;
    use crate::frame::Frame;
    use crate::messaging::{FrameSink, PublishTimer};
    use crate::sdk::sim::{SimConfig, SimEvent, SimFrame, SimSystem};
    use std::sync::Mutex;
    use std::time::Duration;

    fn sim_config() -> SimConfig {
        SimConfig {
            width: 8,
            height: 6,
            realtime: false,
            ..SimConfig::default()
        }
    }

    fn options(max_frames: u64) -> AcquisitionOptions {
        AcquisitionOptions::from_config(&Config::default()).with_max_frames(Some(max_frames))
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.stream.buffer_count = 0;
        config.stream.buffer_handling_mode = Some("NewestOnly".to_string());

        let options = AcquisitionOptions::from_config(&config);
        assert_eq!(options.buffer_count, None);
        assert_eq!(options.buffer_handling_mode.as_deref(), Some("NewestOnly"));
        assert_eq!(options.settings, config.camera.settings);
        assert_eq!(AcquisitionOptions::from_config(&Config::default()).buffer_count, Some(1));
    }

    #[test]
    fn test_run_until_frame_limit() {
        let system = SimSystem::new(sim_config());
        let probe = system.probe();
        let mut session = CameraSession::new(system);
        let running = AtomicBool::new(true);

        let stats = run_acquisition(&mut session, &options(5), &running).unwrap();

        assert_eq!(stats.grabbed, 5);
        assert_eq!(session.state(), SessionState::Released);
        assert_eq!(probe.writes("AcquisitionMode"), vec!["0"]);
        assert_eq!(probe.writes("StreamDefaultBufferCount"), vec!["1"]);

        let events = probe.events();
        let count = |wanted: &SimEvent| events.iter().filter(|e| *e == wanted).count();
        assert_eq!(count(&SimEvent::AcquisitionStopped), 1);
        assert_eq!(count(&SimEvent::DeviceDeinit(0)), 1);
        assert_eq!(count(&SimEvent::SystemReleased), 1);
        let stopped = events.iter().position(|e| *e == SimEvent::AcquisitionStopped);
        let deinit = events.iter().position(|e| *e == SimEvent::DeviceDeinit(0));
        assert!(stopped < deinit);
    }

    #[test]
    fn test_frame_errors_do_not_stop_the_loop() {
        let system = SimSystem::new(sim_config()).with_script([
            SimFrame::Complete { frame_id: 0 },
            SimFrame::Incomplete { status: 4 },
            SimFrame::Timeout,
            SimFrame::Complete { frame_id: 3 },
        ]);
        let mut session = CameraSession::new(system);
        let running = AtomicBool::new(true);

        let stats = run_acquisition(&mut session, &options(2), &running).unwrap();
        assert_eq!(stats.grabbed, 2);
        assert_eq!(stats.incomplete, 1);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.skipped, 2);
    }

    #[test]
    fn test_shutdown_flag_stops_immediately() {
        let system = SimSystem::new(sim_config());
        let probe = system.probe();
        let mut session = CameraSession::new(system);
        let running = AtomicBool::new(false);

        let stats = run_acquisition(&mut session, &AcquisitionOptions::default(), &running).unwrap();
        assert_eq!(stats.grabbed, 0);
        assert!(probe.contains(&SimEvent::AcquisitionStopped));
        assert!(probe.contains(&SimEvent::SystemReleased));
    }

    #[test]
    fn test_no_device_found() {
        let system = SimSystem::new(SimConfig {
            device_count: 0,
            ..sim_config()
        });
        let mut session = CameraSession::new(system);
        let running = AtomicBool::new(true);

        assert!(matches!(
            run_acquisition(&mut session, &options(1), &running),
            Err(AppError::Camera(CameraError::NoDeviceFound))
        ));
    }

    #[test]
    fn test_bad_setting_aborts_before_acquisition() {
        let system = SimSystem::new(sim_config());
        let probe = system.probe();
        let mut session = CameraSession::new(system);
        let running = AtomicBool::new(true);
        let options = AcquisitionOptions {
            settings: vec![CameraSetting::enumeration("AcquisitionMode", "Burst")],
            ..options(1)
        };

        assert!(matches!(
            run_acquisition(&mut session, &options, &running),
            Err(AppError::Camera(CameraError::Configuration { .. }))
        ));
        assert!(!probe.contains(&SimEvent::AcquisitionStarted));

        drop(session);
        assert!(probe.contains(&SimEvent::SystemReleased));
    }

    #[test]
    fn test_snapshot_of_last_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last.png");
        let mut session = CameraSession::new(SimSystem::new(sim_config()));
        let running = AtomicBool::new(true);

        run_acquisition(
            &mut session,
            &options(3).with_snapshot(Some(path.clone())),
            &running,
        )
        .unwrap();

        let saved = image::open(&path).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (8, 6));
    }

    #[derive(Clone, Default)]
    struct CollectingSink {
        frames: Arc<Mutex<Vec<Frame>>>,
    }

    impl FrameSink for CollectingSink {
        fn publish(&mut self, frame: &Frame) -> Result<()> {
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }
    }

    #[test]
    fn test_publisher_sees_grabbed_frames() {
        let mut session = CameraSession::new(SimSystem::new(SimConfig {
            realtime: true,
            ..sim_config()
        }));
        let sink = CollectingSink::default();
        let timer = PublishTimer::spawn(sink.clone(), session.latest(), Duration::from_millis(5));
        let running = AtomicBool::new(true);

        // 30 fps pacing keeps the loop running for roughly half a second.
        run_acquisition(&mut session, &options(15), &running).unwrap();
        let published = timer.stop();

        let frames = sink.frames.lock().unwrap();
        assert!(published > 0);
        assert_eq!(frames.len() as u64, published);
        assert!(frames.iter().all(|f| f.data.len() == 8 * 6 * 3));
        assert!(frames.windows(2).all(|w| w[0].frame_id <= w[1].frame_id));
    }
}

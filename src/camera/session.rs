use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use super::sequence::{SequenceEvent, SequenceTracker};
use super::settings::{self, CameraSetting, SettingValue};
use crate::error::CameraError;
use crate::frame::{convert_to_image, ArcFrame, LatestFrame};
use crate::sdk::{Device, NodeMap, RawImage, SdkError, System};

/// Default wait for the next image.
pub const GET_NEXT_IMAGE_TIMEOUT: Duration = Duration::from_millis(2000);

const DEVICE_INFORMATION: &str = "DeviceInformation";
const STREAM_BUFFER_COUNT: &str = "StreamDefaultBufferCount";
const STREAM_BUFFER_HANDLING_MODE: &str = "StreamBufferHandlingMode";

/// Lifecycle of a [`CameraSession`]. It only moves forward, except for
/// `Acquiring` which returns to `Initialized` when acquisition ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Loaded,
    Bound,
    Initialized,
    Acquiring,
    Released,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Loaded => "loaded",
            SessionState::Bound => "bound",
            SessionState::Initialized => "initialized",
            SessionState::Acquiring => "acquiring",
            SessionState::Released => "released",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub grabbed: u64,
    pub skipped: u64,
    pub incomplete: u64,
    pub timeouts: u64,
}

/// Exclusive owner of one SDK instance and the first camera it enumerates.
///
/// Single pass: `load_devices`, `init`, settings, `begin_acquisition`,
/// any number of `grab_frame`, `end_acquisition`, `deinit`.
pub struct CameraSession<S: System> {
    system: Option<S>,
    cameras: Vec<S::Device>,
    device: Option<S::Device>,
    state: SessionState,
    sequence: SequenceTracker,
    latest: LatestFrame,
    stats: SessionStats,
    timeout: Option<Duration>,
}

impl<S: System> CameraSession<S> {
    pub fn new(system: S) -> Self {
        Self {
            system: Some(system),
            cameras: Vec::new(),
            device: None,
            state: SessionState::Created,
            sequence: SequenceTracker::new(),
            latest: LatestFrame::new(),
            stats: SessionStats::default(),
            timeout: Some(GET_NEXT_IMAGE_TIMEOUT),
        }
    }

    /// Sets the wait for the next image; `None` blocks until one arrives.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn sequence(&self) -> &SequenceTracker {
        &self.sequence
    }

    /// Handle to the shared slot holding the last grabbed frame.
    pub fn latest(&self) -> LatestFrame {
        self.latest.clone()
    }

    pub fn last_image(&self) -> Option<ArcFrame> {
        self.latest.load()
    }

    pub fn system(&self) -> Option<&S> {
        self.system.as_ref()
    }

    pub fn device(&self) -> Option<&S::Device> {
        self.device.as_ref()
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), CameraError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CameraError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn bound_device(&mut self, operation: &'static str) -> Result<&mut S::Device, CameraError> {
        let state = self.state;
        self.device
            .as_mut()
            .ok_or(CameraError::InvalidState { operation, state })
    }

    /// Enumerates cameras. With none attached the SDK is released right away
    /// and [`CameraError::NoDeviceFound`] is returned.
    pub fn load_devices(&mut self) -> Result<usize, CameraError> {
        self.expect_state("load devices", &[SessionState::Created])?;
        let state = self.state;
        let system = self.system.as_mut().ok_or(CameraError::InvalidState {
            operation: "load devices",
            state,
        })?;

        let cameras = system
            .cameras()
            .map_err(|e| CameraError::device("enumerate cameras", e))?;
        info!("Number of cameras detected: {}", cameras.len());

        if cameras.is_empty() {
            drop(cameras);
            self.state = SessionState::Released;
            if let Some(mut system) = self.system.take() {
                system
                    .release()
                    .map_err(|e| CameraError::device("release system", e))?;
            }
            warn!("No cameras detected!");
            return Err(CameraError::NoDeviceFound);
        }

        let count = cameras.len();
        self.cameras = cameras;
        self.state = SessionState::Loaded;
        Ok(count)
    }

    /// Binds the first enumerated camera and initializes it.
    ///
    /// On failure the camera stays bound so that [`CameraSession::deinit`]
    /// can still release it.
    pub fn init(&mut self) -> Result<(), CameraError> {
        self.expect_state("initialize camera", &[SessionState::Loaded])?;
        info!("Binding camera 0 of {}", self.cameras.len());

        let mut device = self.cameras.remove(0);
        log_device_info(device.tl_device_node_map());

        let result = device.init();
        self.device = Some(device);
        self.state = SessionState::Bound;

        match result {
            Ok(()) => {
                self.state = SessionState::Initialized;
                info!("Camera initialized");
                Ok(())
            }
            Err(e) => {
                error!("Error initializing camera: {}", e);
                Err(CameraError::device("initialize camera", e))
            }
        }
    }

    /// Deinitializes the camera, drops every camera handle and releases the
    /// SDK. Also valid right after `load_devices`, before any camera is
    /// bound. All steps are attempted; the first failure is returned.
    pub fn deinit(&mut self) -> Result<(), CameraError> {
        self.expect_state(
            "deinitialize camera",
            &[
                SessionState::Loaded,
                SessionState::Bound,
                SessionState::Initialized,
            ],
        )?;
        info!("Running deinit()");

        let mut outcome = Ok(());
        if let Some(mut device) = self.device.take() {
            if device.is_initialized() {
                if let Err(e) = device.deinit() {
                    error!("Error deinitializing camera: {}", e);
                    outcome = Err(CameraError::device("deinitialize camera", e));
                }
            }
        }
        self.cameras.clear();

        if let Some(mut system) = self.system.take() {
            if let Err(e) = system.release() {
                error!("Error releasing system: {}", e);
                if outcome.is_ok() {
                    outcome = Err(CameraError::device("release system", e));
                }
            }
        }

        self.state = SessionState::Released;
        outcome
    }

    pub fn begin_acquisition(&mut self) -> Result<(), CameraError> {
        self.expect_state("begin acquisition", &[SessionState::Initialized])?;
        info!("Begin Acquisition...");
        self.bound_device("begin acquisition")?
            .begin_acquisition()
            .map_err(|e| CameraError::device("begin acquisition", e))?;
        self.state = SessionState::Acquiring;
        Ok(())
    }

    pub fn end_acquisition(&mut self) -> Result<(), CameraError> {
        self.expect_state("end acquisition", &[SessionState::Acquiring])?;
        info!("End Acquisition...");
        self.state = SessionState::Initialized;
        self.bound_device("end acquisition")?
            .end_acquisition()
            .map_err(|e| CameraError::device("end acquisition", e))
    }

    fn configurable_device(&mut self, operation: &'static str) -> Result<&mut S::Device, CameraError> {
        self.expect_state(
            operation,
            &[SessionState::Initialized, SessionState::Acquiring],
        )?;
        self.bound_device(operation)
    }

    pub fn set_enum_value(&mut self, setting: &str, value: &str) -> Result<(), CameraError> {
        let map = self.configurable_device("set enum value")?.node_map();
        settings::write_enum(map, setting, value)
            .map_err(|reason| configuration_failed(setting, value, reason))?;
        debug!("{} set to {}", setting, value);
        Ok(())
    }

    pub fn set_int_value(&mut self, setting: &str, value: i64) -> Result<(), CameraError> {
        let map = self.configurable_device("set int value")?.node_map();
        settings::write_int(map, setting, value)
            .map_err(|reason| configuration_failed(setting, value, reason))?;
        debug!("{} set to {}", setting, value);
        Ok(())
    }

    pub fn set_float_value(&mut self, setting: &str, value: f64) -> Result<(), CameraError> {
        let map = self.configurable_device("set float value")?.node_map();
        settings::write_float(map, setting, value)
            .map_err(|reason| configuration_failed(setting, value, reason))?;
        debug!("{} set to {}", setting, value);
        Ok(())
    }

    pub fn set_bool_value(&mut self, setting: &str, value: bool) -> Result<(), CameraError> {
        let map = self.configurable_device("set bool value")?.node_map();
        settings::write_bool(map, setting, value)
            .map_err(|reason| configuration_failed(setting, settings::bool_string(value), reason))?;
        debug!("{} set to {}", setting, value);
        Ok(())
    }

    pub fn apply_setting(&mut self, setting: &CameraSetting) -> Result<(), CameraError> {
        match &setting.value {
            SettingValue::Enum(value) => self.set_enum_value(&setting.name, value),
            SettingValue::Int(value) => self.set_int_value(&setting.name, *value),
            SettingValue::Float(value) => self.set_float_value(&setting.name, *value),
            SettingValue::Bool(value) => self.set_bool_value(&setting.name, *value),
        }
    }

    /// Applies settings in order, stopping at the first one refused.
    pub fn apply_settings(&mut self, settings: &[CameraSetting]) -> Result<(), CameraError> {
        for setting in settings {
            self.apply_setting(setting)?;
        }
        Ok(())
    }

    /// Sets how many buffers the stream layer keeps in flight.
    pub fn set_buffer_size(&mut self, count: i64) -> Result<(), CameraError> {
        let map = self
            .configurable_device("set buffer size")?
            .tl_stream_node_map();
        settings::write_int(map, STREAM_BUFFER_COUNT, count)
            .map_err(|reason| configuration_failed(STREAM_BUFFER_COUNT, count, reason))?;
        debug!("Set stream buffer count to {}", count);
        Ok(())
    }

    /// Selects which buffered frame the stream layer hands out next.
    pub fn set_buffer_handling_mode(&mut self, mode: &str) -> Result<(), CameraError> {
        let map = self
            .configurable_device("set buffer handling mode")?
            .tl_stream_node_map();
        settings::write_enum(map, STREAM_BUFFER_HANDLING_MODE, mode)
            .map_err(|reason| configuration_failed(STREAM_BUFFER_HANDLING_MODE, mode, reason))?;
        debug!("Set stream buffer handling mode to {}", mode);
        Ok(())
    }

    /// Waits for the next frame, converts it to BGR8 and caches it as the
    /// latest frame.
    ///
    /// Incomplete frames are released without conversion. A stream whose
    /// first frame is not 0 still yields the frame through
    /// [`CameraSession::last_image`] but reports
    /// [`CameraError::SequenceAssertion`].
    pub fn grab_frame(&mut self) -> Result<ArcFrame, CameraError> {
        self.expect_state("grab frame", &[SessionState::Acquiring])?;
        let timeout = self.timeout;
        let next = self.bound_device("grab frame")?.next_image(timeout);
        let image = match next {
            Ok(image) => image,
            Err(SdkError::Timeout(waited)) => {
                self.stats.timeouts += 1;
                return Err(CameraError::Timeout(waited));
            }
            Err(e) => return Err(CameraError::device("retrieve next image", e)),
        };

        if image.is_incomplete() {
            let status = image.status();
            warn!("Image incomplete with image status {}", status);
            self.stats.incomplete += 1;
            image
                .release()
                .map_err(|e| CameraError::device("release image", e))?;
            return Err(CameraError::FrameIncomplete { status });
        }

        let observed = self.sequence.observe(image.frame_id(), image.timestamp());
        let converted = convert_to_image(&image);
        image
            .release()
            .map_err(|e| CameraError::device("release image", e))?;

        let frame = Arc::new(converted?);
        self.stats.grabbed += 1;
        self.latest.store(Arc::clone(&frame));
        debug!(
            "Grabbed frame {} with timestamp {}",
            frame.frame_id, frame.timestamp
        );

        match observed? {
            SequenceEvent::Skipped { missing } => {
                self.stats.skipped = self.stats.skipped.saturating_add(missing)
            }
            SequenceEvent::First | SequenceEvent::Contiguous => {}
        }
        Ok(frame)
    }
}

impl<S: System> Drop for CameraSession<S> {
    fn drop(&mut self) {
        if self.state == SessionState::Acquiring {
            if let Err(e) = self.end_acquisition() {
                error!("Failed to end acquisition on session drop: {}", e);
            }
        }
        if matches!(
            self.state,
            SessionState::Loaded | SessionState::Bound | SessionState::Initialized
        ) {
            if let Err(e) = self.deinit() {
                error!("Failed to deinitialize camera on session drop: {}", e);
            }
        }
    }
}

fn configuration_failed(
    setting: &str,
    value: impl ToString,
    reason: crate::error::ConfigFailure,
) -> CameraError {
    let err = CameraError::configuration(setting, value, reason);
    error!("{}", err);
    err
}

/// Logs the `DeviceInformation` category of the transport layer tree.
/// Best effort: failures are logged and otherwise ignored.
fn log_device_info<M: NodeMap>(map: &M) -> Vec<(String, String)> {
    info!("*** DEVICE INFORMATION ***");

    let readable = map
        .node(DEVICE_INFORMATION)
        .map_or(false, |node| node.access.is_readable());
    if !readable {
        info!("Device control information not available.");
        return Vec::new();
    }

    let features = match map.category_features(DEVICE_INFORMATION) {
        Ok(features) => features,
        Err(e) => {
            error!("Error reading device information: {}", e);
            return Vec::new();
        }
    };

    features
        .into_iter()
        .map(|feature| {
            let readable = map
                .node(&feature)
                .map_or(false, |node| node.access.is_readable());
            let value = if readable {
                map.value_to_string(&feature)
                    .unwrap_or_else(|e| format!("Error: {}", e))
            } else {
                "Node not readable".to_string()
            };
            info!("{} : {}", feature, value);
            (feature, value)
        })
        .collect()
}

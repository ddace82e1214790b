//! Simulated camera backend.
//!
//! Implements the SDK traits with an in-process GenICam style device: node
//! trees named after the SFNC features a machine-vision camera exposes, a
//! frame source that can be paced in real time or driven from a script, and
//! a shared [`SimProbe`] that records what the session did to the device.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{
    AccessMode, ColorProcessing, ConvertedImage, Device, EnumEntry, NodeInfo, NodeKind, NodeMap,
    PixelFormat, RawImage, SdkError, System,
};

/// Image status reported for frames with missing packets.
pub const STATUS_DATA_INCOMPLETE: i32 = 4;

const DEFAULT_FRAME_RATE: f64 = 30.0;
const MIN_FRAME_RATE: f64 = 1.0;
const MAX_CONSECUTIVE_DROPS: u32 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub device_count: usize,
    pub vendor: String,
    pub model: String,
    pub serial: String,
    pub width: u32,
    pub height: u32,
    pub x_padding: u32,
    pub y_padding: u32,
    pub pixel_format: String,
    pub drop_probability: f64,
    pub incomplete_probability: f64,
    pub realtime: bool,
    pub fail_init: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            device_count: 1,
            vendor: String::from("FLIR"),
            model: String::from("Blackfly S BFS-U3-16S2C"),
            serial: String::from("20123456"),
            width: 640,
            height: 480,
            x_padding: 0,
            y_padding: 0,
            pixel_format: String::from("Mono8"),
            drop_probability: 0.0,
            incomplete_probability: 0.0,
            realtime: true,
            fail_init: false,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err("Simulated sensor size must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.drop_probability) {
            return Err("Drop probability must be within [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.incomplete_probability) {
            return Err("Incomplete probability must be within [0, 1]".to_string());
        }
        if PixelFormat::from_name(&self.pixel_format).is_none() {
            return Err(format!("Unsupported pixel format {}", self.pixel_format));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    CamerasEnumerated(usize),
    DeviceInit(usize),
    DeviceDeinit(usize),
    AcquisitionStarted,
    AcquisitionStopped,
    NodeWrite {
        map: &'static str,
        node: String,
        value: String,
    },
    ImageReleased(i64),
    SystemReleased,
}

/// Shared log of everything done to the simulated SDK.
#[derive(Debug, Clone, Default)]
pub struct SimProbe {
    events: Arc<Mutex<Vec<SimEvent>>>,
}

impl SimProbe {
    fn record(&self, event: SimEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, event: &SimEvent) -> bool {
        self.events().contains(event)
    }

    /// Serialized values written to `node`, oldest first.
    pub fn writes(&self, node: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SimEvent::NodeWrite { node: name, value, .. } if name == node => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn released_images(&self) -> Vec<i64> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SimEvent::ImageReleased(frame_id) => Some(frame_id),
                _ => None,
            })
            .collect()
    }
}

/// One scripted outcome of `next_image`.
#[derive(Debug, Clone, PartialEq)]
pub enum SimFrame {
    Complete { frame_id: i64 },
    Incomplete { status: i32 },
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimTree {
    Device,
    TlDevice,
    TlStream,
}

#[derive(Debug, Clone)]
enum SimValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Enum { current: i64, entries: Vec<EnumEntry> },
    Category(Vec<String>),
}

impl SimValue {
    fn kind(&self) -> NodeKind {
        match self {
            SimValue::Int(_) => NodeKind::Integer,
            SimValue::Float(_) => NodeKind::Float,
            SimValue::Bool(_) => NodeKind::Boolean,
            SimValue::Str(_) => NodeKind::String,
            SimValue::Enum { .. } => NodeKind::Enumeration,
            SimValue::Category(_) => NodeKind::Category,
        }
    }
}

#[derive(Debug, Clone)]
struct SimNode {
    access: AccessMode,
    value: SimValue,
}

fn invalid(node: &str, value: impl ToString) -> SdkError {
    SdkError::InvalidValue {
        node: node.to_string(),
        value: value.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct SimNodeMap {
    label: &'static str,
    nodes: BTreeMap<String, SimNode>,
    probe: SimProbe,
}

impl SimNodeMap {
    pub fn new(label: &'static str, probe: SimProbe) -> Self {
        Self {
            label,
            nodes: BTreeMap::new(),
            probe,
        }
    }

    fn insert(mut self, name: &str, access: AccessMode, value: SimValue) -> Self {
        self.nodes.insert(name.to_string(), SimNode { access, value });
        self
    }

    pub fn with_int(self, name: &str, access: AccessMode, value: i64) -> Self {
        self.insert(name, access, SimValue::Int(value))
    }

    pub fn with_float(self, name: &str, access: AccessMode, value: f64) -> Self {
        self.insert(name, access, SimValue::Float(value))
    }

    pub fn with_bool(self, name: &str, access: AccessMode, value: bool) -> Self {
        self.insert(name, access, SimValue::Bool(value))
    }

    pub fn with_string(self, name: &str, access: AccessMode, value: &str) -> Self {
        self.insert(name, access, SimValue::Str(value.to_string()))
    }

    /// Adds an enumeration whose current entry is `current`.
    pub fn with_enum(
        self,
        name: &str,
        access: AccessMode,
        current: &str,
        entries: &[(&str, i64, AccessMode)],
    ) -> Self {
        let entries: Vec<EnumEntry> = entries
            .iter()
            .map(|&(entry, value, access)| EnumEntry {
                name: entry.to_string(),
                value,
                access,
            })
            .collect();
        let current = entries
            .iter()
            .find(|entry| entry.name == current)
            .or_else(|| entries.first())
            .map(|entry| entry.value)
            .unwrap_or_default();
        self.insert(name, access, SimValue::Enum { current, entries })
    }

    pub fn with_category(self, name: &str, features: &[&str]) -> Self {
        let features = features.iter().map(|f| f.to_string()).collect();
        self.insert(name, AccessMode::ReadOnly, SimValue::Category(features))
    }

    pub fn set_access(&mut self, name: &str, access: AccessMode) {
        match self.nodes.get_mut(name) {
            Some(node) => node.access = access,
            None => debug!("No node {} in {} tree to override", name, self.label),
        }
    }

    fn readable(&self, name: &str) -> Result<&SimNode, SdkError> {
        let node = self
            .nodes
            .get(name)
            .ok_or_else(|| SdkError::NodeNotFound(name.to_string()))?;
        if !node.access.is_readable() {
            return Err(SdkError::AccessDenied(name.to_string()));
        }
        Ok(node)
    }

    fn writable(&mut self, name: &str) -> Result<&mut SimNode, SdkError> {
        let node = self
            .nodes
            .get_mut(name)
            .ok_or_else(|| SdkError::NodeNotFound(name.to_string()))?;
        if !node.access.is_writable() {
            return Err(SdkError::AccessDenied(name.to_string()));
        }
        Ok(node)
    }

    fn record_write(&self, name: &str, value: String) {
        self.probe.record(SimEvent::NodeWrite {
            map: self.label,
            node: name.to_string(),
            value,
        });
    }

    pub fn float_value(&self, name: &str) -> Result<f64, SdkError> {
        match &self.readable(name)?.value {
            SimValue::Float(value) => Ok(*value),
            SimValue::Int(value) => Ok(*value as f64),
            _ => Err(invalid(name, "not a float node")),
        }
    }

    pub fn bool_value(&self, name: &str) -> Result<bool, SdkError> {
        match &self.readable(name)?.value {
            SimValue::Bool(value) => Ok(*value),
            _ => Err(invalid(name, "not a boolean node")),
        }
    }

    /// Name of the current entry of an enumeration node.
    pub fn enum_name(&self, name: &str) -> Result<String, SdkError> {
        match &self.readable(name)?.value {
            SimValue::Enum { current, entries } => entries
                .iter()
                .find(|entry| entry.value == *current)
                .map(|entry| entry.name.clone())
                .ok_or_else(|| invalid(name, current)),
            _ => Err(invalid(name, "not an enumeration node")),
        }
    }
}

impl NodeMap for SimNodeMap {
    fn node(&self, name: &str) -> Option<NodeInfo> {
        self.nodes.get(name).map(|node| NodeInfo {
            kind: node.value.kind(),
            access: node.access,
        })
    }

    fn enum_entry(&self, node: &str, entry: &str) -> Option<EnumEntry> {
        match &self.nodes.get(node)?.value {
            SimValue::Enum { entries, .. } => entries.iter().find(|e| e.name == entry).cloned(),
            _ => None,
        }
    }

    fn int_value(&self, name: &str) -> Result<i64, SdkError> {
        match &self.readable(name)?.value {
            SimValue::Int(value) => Ok(*value),
            SimValue::Enum { current, .. } => Ok(*current),
            _ => Err(invalid(name, "not an integer node")),
        }
    }

    fn value_to_string(&self, name: &str) -> Result<String, SdkError> {
        match &self.readable(name)?.value {
            SimValue::Int(value) => Ok(value.to_string()),
            SimValue::Float(value) => Ok(value.to_string()),
            SimValue::Bool(true) => Ok("True".to_string()),
            SimValue::Bool(false) => Ok("False".to_string()),
            SimValue::Str(value) => Ok(value.clone()),
            SimValue::Enum { .. } => self.enum_name(name),
            SimValue::Category(_) => Err(invalid(name, "category has no value")),
        }
    }

    fn category_features(&self, name: &str) -> Result<Vec<String>, SdkError> {
        match &self.readable(name)?.value {
            SimValue::Category(features) => Ok(features.clone()),
            _ => Err(invalid(name, "not a category node")),
        }
    }

    fn set_int_value(&mut self, name: &str, value: i64) -> Result<(), SdkError> {
        match &mut self.writable(name)?.value {
            SimValue::Int(current) => *current = value,
            _ => return Err(invalid(name, value)),
        }
        self.record_write(name, value.to_string());
        Ok(())
    }

    fn set_float_value(&mut self, name: &str, value: f64) -> Result<(), SdkError> {
        match &mut self.writable(name)?.value {
            SimValue::Float(current) => *current = value,
            _ => return Err(invalid(name, value)),
        }
        self.record_write(name, value.to_string());
        Ok(())
    }

    fn set_enum_int_value(&mut self, name: &str, value: i64) -> Result<(), SdkError> {
        match &mut self.writable(name)?.value {
            SimValue::Enum { current, entries } => {
                if !entries
                    .iter()
                    .any(|entry| entry.value == value && entry.access.is_available())
                {
                    return Err(invalid(name, value));
                }
                *current = value;
            }
            _ => return Err(invalid(name, value)),
        }
        self.record_write(name, value.to_string());
        Ok(())
    }

    fn from_string(&mut self, name: &str, value: &str) -> Result<(), SdkError> {
        match &mut self.writable(name)?.value {
            SimValue::Bool(current) => {
                *current = match value {
                    "True" | "1" => true,
                    "False" | "0" => false,
                    _ => return Err(invalid(name, value)),
                }
            }
            SimValue::Str(current) => *current = value.to_string(),
            SimValue::Int(current) => *current = value.parse().map_err(|_| invalid(name, value))?,
            SimValue::Float(current) => {
                *current = value.parse().map_err(|_| invalid(name, value))?
            }
            SimValue::Enum { current, entries } => {
                *current = entries
                    .iter()
                    .find(|entry| entry.name == value && entry.access.is_available())
                    .map(|entry| entry.value)
                    .ok_or_else(|| invalid(name, value))?
            }
            SimValue::Category(_) => return Err(invalid(name, value)),
        }
        self.record_write(name, value.to_string());
        Ok(())
    }
}

fn device_node_map(config: &SimConfig, probe: SimProbe) -> SimNodeMap {
    use AccessMode::{NotAvailable, ReadOnly, ReadWrite};

    let auto_entries = [
        ("Off", 0, ReadWrite),
        ("Once", 1, ReadWrite),
        ("Continuous", 2, ReadWrite),
    ];

    SimNodeMap::new("device", probe)
        .with_enum(
            "AcquisitionMode",
            ReadWrite,
            "Continuous",
            &[
                ("Continuous", 0, ReadWrite),
                ("SingleFrame", 1, ReadWrite),
                ("MultiFrame", 2, ReadWrite),
            ],
        )
        .with_enum("ExposureAuto", ReadWrite, "Continuous", &auto_entries)
        .with_float("ExposureTime", ReadWrite, 10_000.0)
        .with_enum("GainAuto", ReadWrite, "Continuous", &auto_entries)
        .with_float("Gain", ReadWrite, 0.0)
        .with_bool("AcquisitionFrameRateEnable", ReadWrite, false)
        .with_float("AcquisitionFrameRate", ReadWrite, DEFAULT_FRAME_RATE)
        .with_int("Width", ReadWrite, i64::from(config.width))
        .with_int("Height", ReadWrite, i64::from(config.height))
        .with_enum(
            "PixelFormat",
            ReadWrite,
            &config.pixel_format,
            &[
                ("Mono8", 0x0108_0001, ReadWrite),
                ("RGB8", 0x0218_0014, ReadWrite),
                ("BGR8", 0x0218_0015, ReadWrite),
                ("BayerRG8", 0x0108_0009, NotAvailable),
            ],
        )
        .with_bool("ReverseX", ReadWrite, false)
        .with_float("DeviceTemperature", ReadOnly, 41.5)
}

fn tl_device_node_map(config: &SimConfig, index: usize, probe: SimProbe) -> SimNodeMap {
    use AccessMode::{NotAvailable, ReadOnly};

    let serial = match index {
        0 => config.serial.clone(),
        n => format!("{}-{}", config.serial, n),
    };

    SimNodeMap::new("tl_device", probe)
        .with_category(
            "DeviceInformation",
            &[
                "DeviceVendorName",
                "DeviceModelName",
                "DeviceSerialNumber",
                "DeviceVersion",
                "DeviceUserID",
            ],
        )
        .with_string("DeviceVendorName", ReadOnly, &config.vendor)
        .with_string("DeviceModelName", ReadOnly, &config.model)
        .with_string("DeviceSerialNumber", ReadOnly, &serial)
        .with_string("DeviceVersion", ReadOnly, "1707.1.5.0")
        .with_string("DeviceUserID", NotAvailable, "")
}

fn tl_stream_node_map(probe: SimProbe) -> SimNodeMap {
    use AccessMode::ReadWrite;

    SimNodeMap::new("tl_stream", probe)
        .with_int("StreamDefaultBufferCount", ReadWrite, 10)
        .with_enum(
            "StreamBufferHandlingMode",
            ReadWrite,
            "OldestFirst",
            &[
                ("OldestFirst", 0, ReadWrite),
                ("OldestFirstOverwrite", 1, ReadWrite),
                ("NewestFirst", 2, ReadWrite),
                ("NewestOnly", 3, ReadWrite),
            ],
        )
}

#[derive(Debug)]
struct HandleGuard(Arc<AtomicUsize>);

impl HandleGuard {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(live))
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SimConverted {
    width: usize,
    height: usize,
    x_padding: usize,
    y_padding: usize,
    data: Vec<u8>,
}

impl ConvertedImage for SimConverted {
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
        (self.width + self.x_padding) * 3
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

pub struct SimImage {
    frame_id: i64,
    timestamp: u64,
    status: Option<i32>,
    width: usize,
    height: usize,
    x_padding: usize,
    y_padding: usize,
    format: PixelFormat,
    pixels: Vec<u8>,
    probe: SimProbe,
}

impl RawImage for SimImage {
    type Converted = SimConverted;

    fn frame_id(&self) -> i64 {
        self.frame_id
    }

    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn is_incomplete(&self) -> bool {
        self.status.is_some()
    }

    fn status(&self) -> i32 {
        self.status.unwrap_or_default()
    }

    fn convert(
        &self,
        format: PixelFormat,
        algorithm: ColorProcessing,
    ) -> Result<SimConverted, SdkError> {
        if format != PixelFormat::Bgr8 {
            return Err(invalid("PixelFormat", format.name()));
        }
        trace!(
            "Converting frame {} from {} to {} ({:?})",
            self.frame_id,
            self.format.name(),
            format.name(),
            algorithm
        );

        let channels = self.format.channels();
        let stride = (self.width + self.x_padding) * 3;
        let mut data = vec![0u8; stride * (self.height + self.y_padding)];
        for y in 0..self.height {
            for x in 0..self.width {
                let src = &self.pixels[(y * self.width + x) * channels..][..channels];
                let bgr = match self.format {
                    PixelFormat::Mono8 => [src[0], src[0], src[0]],
                    PixelFormat::Rgb8 => [src[2], src[1], src[0]],
                    PixelFormat::Bgr8 => [src[0], src[1], src[2]],
                };
                let offset = y * stride + x * 3;
                data[offset..offset + 3].copy_from_slice(&bgr);
            }
        }

        Ok(SimConverted {
            width: self.width,
            height: self.height,
            x_padding: self.x_padding,
            y_padding: self.y_padding,
            data,
        })
    }

    fn release(self) -> Result<(), SdkError> {
        self.probe.record(SimEvent::ImageReleased(self.frame_id));
        Ok(())
    }
}

/// Test pattern: red ramps with position and frame id, green with x, blue with y.
fn test_pattern(width: usize, height: usize, format: PixelFormat, frame_id: i64) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * format.channels());
    for y in 0..height {
        for x in 0..width {
            let red = ((x + y) as i64 + frame_id).rem_euclid(256) as u8;
            let green = (x % 256) as u8;
            let blue = (y % 256) as u8;
            match format {
                PixelFormat::Mono8 => pixels.push(red),
                PixelFormat::Rgb8 => pixels.extend_from_slice(&[red, green, blue]),
                PixelFormat::Bgr8 => pixels.extend_from_slice(&[blue, green, red]),
            }
        }
    }
    pixels
}

pub struct SimCamera {
    index: usize,
    config: SimConfig,
    probe: SimProbe,
    nodes: SimNodeMap,
    tl_device: SimNodeMap,
    tl_stream: SimNodeMap,
    initialized: bool,
    streaming: bool,
    script: Option<VecDeque<SimFrame>>,
    next_frame_id: i64,
    clock: Instant,
    last_delivery: Option<Instant>,
    rng: StdRng,
    _handle: HandleGuard,
}

impl SimCamera {
    fn new(
        index: usize,
        config: &SimConfig,
        probe: SimProbe,
        script: Option<VecDeque<SimFrame>>,
        live: &Arc<AtomicUsize>,
    ) -> Self {
        Self {
            index,
            config: config.clone(),
            nodes: device_node_map(config, probe.clone()),
            tl_device: tl_device_node_map(config, index, probe.clone()),
            tl_stream: tl_stream_node_map(probe.clone()),
            probe,
            initialized: false,
            streaming: false,
            script,
            next_frame_id: 0,
            clock: Instant::now(),
            last_delivery: None,
            rng: StdRng::from_entropy(),
            _handle: HandleGuard::new(live),
        }
    }

    pub fn nodes(&self) -> &SimNodeMap {
        &self.nodes
    }

    pub fn stream_nodes(&self) -> &SimNodeMap {
        &self.tl_stream
    }

    fn tree_mut(&mut self, tree: SimTree) -> &mut SimNodeMap {
        match tree {
            SimTree::Device => &mut self.nodes,
            SimTree::TlDevice => &mut self.tl_device,
            SimTree::TlStream => &mut self.tl_stream,
        }
    }

    fn frame_period(&self) -> Duration {
        let rate = match self.nodes.bool_value("AcquisitionFrameRateEnable") {
            Ok(true) => self
                .nodes
                .float_value("AcquisitionFrameRate")
                .unwrap_or(DEFAULT_FRAME_RATE),
            _ => DEFAULT_FRAME_RATE,
        };
        let rate = if rate.is_finite() && rate > 0.0 {
            rate.max(MIN_FRAME_RATE)
        } else {
            DEFAULT_FRAME_RATE
        };
        Duration::from_secs_f64(1.0 / rate)
    }

    fn pace(&mut self) {
        let period = self.frame_period();
        if let Some(last) = self.last_delivery {
            let due = last + period;
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }
        self.last_delivery = Some(Instant::now());
    }

    fn build_image(&self, frame_id: i64, status: Option<i32>) -> Result<SimImage, SdkError> {
        let width = self.nodes.int_value("Width")?;
        let height = self.nodes.int_value("Height")?;
        let width = usize::try_from(width).map_err(|_| invalid("Width", width))?;
        let height = usize::try_from(height).map_err(|_| invalid("Height", height))?;
        let format_name = self.nodes.enum_name("PixelFormat")?;
        let format =
            PixelFormat::from_name(&format_name).ok_or_else(|| invalid("PixelFormat", &format_name))?;

        Ok(SimImage {
            frame_id,
            timestamp: self.clock.elapsed().as_nanos() as u64,
            status,
            width,
            height,
            x_padding: self.config.x_padding as usize,
            y_padding: self.config.y_padding as usize,
            format,
            pixels: test_pattern(width, height, format, frame_id),
            probe: self.probe.clone(),
        })
    }

    fn next_generated(&mut self) -> Result<SimImage, SdkError> {
        if self.config.realtime {
            self.pace();
        }

        let drop_probability = self.config.drop_probability.clamp(0.0, 1.0);
        let mut drops = 0;
        while drops < MAX_CONSECUTIVE_DROPS && self.rng.gen_bool(drop_probability) {
            self.next_frame_id += 1;
            drops += 1;
        }
        if drops > 0 {
            trace!("Simulated {} dropped frame(s)", drops);
        }

        let incomplete = self
            .rng
            .gen_bool(self.config.incomplete_probability.clamp(0.0, 1.0));
        let frame_id = self.next_frame_id;
        self.next_frame_id += 1;
        self.build_image(frame_id, incomplete.then_some(STATUS_DATA_INCOMPLETE))
    }
}

impl Device for SimCamera {
    type NodeMap = SimNodeMap;
    type Image = SimImage;

    fn init(&mut self) -> Result<(), SdkError> {
        if self.config.fail_init {
            return Err(SdkError::Vendor {
                code: -1010,
                message: "simulated initialization failure".to_string(),
            });
        }
        self.initialized = true;
        self.probe.record(SimEvent::DeviceInit(self.index));
        debug!("Simulated camera {} initialized", self.index);
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), SdkError> {
        if !self.initialized {
            return Err(SdkError::NotInitialized);
        }
        self.streaming = false;
        self.initialized = false;
        self.probe.record(SimEvent::DeviceDeinit(self.index));
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn node_map(&mut self) -> &mut SimNodeMap {
        &mut self.nodes
    }

    fn tl_device_node_map(&self) -> &SimNodeMap {
        &self.tl_device
    }

    fn tl_stream_node_map(&mut self) -> &mut SimNodeMap {
        &mut self.tl_stream
    }

    fn begin_acquisition(&mut self) -> Result<(), SdkError> {
        if !self.initialized {
            return Err(SdkError::NotInitialized);
        }
        if self.streaming {
            return Err(SdkError::ResourceInUse("stream already started".to_string()));
        }
        self.streaming = true;
        self.last_delivery = None;
        self.probe.record(SimEvent::AcquisitionStarted);
        Ok(())
    }

    fn end_acquisition(&mut self) -> Result<(), SdkError> {
        if !self.streaming {
            return Err(SdkError::NotStreaming);
        }
        self.streaming = false;
        self.probe.record(SimEvent::AcquisitionStopped);
        Ok(())
    }

    fn next_image(&mut self, timeout: Option<Duration>) -> Result<SimImage, SdkError> {
        if !self.initialized {
            return Err(SdkError::NotInitialized);
        }
        if !self.streaming {
            return Err(SdkError::NotStreaming);
        }

        let scripted = self.script.as_mut().map(VecDeque::pop_front);
        match scripted {
            None => self.next_generated(),
            Some(Some(SimFrame::Complete { frame_id })) => {
                self.next_frame_id = frame_id + 1;
                self.build_image(frame_id, None)
            }
            Some(Some(SimFrame::Incomplete { status })) => {
                let frame_id = self.next_frame_id;
                self.next_frame_id += 1;
                self.build_image(frame_id, Some(status))
            }
            Some(Some(SimFrame::Timeout)) | Some(None) => {
                Err(SdkError::Timeout(timeout.unwrap_or_default()))
            }
        }
    }
}

/// Simulated SDK instance.
pub struct SimSystem {
    config: SimConfig,
    probe: SimProbe,
    script: Option<VecDeque<SimFrame>>,
    overrides: Vec<(SimTree, String, AccessMode)>,
    live: Arc<AtomicUsize>,
    released: bool,
}

impl SimSystem {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            probe: SimProbe::default(),
            script: None,
            overrides: Vec::new(),
            live: Arc::new(AtomicUsize::new(0)),
            released: false,
        }
    }

    /// Replaces the frame source of the first camera with a fixed script.
    pub fn with_script(mut self, frames: impl IntoIterator<Item = SimFrame>) -> Self {
        self.script = Some(frames.into_iter().collect());
        self
    }

    /// Overrides the access mode of a node on every enumerated camera.
    pub fn with_node_access(mut self, tree: SimTree, node: &str, access: AccessMode) -> Self {
        self.overrides.push((tree, node.to_string(), access));
        self
    }

    pub fn probe(&self) -> SimProbe {
        self.probe.clone()
    }

    /// Number of camera handles handed out and not yet dropped.
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl System for SimSystem {
    type Device = SimCamera;

    fn cameras(&mut self) -> Result<Vec<SimCamera>, SdkError> {
        if self.released {
            return Err(SdkError::Vendor {
                code: -1002,
                message: "system instance has been released".to_string(),
            });
        }

        let mut cameras = Vec::with_capacity(self.config.device_count);
        for index in 0..self.config.device_count {
            let script = if index == 0 { self.script.take() } else { None };
            let mut camera =
                SimCamera::new(index, &self.config, self.probe.clone(), script, &self.live);
            for (tree, node, access) in &self.overrides {
                camera.tree_mut(*tree).set_access(node, *access);
            }
            cameras.push(camera);
        }

        self.probe.record(SimEvent::CamerasEnumerated(cameras.len()));
        Ok(cameras)
    }

    fn release(&mut self) -> Result<(), SdkError> {
        let live = self.live_handles();
        if live > 0 {
            return Err(SdkError::ResourceInUse(format!(
                "{} camera handle(s) still referenced",
                live
            )));
        }
        self.released = true;
        self.probe.record(SimEvent::SystemReleased);
        info!("Simulated SDK instance released");
        Ok(())
    }
}

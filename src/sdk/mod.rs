//! Boundary to the vendor camera SDK.
//!
//! The session never talks to the vendor library directly. Everything it
//! needs (device enumeration, the GenICam node trees, image retrieval and
//! conversion) goes through the traits in this module, so a session owns
//! its SDK handle explicitly and can be driven by the simulated backend in
//! [`sim`] during tests.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub mod sim;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SdkError {
    #[error("timed out after {0:?} waiting for the next image")]
    Timeout(Duration),

    #[error("device is not initialized")]
    NotInitialized,

    #[error("device is not streaming")]
    NotStreaming,

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("access denied on node {0}")]
    AccessDenied(String),

    #[error("invalid value {value:?} for node {node}")]
    InvalidValue { node: String, value: String },

    #[error("resource still in use: {0}")]
    ResourceInUse(String),

    #[error("vendor error {code}: {message}")]
    Vendor { code: i32, message: String },
}

/// GenICam access mode of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    NotImplemented,
    NotAvailable,
    WriteOnly,
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn is_available(self) -> bool {
        !matches!(self, AccessMode::NotImplemented | AccessMode::NotAvailable)
    }

    pub fn is_readable(self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Integer,
    Float,
    Boolean,
    Enumeration,
    String,
    Category,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Integer => "integer",
            NodeKind::Float => "float",
            NodeKind::Boolean => "boolean",
            NodeKind::Enumeration => "enumeration",
            NodeKind::String => "string",
            NodeKind::Category => "category",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfo {
    pub kind: NodeKind,
    pub access: AccessMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumEntry {
    pub name: String,
    pub value: i64,
    pub access: AccessMode,
}

/// A live, introspectable configuration tree of a device.
pub trait NodeMap {
    /// Looks up a node by name. `None` means the tree has no such node.
    fn node(&self, name: &str) -> Option<NodeInfo>;

    /// Looks up a named entry of an enumeration node.
    fn enum_entry(&self, node: &str, entry: &str) -> Option<EnumEntry>;

    fn int_value(&self, name: &str) -> Result<i64, SdkError>;

    fn value_to_string(&self, name: &str) -> Result<String, SdkError>;

    /// Names of the features grouped under a category node.
    fn category_features(&self, name: &str) -> Result<Vec<String>, SdkError>;

    fn set_int_value(&mut self, name: &str, value: i64) -> Result<(), SdkError>;

    fn set_float_value(&mut self, name: &str, value: f64) -> Result<(), SdkError>;

    /// Writes the integer code of an enumeration entry.
    fn set_enum_int_value(&mut self, name: &str, value: i64) -> Result<(), SdkError>;

    /// Writes a node from its string representation.
    fn from_string(&mut self, name: &str, value: &str) -> Result<(), SdkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Mono8,
    Rgb8,
    Bgr8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
        }
    }

    /// SFNC name of the format, as used by the `PixelFormat` node.
    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Mono8 => "Mono8",
            PixelFormat::Rgb8 => "RGB8",
            PixelFormat::Bgr8 => "BGR8",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Mono8" => Some(PixelFormat::Mono8),
            "RGB8" => Some(PixelFormat::Rgb8),
            "BGR8" => Some(PixelFormat::Bgr8),
            _ => None,
        }
    }
}

/// Resampling used when the SDK converts between pixel formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorProcessing {
    NearestNeighbor,
}

/// An image produced by the SDK's pixel format conversion.
pub trait ConvertedImage {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn x_padding(&self) -> usize;
    fn y_padding(&self) -> usize;
    /// Bytes per row, padding included.
    fn stride(&self) -> usize;
    fn data(&self) -> &[u8];
}

/// A frame handle lent out by the device's buffer pool.
///
/// Every handle must be given back with [`RawImage::release`], otherwise the
/// device runs out of buffers.
pub trait RawImage {
    type Converted: ConvertedImage;

    fn frame_id(&self) -> i64;

    /// Device clock value at capture, in nanoseconds.
    fn timestamp(&self) -> u64;

    fn is_incomplete(&self) -> bool;

    fn status(&self) -> i32;

    fn convert(
        &self,
        format: PixelFormat,
        algorithm: ColorProcessing,
    ) -> Result<Self::Converted, SdkError>;

    fn release(self) -> Result<(), SdkError>;
}

pub trait Device {
    type NodeMap: NodeMap;
    type Image: RawImage;

    fn init(&mut self) -> Result<(), SdkError>;

    fn deinit(&mut self) -> Result<(), SdkError>;

    fn is_initialized(&self) -> bool;

    /// GenICam feature tree of the camera.
    fn node_map(&mut self) -> &mut Self::NodeMap;

    /// Transport layer device tree, holding descriptive metadata.
    fn tl_device_node_map(&self) -> &Self::NodeMap;

    /// Transport layer stream tree, holding buffer settings.
    fn tl_stream_node_map(&mut self) -> &mut Self::NodeMap;

    fn begin_acquisition(&mut self) -> Result<(), SdkError>;

    fn end_acquisition(&mut self) -> Result<(), SdkError>;

    /// Blocks until the next image is available. `None` waits forever.
    fn next_image(&mut self, timeout: Option<Duration>) -> Result<Self::Image, SdkError>;
}

/// The SDK instance.
pub trait System {
    type Device: Device;

    fn cameras(&mut self) -> Result<Vec<Self::Device>, SdkError>;

    /// Releases the SDK instance. Fails while camera handles are alive.
    fn release(&mut self) -> Result<(), SdkError>;
}

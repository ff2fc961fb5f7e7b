use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::buffer;
use crate::format::Format;
use crate::session::State;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Any failure surfaced by this crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("{op} is not valid while the session is {state}")]
    InvalidState { op: &'static str, state: State },
}

impl Error {
    /// Whether the session that produced this error is unusable and must be reopened.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Device(_) => true,
            Error::Buffer(e) => e.is_fatal(),
            Error::Stream(e) => e.is_fatal(),
            Error::Format(_) | Error::Control(_) | Error::InvalidState { .. } => false,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Stream(StreamError::FrameTimeout(_)))
    }
}

/// Open, close and capability failures
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no such device: {}", .0.display())]
    NotFound(PathBuf),
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("{} is not a video4linux device", .0.display())]
    NotV4l2(PathBuf),
    #[error("{} does not support {missing}", .path.display())]
    Unsupported { path: PathBuf, missing: &'static str },
    #[error("device is already closed")]
    AlreadyClosed,
    #[error("device is closed")]
    Closed,
    #[error("device cannot be closed while buffers are mapped")]
    InUse,
    #[error("failed to open {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl DeviceError {
    pub(crate) fn from_open(path: PathBuf, e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::ENOENT) | Some(libc::ENXIO) | Some(libc::ENODEV) => {
                DeviceError::NotFound(path)
            }
            Some(libc::EACCES) | Some(libc::EPERM) => DeviceError::PermissionDenied(path),
            _ => DeviceError::Io { path, source: e },
        }
    }

    pub(crate) fn from_querycap(path: PathBuf, e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::ENOTTY) | Some(libc::EINVAL) => DeviceError::NotV4l2(path),
            _ => DeviceError::from_open(path, e),
        }
    }
}

/// Format negotiation failures; recoverable by negotiating with a different request
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("driver rejected the capture format: {0}")]
    Rejected(#[source] io::Error),
    #[error("format cannot be changed while the device is busy")]
    Busy,
    #[error("driver reported {size} bytes per image for {format:?}, expected at least {expected}")]
    Inconsistent {
        format: Format,
        size: u32,
        expected: usize,
    },
    #[error("format request failed: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for FormatError {
    fn from(e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::EINVAL) => FormatError::Rejected(e),
            Some(libc::EBUSY) => FormatError::Busy,
            _ => FormatError::Io(e),
        }
    }
}

/// Buffer allocation and ownership failures; fatal to the current session
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("driver could not allocate {requested} buffers")]
    InsufficientMemory { requested: u32 },
    #[error("requested {requested} buffers, driver granted {granted} (at least 2 are required)")]
    UnsupportedCount { requested: u32, granted: u32 },
    #[error("driver does not support memory-mapped streaming: {0}")]
    Unsupported(#[source] io::Error),
    #[error("buffers are in use by another file handle")]
    Busy,
    #[error("failed to map buffer {index}: {source}")]
    Map { index: u32, source: io::Error },
    #[error("buffer {index} holds {length} bytes, the negotiated format needs {expected}")]
    Undersized {
        index: u32,
        length: u32,
        expected: u32,
    },
    #[error("buffer {index} cannot be {op} while {state}")]
    InvalidTransition {
        index: usize,
        op: &'static str,
        state: buffer::State,
    },
    #[error("driver returned unknown buffer index {0}")]
    UnknownIndex(u32),
    #[error("buffer request failed: {0}")]
    Io(#[source] io::Error),
}

impl BufferError {
    /// Whether buffer bookkeeping is out of sync with the driver
    ///
    /// Allocation failures are not fatal, a different count or format may succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BufferError::Map { .. }
                | BufferError::InvalidTransition { .. }
                | BufferError::UnknownIndex(_)
        )
    }

    pub(crate) fn from_request(requested: u32, e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::ENOMEM) => BufferError::InsufficientMemory { requested },
            Some(libc::EINVAL) => BufferError::Unsupported(e),
            Some(libc::EBUSY) => BufferError::Busy,
            _ => BufferError::Io(e),
        }
    }
}

/// Start, stop and frame wait failures
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream is not running")]
    Stopped,
    #[error("device is busy, another process owns the stream")]
    DeviceBusy,
    #[error("no frame completed within {0:?}")]
    FrameTimeout(Duration),
    #[error("device disconnected")]
    Disconnected,
    #[error("stream request failed: {0}")]
    Io(#[source] io::Error),
}

impl StreamError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StreamError::Disconnected)
    }
}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::ENODEV) | Some(libc::ENXIO) => StreamError::Disconnected,
            Some(libc::EBUSY) => StreamError::DeviceBusy,
            _ => StreamError::Io(e),
        }
    }
}

/// Control request failures; local to the single request
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control {0:#010x} is not supported")]
    NotSupported(u32),
    #[error("control {0:#010x} is read-only")]
    ReadOnly(u32),
    #[error("control {0:#010x} is write-only")]
    WriteOnly(u32),
    #[error("value {value} is invalid for control {id:#010x} (range [{min}, {max}], step {step})")]
    ValueOutOfRange {
        id: u32,
        value: i64,
        min: i64,
        max: i64,
        step: u64,
    },
    #[error("control {id:#010x} request failed: {source}")]
    Io { id: u32, source: io::Error },
}

impl ControlError {
    pub(crate) fn from_io(id: u32, e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::EINVAL) => ControlError::NotSupported(id),
            _ => ControlError::Io { id, source: e },
        }
    }

    /// VIDIOC_G_CTRL answers EACCES for write-only controls
    pub(crate) fn from_get(id: u32, e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::EACCES) => ControlError::WriteOnly(id),
            _ => ControlError::from_io(id, e),
        }
    }

    /// VIDIOC_S_CTRL answers EACCES for read-only controls
    pub(crate) fn from_set(id: u32, e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::EACCES) => ControlError::ReadOnly(id),
            _ => ControlError::from_io(id, e),
        }
    }
}

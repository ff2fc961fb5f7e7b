use bitflags::bitflags;
use std::fmt;

use crate::Timestamp;

/// Buffer type
///
/// Specific types of devices require buffers of corresponding types.
/// Only single-planar video capture is streamed by this crate.
#[allow(clippy::unreadable_literal)]
#[rustfmt::skip]
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Type {
    VideoCapture        = 1,
}

bitflags! {
    #[allow(clippy::unreadable_literal)]
    #[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Default)]
    pub struct Flags: u32 {
        /// Buffer is mapped
        const MAPPED                = 0x00000001;
        /// Buffer is queued for processing
        const QUEUED                = 0x00000002;
        /// Buffer is ready
        const DONE                  = 0x00000004;
        /// Image is a keyframe (I-frame)
        const KEYFRAME              = 0x00000008;
        /// Buffer is ready, but the data contained within is corrupted
        const ERROR                 = 0x00000040;
        /// Timecode field is valid
        const TIMECODE              = 0x00000100;
        /// Timestamp type
        const TIMESTAMP_MASK        = 0x0000e000;
        const TIMESTAMP_MONOTONIC   = 0x00002000;
        const TIMESTAMP_COPY        = 0x00004000;
        /// Timestamp sources
        const TSTAMP_SRC_MASK       = 0x00070000;
        const TSTAMP_SRC_SOE        = 0x00010000;
        /// Last buffer produced by the hardware
        const LAST                  = 0x00100000;
    }
}

impl From<u32> for Flags {
    fn from(flags: u32) -> Self {
        Self::from_bits_truncate(flags)
    }
}

impl From<Flags> for u32 {
    fn from(flags: Flags) -> Self {
        flags.bits()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Ownership of a buffer's memory
///
/// Exactly one side may touch the memory at any time: the driver while `Queued`, the
/// application while `Dequeued`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// Allocated and mapped, but in neither queue
    Free,
    /// In the driver's incoming queue, the hardware may write to it
    Queued,
    /// Handed to the application for reading
    Dequeued,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Free => write!(f, "free"),
            State::Queued => write!(f, "queued"),
            State::Dequeued => write!(f, "dequeued"),
        }
    }
}

/// Buffer metadata, mostly used not to convolute the main buffer structs
#[derive(Debug, Default, Copy, Clone)]
pub struct Metadata {
    /// Number of bytes occupied by the data in the buffer
    pub bytesused: u32,
    /// Buffer flags
    pub flags: Flags,
    /// Time of capture (usually set by the driver)
    pub timestamp: Timestamp,
    /// Sequence number, counting the frames; extended past the driver's 32 bit counter
    pub sequence: u64,
    /// Frames the driver skipped between the previous buffer and this one
    pub dropped: u32,
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sequence   : {}", self.sequence)?;
        writeln!(f, "timestamp  : {}", self.timestamp)?;
        writeln!(f, "flags      : {}", self.flags)?;
        writeln!(f, "bytesused  : {}", self.bytesused)?;
        writeln!(f, "dropped    : {}", self.dropped)?;
        Ok(())
    }
}

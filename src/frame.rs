use std::{fmt, ops::Deref};

use crate::buffer::{Flags, Metadata};
use crate::{Format, FourCC, Timestamp};

/// Read-only view of one captured image
///
/// The bytes live in a mapped driver buffer. The view borrows the capture session, so it can
/// not outlive the point where the buffer is handed back to the driver.
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    data: &'a [u8],
    meta: Metadata,
    format: Format,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(data: &'a [u8], meta: Metadata, format: Format) -> Self {
        Frame { data, meta, format }
    }

    /// Image bytes, exactly `bytes_used` long
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    /// Format the image is encoded in
    pub fn format(&self) -> &Format {
        &self.format
    }

    /// Monotonically increasing frame counter
    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    pub fn timestamp(&self) -> Timestamp {
        self.meta.timestamp
    }

    pub fn bytes_used(&self) -> usize {
        self.data.len()
    }

    pub fn width(&self) -> u32 {
        self.format.width
    }

    pub fn height(&self) -> u32 {
        self.format.height
    }

    pub fn fourcc(&self) -> FourCC {
        self.format.fourcc
    }

    pub fn flags(&self) -> Flags {
        self.meta.flags
    }

    /// Frames the driver dropped right before this one
    pub fn dropped(&self) -> u32 {
        self.meta.dropped
    }

    /// Whether the driver flagged the data as corrupted
    pub fn is_corrupted(&self) -> bool {
        self.meta.flags.contains(Flags::ERROR)
    }
}

impl<'a> Deref for Frame<'a> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<'a> fmt::Debug for Frame<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.meta.sequence)
            .field("timestamp", &self.meta.timestamp)
            .field("bytes_used", &self.data.len())
            .field("format", &format_args!("{}x{} {}", self.width(), self.height(), self.fourcc()))
            .finish()
    }
}

use bitflags::bitflags;
use std::fmt;

use crate::format::{Format, FourCC};
use crate::v4l2;
use crate::v4l_sys::*;

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy)]
    pub struct Flags : u32 {
        const COMPRESSED            = 0x0001;
        /// Converted in software, not produced by the hardware
        const EMULATED              = 0x0002;
    }
}

/// Pixel format offered by a capture device, see [`crate::Device::enum_formats`]
#[derive(Debug, Clone)]
pub struct Description {
    pub index: u32,
    pub fourcc: FourCC,
    pub flags: Flags,
    /// Human readable name reported by the driver
    pub name: String,
}

impl Description {
    /// Whether frames of this format vary in size, e.g. MJPG
    ///
    /// Compressed frames only fill part of their buffer; the image size cannot be checked
    /// against the resolution.
    pub fn is_compressed(&self) -> bool {
        self.flags.contains(Flags::COMPRESSED) || self.fourcc.bits_per_pixel().is_none()
    }

    pub fn is_emulated(&self) -> bool {
        self.flags.contains(Flags::EMULATED)
    }

    /// Returns a format request for this encoding at the given resolution
    pub fn request(&self, width: u32, height: u32) -> Format {
        Format::new(width, height, self.fourcc)
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.index, self.fourcc, self.name)?;
        if self.is_compressed() {
            write!(f, " (compressed)")?;
        }
        if self.is_emulated() {
            write!(f, " (emulated)")?;
        }
        Ok(())
    }
}

impl From<v4l2_fmtdesc> for Description {
    fn from(desc: v4l2_fmtdesc) -> Self {
        Self {
            index: desc.index,
            fourcc: FourCC::from(desc.pixelformat),
            flags: Flags::from_bits_truncate(desc.flags),
            name: v4l2::string_from_bytes(&desc.description),
        }
    }
}

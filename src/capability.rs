use std::fmt;

use crate::v4l2;
use crate::v4l_sys::*;

bitflags::bitflags! {
    #[allow(clippy::unreadable_literal)]
    #[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
    pub struct Flags: u32 {
        const VIDEO_CAPTURE         = 0x00000001;
        const VIDEO_OUTPUT          = 0x00000002;
        const VIDEO_OVERLAY         = 0x00000004;
        const VBI_CAPTURE           = 0x00000010;
        const VBI_OUTPUT            = 0x00000020;
        const VIDEO_CAPTURE_MPLANE  = 0x00001000;
        const VIDEO_OUTPUT_MPLANE   = 0x00002000;
        const VIDEO_M2M_MPLANE      = 0x00004000;
        const VIDEO_M2M             = 0x00008000;
        const TUNER                 = 0x00010000;
        const AUDIO                 = 0x00020000;
        const RADIO                 = 0x00040000;
        const META_CAPTURE          = 0x00800000;
        const READ_WRITE            = 0x01000000;
        const STREAMING             = 0x04000000;
        const META_OUTPUT           = 0x08000000;
        const TOUCH                 = 0x10000000;
        const IO_MC                 = 0x20000000;
        const DEVICE_CAPS           = 0x80000000;
    }
}

impl From<u32> for Flags {
    fn from(flags: u32) -> Self {
        Self::from_bits_retain(flags)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
/// Device capabilities
pub struct Capabilities {
    /// Driver name, e.g. uvc for usb video class devices
    pub driver: String,
    /// Card name
    pub card: String,
    /// Bus name, e.g. USB or PCI
    pub bus: String,
    /// Version number MAJOR.MINOR.PATCH
    pub version: (u8, u8, u8),

    /// Capabilities of the opened device node
    ///
    /// Drivers that report per-node capabilities (`DEVICE_CAPS`) are trusted for those,
    /// otherwise the physical device's capabilities are used.
    pub capabilities: Flags,
}

impl Capabilities {
    /// Whether the node can stream video capture frames through mapped buffers
    pub fn can_stream_capture(&self) -> bool {
        self.capabilities
            .contains(Flags::VIDEO_CAPTURE | Flags::STREAMING)
    }
}

impl From<v4l2_capability> for Capabilities {
    fn from(cap: v4l2_capability) -> Self {
        let physical = Flags::from(cap.capabilities);
        let capabilities = if physical.contains(Flags::DEVICE_CAPS) {
            Flags::from(cap.device_caps)
        } else {
            physical
        };

        Capabilities {
            driver: v4l2::string_from_bytes(&cap.driver),
            card: v4l2::string_from_bytes(&cap.card),
            bus: v4l2::string_from_bytes(&cap.bus_info),
            version: (
                ((cap.version >> 16) & 0xff) as u8,
                ((cap.version >> 8) & 0xff) as u8,
                (cap.version & 0xff) as u8,
            ),
            capabilities,
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Driver      : {}", self.driver)?;
        writeln!(f, "Card        : {}", self.card)?;
        writeln!(f, "Bus         : {}", self.bus)?;
        writeln!(
            f,
            "Version     : {}.{}.{}",
            self.version.0, self.version.1, self.version.2
        )?;
        writeln!(f, "Capabilites : {}", self.capabilities)?;
        Ok(())
    }
}

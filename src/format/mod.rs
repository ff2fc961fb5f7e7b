use std::{fmt, mem};

use crate::v4l_sys::*;

pub mod description;
pub use description::Description;

pub mod fourcc;
pub use fourcc::FourCC;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Streaming format (single-planar)
pub struct Format {
    /// width in pixels
    pub width: u32,
    /// height in pixels
    pub height: u32,
    /// pixelformat code
    pub fourcc: FourCC,

    /// bytes per line
    pub stride: u32,
    /// maximum number of bytes required to store an image
    pub size: u32,
}

impl Format {
    /// Returns a capture format
    ///
    /// Stride and size are left for the driver to fill in.
    ///
    /// # Arguments
    ///
    /// * `width` - Width in pixels
    /// * `height` - Height in pixels
    /// * `fourcc` - Four character code (pixelformat)
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::{Format, FourCC};
    /// let fmt = Format::new(640, 480, FourCC::new(b"YUYV"));
    /// ```
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        Format {
            width,
            height,
            fourcc,
            stride: 0,
            size: 0,
        }
    }

    /// Minimum number of bytes one image occupies, derived from the frame dimensions
    ///
    /// `None` if the encoding is compressed or unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::{Format, FourCC};
    /// let fmt = Format::new(1920, 1080, FourCC::RGB3);
    /// assert_eq!(fmt.frame_len(), Some(1920 * 1080 * 3));
    /// ```
    pub fn frame_len(&self) -> Option<usize> {
        let bpp = self.fourcc.bits_per_pixel()? as usize;
        Some(self.width as usize * self.height as usize * bpp / 8)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "width          : {}", self.width)?;
        writeln!(f, "height         : {}", self.height)?;
        writeln!(f, "fourcc         : {}", self.fourcc)?;
        writeln!(f, "stride         : {}", self.stride)?;
        writeln!(f, "size           : {}", self.size)?;
        Ok(())
    }
}

impl From<v4l2_pix_format> for Format {
    fn from(fmt: v4l2_pix_format) -> Self {
        Self {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.pixelformat),
            stride: fmt.bytesperline,
            size: fmt.sizeimage,
        }
    }
}

impl From<Format> for v4l2_pix_format {
    fn from(format: Format) -> Self {
        Self {
            width: format.width,
            height: format.height,
            pixelformat: format.fourcc.into(),
            bytesperline: format.stride,
            sizeimage: format.size,
            ..unsafe { mem::zeroed() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_through_pix_format() {
        let fmt = Format {
            stride: 1280,
            size: 614_400,
            ..Format::new(640, 480, FourCC::YUYV)
        };
        let pix: v4l2_pix_format = fmt.into();
        assert_eq!(pix.pixelformat, u32::from(FourCC::YUYV));
        assert_eq!(Format::from(pix), fmt);
    }

    #[test]
    fn frame_len_follows_encoding() {
        assert_eq!(Format::new(640, 480, FourCC::YUYV).frame_len(), Some(614_400));
        assert_eq!(Format::new(640, 480, FourCC::NV12).frame_len(), Some(460_800));
        assert_eq!(Format::new(640, 480, FourCC::MJPG).frame_len(), None);
    }
}

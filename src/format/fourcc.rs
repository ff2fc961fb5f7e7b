use std::{fmt, str};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
/// Four character code representing a pixelformat
pub struct FourCC {
    pub repr: [u8; 4],
}

impl FourCC {
    /// 24 bit RGB, one byte per channel
    pub const RGB3: FourCC = FourCC::new(b"RGB3");
    /// 24 bit BGR, one byte per channel
    pub const BGR3: FourCC = FourCC::new(b"BGR3");
    /// 32 bit XRGB (little endian BGRX)
    pub const XR24: FourCC = FourCC::new(b"XR24");
    /// Packed YUV 4:2:2
    pub const YUYV: FourCC = FourCC::new(b"YUYV");
    /// Packed YUV 4:2:2, chroma first
    pub const UYVY: FourCC = FourCC::new(b"UYVY");
    /// Planar YUV 4:2:0 with interleaved chroma
    pub const NV12: FourCC = FourCC::new(b"NV12");
    /// Planar YUV 4:2:0
    pub const YU12: FourCC = FourCC::new(b"YU12");
    /// 8 bit greyscale
    pub const GREY: FourCC = FourCC::new(b"GREY");
    /// Motion JPEG, compressed
    pub const MJPG: FourCC = FourCC::new(b"MJPG");

    /// Returns a pixelformat as four character code
    ///
    /// # Arguments
    ///
    /// * `repr` - Four characters as raw bytes
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::format::FourCC;
    /// let fourcc = FourCC::new(b"YUYV");
    /// ```
    pub const fn new(repr: &[u8; 4]) -> FourCC {
        FourCC { repr: *repr }
    }

    /// Returns the string representation of a four character code
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::format::FourCC;
    /// let fourcc = FourCC::new(b"YUYV");
    /// let str = fourcc.str().unwrap();
    /// ```
    pub fn str(&self) -> Result<&str, str::Utf8Error> {
        str::from_utf8(&self.repr)
    }

    /// Average number of bits per pixel for uncompressed encodings
    ///
    /// Returns `None` for compressed or unknown encodings, whose image size cannot be derived
    /// from the frame dimensions.
    pub fn bits_per_pixel(&self) -> Option<u32> {
        match &self.repr {
            b"RGB3" | b"BGR3" => Some(24),
            b"XR24" | b"AR24" | b"RGB4" | b"BGR4" => Some(32),
            b"YUYV" | b"UYVY" | b"YVYU" | b"VYUY" | b"RGBP" => Some(16),
            b"NV12" | b"NV21" | b"YU12" | b"YV12" => Some(12),
            b"GREY" => Some(8),
            _ => None,
        }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = str::from_utf8(&self.repr);
        if let Ok(string) = string {
            write!(f, "{}", string)?;
        }
        Ok(())
    }
}

impl From<u32> for FourCC {
    fn from(code: u32) -> Self {
        FourCC::new(&code.to_le_bytes())
    }
}

impl From<FourCC> for u32 {
    fn from(fourcc: FourCC) -> Self {
        Self::from_le_bytes(fourcc.repr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_little_endian() {
        // V4L2_PIX_FMT_YUYV from <linux/videodev2.h>
        assert_eq!(u32::from(FourCC::YUYV), 0x5659_5559);
        assert_eq!(FourCC::from(0x3342_4752), FourCC::RGB3);
    }

    #[test]
    fn compressed_formats_have_no_pixel_size() {
        assert_eq!(FourCC::RGB3.bits_per_pixel(), Some(24));
        assert_eq!(FourCC::NV12.bits_per_pixel(), Some(12));
        assert_eq!(FourCC::MJPG.bits_per_pixel(), None);
    }
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Format, FourCC};

/// Parameters for opening a camera at a given resolution
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use v4l_capture::{Config, Format, FourCC};
///
/// let config = Config::default()
///     .with_path("/dev/video2")
///     .with_format(Format::new(1280, 720, FourCC::MJPG))
///     .with_timeout(Duration::from_millis(500));
/// assert_eq!(config.buffers, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Device node
    pub path: PathBuf,
    /// Requested format; the driver may adjust it
    pub format: Format,
    /// Requested number of buffers, at least 2
    pub buffers: u32,
    /// Upper bound on waiting for a frame
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            path: PathBuf::from("/dev/video0"),
            format: Format::new(640, 480, FourCC::YUYV),
            buffers: 4,
            timeout: Duration::from_secs(2),
        }
    }
}

impl Config {
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_buffers(mut self, buffers: u32) -> Self {
        self.buffers = buffers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

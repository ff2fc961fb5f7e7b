use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::{io, mem};

use crate::buffer;
use crate::error::{DeviceError, FormatError, Result};
use crate::format::{Description as FormatDescription, Format};
use crate::v4l_sys::*;
use crate::Capabilities;

pub mod driver;
pub use driver::{Driver, Handle};

mod node;
pub use node::{enum_devices, Node};

#[cfg(test)]
pub(crate) mod fake;

/// Linux capture device abstraction
///
/// All driver requests are serialized through one lock, so a device can be shared between a
/// capture thread and threads adjusting controls. Waiting for frames does not hold the lock.
pub struct Device {
    path: PathBuf,
    caps: Capabilities,
    driver: Mutex<Option<Arc<dyn Driver>>>,
    /// Arenas holding buffers mapped from this device
    arenas: AtomicUsize,
}

impl Device {
    /// Returns a capture device by index
    ///
    /// Devices are usually enumerated by the system.
    /// An index of zero thus represents the first device the system got to know about.
    ///
    /// # Arguments
    ///
    /// * `index` - Index (0: first, 1: second, ..)
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::Device;
    /// let dev = Device::new(0);
    /// ```
    pub fn new(index: usize) -> Result<Self> {
        Self::with_path(format!("/dev/video{}", index))
    }

    /// Returns a capture device by path
    ///
    /// The node is probed for its capabilities. Nodes which cannot stream video capture frames
    /// through mapped buffers (e.g. metadata nodes of UVC cameras) are rejected.
    ///
    /// # Arguments
    ///
    /// * `path` - Path (e.g. "/dev/video0")
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::Device;
    /// let dev = Device::with_path("/dev/video0");
    /// ```
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let handle = Handle::open(&path).map_err(|e| DeviceError::from_open(path.clone(), e))?;
        Self::with_driver(path, Arc::new(handle))
    }

    /// Returns a capture device backed by an arbitrary driver implementation
    ///
    /// # Arguments
    ///
    /// * `path` - Path used for diagnostics
    /// * `driver` - Request layer to issue all requests through
    pub fn with_driver<P: AsRef<Path>>(path: P, driver: Arc<dyn Driver>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let caps = driver
            .query_caps()
            .map(Capabilities::from)
            .map_err(|e| DeviceError::from_querycap(path.clone(), e))?;

        if !caps.capabilities.contains(crate::capability::Flags::VIDEO_CAPTURE) {
            return Err(DeviceError::Unsupported {
                path,
                missing: "video capture",
            }
            .into());
        }
        if !caps.capabilities.contains(crate::capability::Flags::STREAMING) {
            return Err(DeviceError::Unsupported {
                path,
                missing: "streaming I/O",
            }
            .into());
        }

        tracing::info!(
            path = %path.display(),
            driver = %caps.driver,
            card = %caps.card,
            "opened capture device"
        );

        Ok(Device {
            path,
            caps,
            driver: Mutex::new(Some(driver)),
            arenas: AtomicUsize::new(0),
        })
    }

    /// Returns the path of the device node
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Capabilities probed when the device was opened
    pub fn caps(&self) -> &Capabilities {
        &self.caps
    }

    /// Whether [`Device::close`] was called
    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    /// Releases the descriptor
    ///
    /// Requests issued afterwards fail with [`DeviceError::Closed`]. Fails with
    /// [`DeviceError::InUse`] as long as buffers are mapped; streams have to be stopped and
    /// their buffers released first, which [`crate::Session::close`] does in order.
    pub fn close(&self) -> Result<(), DeviceError> {
        let mut driver = self.lock();
        if driver.is_none() {
            return Err(DeviceError::AlreadyClosed);
        }
        if self.arenas.load(Ordering::SeqCst) > 0 {
            return Err(DeviceError::InUse);
        }

        driver.take();
        tracing::info!(path = %self.path.display(), "closed capture device");
        Ok(())
    }

    /// Returns a vector of valid capture formats for this device
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::Device;
    ///
    /// if let Ok(dev) = Device::new(0) {
    ///     if let Ok(formats) = dev.enum_formats() {
    ///         for fmt in formats {
    ///             println!("{}", fmt);
    ///         }
    ///     }
    /// }
    /// ```
    pub fn enum_formats(&self) -> Result<Vec<FormatDescription>> {
        let mut formats = Vec::new();
        let mut v4l2_fmt = v4l2_fmtdesc {
            index: 0,
            type_: buffer::Type::VideoCapture as u32,
            ..unsafe { mem::zeroed() }
        };

        loop {
            match self.request(|driver| driver.enum_format(&mut v4l2_fmt))? {
                Ok(()) => {
                    formats.push(FormatDescription::from(v4l2_fmt));
                    v4l2_fmt.index += 1;
                }
                // the driver signals the end of the list with EINVAL
                Err(e) if e.raw_os_error() == Some(libc::EINVAL) => return Ok(formats),
                Err(e) => return Err(FormatError::Io(e).into()),
            }
        }
    }

    /// Returns the format currently in use
    pub fn format(&self) -> Result<Format> {
        let mut v4l2_fmt = v4l2_format {
            type_: buffer::Type::VideoCapture as u32,
            ..unsafe { mem::zeroed() }
        };
        self.request(|driver| driver.get_format(&mut v4l2_fmt))?
            .map_err(FormatError::Io)?;

        Ok(Format::from(unsafe { v4l2_fmt.fmt.pix }))
    }

    /// Modifies the capture format and returns the actual format
    ///
    /// The driver tries to match the format parameters on a best effort basis.
    /// Thus, if the combination of format properties cannot be achieved, the closest possible
    /// settings are used and reported back. Only the returned format is valid for sizing
    /// buffers and interpreting pixel data.
    ///
    /// # Arguments
    ///
    /// * `fmt` - Desired format; stride and size are computed by the driver
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::{Device, Format, FourCC};
    ///
    /// if let Ok(dev) = Device::new(0) {
    ///     let fmt = Format::new(640, 480, FourCC::YUYV);
    ///     match dev.set_format(&fmt) {
    ///         Ok(fmt) => print!("Actual format:\n{}", fmt),
    ///         Err(e) => print!("{}", e),
    ///     }
    /// }
    /// ```
    pub fn set_format(&self, fmt: &Format) -> Result<Format> {
        let requested = Format::new(fmt.width, fmt.height, fmt.fourcc);
        let mut v4l2_fmt = v4l2_format {
            type_: buffer::Type::VideoCapture as u32,
            ..unsafe { mem::zeroed() }
        };
        v4l2_fmt.fmt.pix = requested.into();

        self.request(|driver| driver.set_format(&mut v4l2_fmt))?
            .map_err(FormatError::from)?;

        let actual = self.format()?;
        if let Some(expected) = actual.frame_len() {
            if (actual.size as usize) < expected {
                return Err(FormatError::Inconsistent {
                    format: actual,
                    size: actual.size,
                    expected,
                }
                .into());
            }
        }

        if (actual.width, actual.height, actual.fourcc)
            != (requested.width, requested.height, requested.fourcc)
        {
            tracing::info!(
                requested = %format_args!("{}x{} {}", requested.width, requested.height, requested.fourcc),
                actual = %format_args!("{}x{} {}", actual.width, actual.height, actual.fourcc),
                "driver adjusted the capture format"
            );
        }

        Ok(actual)
    }

    /// Issues one driver request while holding the device lock
    ///
    /// The outer error reports an unusable device, the inner one is the driver's answer.
    pub(crate) fn request<T>(
        &self,
        op: impl FnOnce(&dyn Driver) -> io::Result<T>,
    ) -> Result<io::Result<T>, DeviceError> {
        let guard = self.lock();
        let driver = guard.as_ref().ok_or(DeviceError::Closed)?;
        Ok(op(driver.as_ref()))
    }

    /// Returns the driver for operations that must not hold the lock (waiting, unmapping)
    pub(crate) fn driver(&self) -> Result<Arc<dyn Driver>, DeviceError> {
        self.lock().clone().ok_or(DeviceError::Closed)
    }

    /// Registers an arena whose mappings pin the device open
    pub(crate) fn claim_buffers(&self) {
        self.arenas.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn unclaim_buffers(&self) {
        self.arenas.fetch_sub(1, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn Driver>>> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("path", &self.path)
            .field("caps", &self.caps)
            .field("closed", &self.is_closed())
            .finish()
    }
}

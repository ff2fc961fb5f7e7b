use std::{fmt, path::Path, sync::Arc, time::Duration};

use crate::control::Registry;
use crate::error::{DeviceError, Error, Result, StreamError};
use crate::io::mmap::{Arena, Stream};
use crate::{Config, Device, Format, Frame};

/// Lifecycle state of a capture session
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// Device open, nothing negotiated
    Idle,
    /// Format accepted by the driver
    Negotiated,
    /// Buffers requested and mapped
    BuffersAllocated,
    /// Driver is filling buffers
    Streaming,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Idle => write!(f, "idle"),
            State::Negotiated => write!(f, "negotiated"),
            State::BuffersAllocated => write!(f, "buffers allocated"),
            State::Streaming => write!(f, "streaming"),
        }
    }
}

/// Capture session on one device
///
/// Drives a device through format negotiation, buffer allocation and streaming, and tears it
/// down in order (stop, unmap, close) when closed or dropped. Frames borrow the session, so the
/// buffer behind a frame can not be handed back to the driver while it is still being read.
///
/// # Example
///
/// ```
/// use v4l_capture::{Format, FourCC, Session};
///
/// if let Ok(mut session) = Session::open("/dev/video0") {
///     let fmt = session.negotiate(&Format::new(1920, 1080, FourCC::RGB3)).unwrap();
///     session.allocate_buffers(4).unwrap();
///     session.start_stream().unwrap();
///
///     let frame = session.get_frame().unwrap();
///     println!("{} bytes for a {}x{} {} image", frame.len(), fmt.width, fmt.height, fmt.fourcc);
/// }
/// ```
pub struct Session {
    device: Arc<Device>,
    format: Option<Format>,
    stream: Option<Stream>,
    timeout: Duration,
    closed: bool,
}

impl Session {
    /// Opens the device at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let device = Device::with_path(path)?;
        Ok(Self::with_device(Arc::new(device)))
    }

    /// Returns a session driving an already opened device
    pub fn with_device(device: Arc<Device>) -> Self {
        Session {
            device,
            format: None,
            stream: None,
            timeout: Stream::DEFAULT_TIMEOUT,
            closed: false,
        }
    }

    /// Opens a device and brings it up to streaming in one go
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::{Config, Session};
    ///
    /// if let Ok(mut session) = Session::with_config(&Config::default()) {
    ///     let frame = session.get_frame();
    /// }
    /// ```
    pub fn with_config(config: &Config) -> Result<Self> {
        let mut session = Self::open(&config.path)?;
        session.bring_up(config)?;
        Ok(session)
    }

    fn bring_up(&mut self, config: &Config) -> Result<()> {
        self.set_timeout(config.timeout);
        self.negotiate(&config.format)?;
        self.allocate_buffers(config.buffers)?;
        self.start_stream()
    }

    pub fn state(&self) -> State {
        match (&self.format, &self.stream) {
            (None, _) => State::Idle,
            (Some(_), None) => State::Negotiated,
            (Some(_), Some(stream)) if stream.is_active() => State::Streaming,
            (Some(_), Some(_)) => State::BuffersAllocated,
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Format accepted by the driver, once negotiated
    pub fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    /// Returns a control registry sharing this session's device
    pub fn controls(&self) -> Registry {
        Registry::new(self.device.clone())
    }

    /// Sets the upper bound on waiting for a frame
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        if let Some(stream) = self.stream.as_mut() {
            stream.set_timeout(timeout);
        }
    }

    /// Negotiates the capture format and returns what the driver accepted
    ///
    /// Only valid while idle.
    pub fn negotiate(&mut self, format: &Format) -> Result<Format> {
        self.expect(State::Idle, "negotiate")?;

        let actual = self.device.set_format(format)?;
        tracing::info!(
            width = actual.width,
            height = actual.height,
            fourcc = %actual.fourcc,
            size = actual.size,
            "negotiated format"
        );
        self.format = Some(actual);
        Ok(actual)
    }

    /// Requests and maps `count` buffers; returns the number the driver granted
    pub fn allocate_buffers(&mut self, count: u32) -> Result<usize> {
        self.expect(State::Negotiated, "allocate_buffers")?;
        let format = match self.format {
            Some(format) => format,
            None => return Err(self.invalid("allocate_buffers")),
        };

        let res = Arena::allocate(self.device.clone(), &format, count);
        let arena = self.check(res)?;
        let granted = arena.len();
        let mut stream = Stream::new(self.device.clone(), arena, format);
        stream.set_timeout(self.timeout);
        self.stream = Some(stream);
        Ok(granted)
    }

    /// Queues all buffers and starts streaming
    pub fn start_stream(&mut self) -> Result<()> {
        self.expect(State::BuffersAllocated, "start_stream")?;
        let res = match self.stream.as_mut() {
            Some(stream) => stream.start(),
            None => return Err(self.invalid("start_stream")),
        };
        self.check(res)
    }

    /// Waits for the next frame
    ///
    /// The buffer behind the previous frame goes back to the driver first. Waiting is bounded
    /// by the session timeout; [`StreamError::FrameTimeout`] leaves the session streaming. A
    /// disconnected device tears the session down to idle and closes it.
    pub fn get_frame(&mut self) -> Result<Frame<'_>> {
        let res = match self.stream.as_mut() {
            Some(stream) if stream.is_active() => stream.advance(),
            _ => return Err(StreamError::Stopped.into()),
        };
        self.check(res)?;

        self.stream
            .as_ref()
            .and_then(Stream::frame)
            .ok_or_else(|| StreamError::Stopped.into())
    }

    /// Hands the buffer behind the current frame back to the driver
    pub fn release_frame(&mut self) -> Result<()> {
        let res = match self.stream.as_mut() {
            Some(stream) if stream.is_active() => stream.release_frame(),
            _ => return Err(StreamError::Stopped.into()),
        };
        self.check(res)
    }

    /// Stops streaming; the buffers stay allocated
    pub fn stop_stream(&mut self) -> Result<()> {
        self.expect(State::Streaming, "stop_stream")?;
        let res = match self.stream.as_mut() {
            Some(stream) => stream.stop(),
            None => Ok(()),
        };
        self.check(res)
    }

    /// Unmaps all buffers and returns them to the driver
    pub fn release_buffers(&mut self) -> Result<()> {
        self.expect(State::BuffersAllocated, "release_buffers")?;
        let res = match self.stream.take() {
            Some(stream) => stream.release(),
            None => Ok(()),
        };
        self.check(res)
    }

    /// Tears down to idle without closing the device
    pub fn reset(&mut self) -> Result<()> {
        let res = self.teardown();
        self.format = None;
        res
    }

    /// Stops streaming, releases all buffers and closes the device
    ///
    /// Fails with [`DeviceError::AlreadyClosed`] when called a second time.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(DeviceError::AlreadyClosed.into());
        }
        self.closed = true;

        let res = self.reset();
        match self.device.close() {
            // a fatal error closed it already
            Ok(()) | Err(DeviceError::AlreadyClosed) => res,
            Err(e) => Err(e.into()),
        }
    }

    fn teardown(&mut self) -> Result<()> {
        match self.stream.take() {
            Some(stream) => stream.release(),
            None => Ok(()),
        }
    }

    /// Tears the session down if `res` left it unusable
    fn check<T>(&mut self, res: Result<T>) -> Result<T> {
        if let Err(e) = &res {
            if e.is_fatal() {
                tracing::warn!(error = %e, state = %self.state(), "aborting session");
                if let Err(e) = self.reset() {
                    tracing::warn!(error = %e, "failed to release buffers");
                }
                if let Err(e) = self.device.close() {
                    tracing::debug!(error = %e, "device was not open");
                }
            }
        }
        res
    }

    fn expect(&self, state: State, op: &'static str) -> Result<()> {
        if self.state() != state {
            return Err(self.invalid(op));
        }
        Ok(())
    }

    fn invalid(&self, op: &'static str) -> Error {
        Error::InvalidState {
            op,
            state: self.state(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close session");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device.path())
            .field("state", &self.state())
            .field("format", &self.format)
            .field("stream", &self.stream)
            .finish()
    }
}

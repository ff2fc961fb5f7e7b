use std::{sync::Arc, time::Duration};

use crate::buffer::{self, Metadata, State};
use crate::error::{Result, StreamError};
use crate::io::mmap::Arena;
use crate::v4l_sys::v4l2_buffer;
use crate::{Device, Format, Frame};

/// Stream of mapped buffers
///
/// An arena instance is used internally for buffer handling. At most one buffer is lent to the
/// application at a time; it goes back to the driver on the next [`Stream::next`] call or on
/// [`Stream::release_frame`].
pub struct Stream {
    device: Arc<Device>,
    arena: Arena,
    format: Format,
    timeout: Duration,

    active: bool,
    dequeued: Option<(usize, Metadata)>,
    /// Driver sequence number of the previous frame in the current run
    last: Option<u32>,
    /// Extended sequence number of the previous frame
    sequence: Option<u64>,
}

impl Stream {
    /// Default upper bound on waiting for a frame
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    /// Returns a stream for frame capturing
    ///
    /// # Arguments
    ///
    /// * `device` - Device the arena was allocated on
    /// * `arena` - Mapped buffers
    /// * `format` - Format the buffers were sized for
    pub fn new(device: Arc<Device>, arena: Arena, format: Format) -> Self {
        Stream {
            device,
            arena,
            format,
            timeout: Self::DEFAULT_TIMEOUT,
            active: false,
            dequeued: None,
            last: None,
            sequence: None,
        }
    }

    /// Sets the upper bound on waiting for a frame
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Queues all free buffers and starts streaming
    pub fn start(&mut self) -> Result<()> {
        if self.active {
            return Ok(());
        }

        let res = self.queue_and_stream_on();
        if let Err(e) = res {
            // leave nothing behind in the driver's queue
            if let Ok(Err(e)) = self
                .device
                .request(|driver| driver.stream_off(buffer::Type::VideoCapture as u32))
            {
                tracing::warn!(error = %e, "failed to stop stream");
            }
            self.arena.reset();
            return Err(e);
        }

        self.active = true;
        self.last = None;
        tracing::info!(buffers = self.arena.len(), "started stream");
        Ok(())
    }

    fn queue_and_stream_on(&mut self) -> Result<()> {
        for index in 0..self.arena.len() {
            if self.arena.state(index) == Some(State::Free) {
                self.arena.queue(index)?;
            }
        }

        self.device
            .request(|driver| driver.stream_on(buffer::Type::VideoCapture as u32))?
            .map_err(StreamError::from)?;
        Ok(())
    }

    /// Stops streaming, all buffers become free
    ///
    /// Calling this on a stopped stream is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }

        self.active = false;
        self.dequeued = None;
        let typ = buffer::Type::VideoCapture as u32;
        let res = match self.device.request(|driver| driver.stream_off(typ)) {
            Ok(res) => res,
            // the mappings still hold the driver, it must stop before they go away
            Err(e) => {
                tracing::warn!(error = %e, "stopping stream without the device");
                self.arena.driver().stream_off(typ)
            }
        };
        // the driver dropped its queues either way
        self.arena.reset();

        res.map_err(StreamError::from)?;
        tracing::info!("stopped stream");
        Ok(())
    }

    /// Hands the buffer behind the current frame back to the driver
    ///
    /// If the driver refuses the buffer it stays lent, and the next call tries again.
    pub fn release_frame(&mut self) -> Result<()> {
        if let Some((index, _)) = self.dequeued {
            self.arena.queue(index)?;
            self.dequeued = None;
        }
        Ok(())
    }

    /// Returns the frame currently lent to the application, if any
    pub fn frame(&self) -> Option<Frame<'_>> {
        let (index, meta) = self.dequeued?;
        let data = self.arena.view(index, meta.bytesused as usize)?;
        Some(Frame::new(data, meta, self.format))
    }

    /// Fetches the next frame by first requeueing the previous one and then dequeueing
    ///
    /// Blocks for at most the configured timeout.
    pub fn next(&mut self) -> Result<Frame<'_>> {
        self.advance()?;
        self.frame().ok_or_else(|| StreamError::Stopped.into())
    }

    /// Moves the stream forward by one frame without borrowing it
    pub(crate) fn advance(&mut self) -> Result<()> {
        if !self.active {
            return Err(StreamError::Stopped.into());
        }
        self.release_frame()?;

        // waiting must not hold the device lock, controls stay usable meanwhile
        let driver = self.device.driver()?;
        if !driver.wait(self.timeout).map_err(StreamError::from)? {
            return Err(StreamError::FrameTimeout(self.timeout).into());
        }

        let v4l2_buf = self.arena.dequeue()?;
        let meta = self.metadata(&v4l2_buf);
        if meta.dropped > 0 {
            tracing::debug!(
                sequence = meta.sequence,
                dropped = meta.dropped,
                "driver dropped frames"
            );
        }
        self.dequeued = Some((v4l2_buf.index as usize, meta));
        Ok(())
    }

    /// Extends the driver's 32 bit counter and derives gaps
    fn metadata(&mut self, v4l2_buf: &v4l2_buffer) -> Metadata {
        let (sequence, dropped) = match (self.last, self.sequence) {
            (Some(last), Some(prev)) => {
                let delta = u64::from(v4l2_buf.sequence.wrapping_sub(last).max(1));
                (prev + delta, (delta - 1) as u32)
            }
            // drivers restart counting on STREAMON
            (None, Some(prev)) => (prev + 1, 0),
            (_, None) => (u64::from(v4l2_buf.sequence), 0),
        };
        self.last = Some(v4l2_buf.sequence);
        self.sequence = Some(sequence);

        Metadata {
            bytesused: v4l2_buf.bytesused,
            flags: v4l2_buf.flags.into(),
            timestamp: v4l2_buf.timestamp.into(),
            sequence,
            dropped,
        }
    }

    /// Stops streaming and hands all buffers back to the driver
    ///
    /// The buffers are released even if stopping failed.
    pub fn release(mut self) -> Result<()> {
        let stopped = self.stop();
        let released = self.arena.release();
        stopped.and(released)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "failed to stop stream");
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("arena", &self.arena)
            .field("active", &self.active)
            .field("timeout", &self.timeout)
            .finish()
    }
}

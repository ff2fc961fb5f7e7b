use std::{fmt, mem, sync::Arc};

use crate::buffer::{self, State};
use crate::device::Driver;
use crate::error::{BufferError, Result, StreamError};
use crate::memory::{Memory, Mmap};
use crate::v4l_sys::*;
use crate::{Device, Format};

/// Buffers exchanged with the driver need at least two slots, one filling while one is read
const MIN_BUFFERS: u32 = 2;

struct Slot {
    mem: Mmap,
    state: State,
}

/// Manage mapped buffers
///
/// Tracks which side owns every buffer. A buffer can only be queued while free and only be
/// read while dequeued, so the hardware never writes into memory the application is looking at.
///
/// All buffers are unmapped and returned to the driver in the Drop impl.
pub struct Arena {
    device: Arc<Device>,
    /// Kept for stopping the driver when the device is gone but mappings are not
    driver: Arc<dyn Driver>,
    bufs: Vec<Slot>,
    released: bool,
}

impl Arena {
    /// Requests `count` buffers from the driver and maps them
    ///
    /// The driver decides how many buffers it actually grants, the arena holds exactly that
    /// many. Every buffer must be able to hold one image of the negotiated `format`.
    ///
    /// # Arguments
    ///
    /// * `device` - Device the buffers are requested from
    /// * `format` - Format accepted by the driver
    /// * `count` - Number of buffers to request, at least 2
    pub fn allocate(device: Arc<Device>, format: &Format, count: u32) -> Result<Self> {
        if count < MIN_BUFFERS {
            return Err(BufferError::UnsupportedCount {
                requested: count,
                granted: 0,
            }
            .into());
        }

        let granted = request(&device, count)?;
        if granted < MIN_BUFFERS {
            if granted > 0 {
                if let Err(e) = request(&device, 0) {
                    tracing::warn!(error = %e, "failed to free buffers");
                }
            }
            return Err(BufferError::UnsupportedCount {
                requested: count,
                granted,
            }
            .into());
        }
        if granted != count {
            tracing::debug!(requested = count, granted, "driver adjusted the buffer count");
        }

        let driver = device.driver()?;
        // from here on, dropping the arena hands everything back to the driver
        device.claim_buffers();
        let mut arena = Arena {
            device,
            driver: driver.clone(),
            bufs: Vec::with_capacity(granted as usize),
            released: false,
        };

        for index in 0..granted {
            let mut v4l2_buf = descriptor(index);
            arena
                .device
                .request(|driver| driver.query_buffer(&mut v4l2_buf))?
                .map_err(BufferError::Io)?;

            if v4l2_buf.length < format.size {
                return Err(BufferError::Undersized {
                    index,
                    length: v4l2_buf.length,
                    expected: format.size,
                }
                .into());
            }

            let offset = unsafe { v4l2_buf.m.offset };
            let mem = Mmap::new(driver.clone(), v4l2_buf.length as usize, offset)
                .map_err(|source| BufferError::Map { index, source })?;
            arena.bufs.push(Slot {
                mem,
                state: State::Free,
            });
        }

        tracing::info!(
            count = granted,
            length = format.size,
            memory = %Memory::Mmap,
            "allocated buffers"
        );
        Ok(arena)
    }

    /// Number of buffers granted by the driver
    pub fn len(&self) -> usize {
        self.bufs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Ownership state of the buffer at `index`
    pub fn state(&self, index: usize) -> Option<State> {
        self.bufs.get(index).map(|slot| slot.state)
    }

    /// Length of the mapped buffer at `index` in bytes
    pub fn buffer_len(&self, index: usize) -> Option<usize> {
        self.bufs.get(index).map(|slot| slot.mem.len())
    }

    /// Returns the first `len` bytes of a buffer the application owns
    ///
    /// `None` unless the buffer is dequeued.
    pub fn view(&self, index: usize, len: usize) -> Option<&[u8]> {
        let slot = self.bufs.get(index)?;
        if slot.state != State::Dequeued {
            return None;
        }
        // the driver does not touch a buffer between DQBUF and the next QBUF
        Some(unsafe { slot.mem.view(len) })
    }

    /// Hands a free or dequeued buffer to the driver
    pub fn queue(&mut self, index: usize) -> Result<()> {
        let state = self
            .state(index)
            .ok_or(BufferError::UnknownIndex(index as u32))?;
        if state == State::Queued {
            return Err(BufferError::InvalidTransition {
                index,
                op: "queued",
                state,
            }
            .into());
        }

        let mut v4l2_buf = descriptor(index as u32);
        self.device
            .request(|driver| driver.queue_buffer(&mut v4l2_buf))?
            .map_err(StreamError::from)?;

        tracing::trace!(index, "queued buffer");
        self.bufs[index].state = State::Queued;
        Ok(())
    }

    /// Takes the oldest filled buffer from the driver
    ///
    /// Blocks if no buffer is ready yet; wait for the device to become readable first.
    pub fn dequeue(&mut self) -> Result<v4l2_buffer> {
        let mut v4l2_buf = descriptor(0);
        self.device
            .request(|driver| driver.dequeue_buffer(&mut v4l2_buf))?
            .map_err(StreamError::from)?;

        let index = v4l2_buf.index as usize;
        match self.state(index) {
            Some(State::Queued) => {}
            Some(state) => {
                return Err(BufferError::InvalidTransition {
                    index,
                    op: "dequeued",
                    state,
                }
                .into())
            }
            None => return Err(BufferError::UnknownIndex(v4l2_buf.index).into()),
        }

        tracing::trace!(index, sequence = v4l2_buf.sequence, "dequeued buffer");
        self.bufs[index].state = State::Dequeued;
        Ok(v4l2_buf)
    }

    /// Marks every buffer free
    ///
    /// Only valid once the driver has dropped its queues, i.e. after VIDIOC_STREAMOFF.
    pub fn reset(&mut self) {
        for slot in self.bufs.iter_mut() {
            slot.state = State::Free;
        }
    }

    /// Unmaps all buffers and returns them to the driver
    ///
    /// Calling this more than once is a no-op.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let count = self.bufs.len();
        // unmapping happens in the Mmap destructors
        self.bufs.clear();
        self.device.unclaim_buffers();
        request(&self.device, 0)?;

        tracing::info!(count, "released buffers");
        Ok(())
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "failed to release buffers");
        }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("len", &self.bufs.len())
            .field(
                "states",
                &self.bufs.iter().map(|slot| slot.state).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn descriptor(index: u32) -> v4l2_buffer {
    v4l2_buffer {
        index,
        type_: buffer::Type::VideoCapture as u32,
        memory: Memory::Mmap as u32,
        ..unsafe { mem::zeroed() }
    }
}

/// VIDIOC_REQBUFS, returns the granted count
fn request(device: &Device, count: u32) -> Result<u32> {
    let mut v4l2_reqbufs = v4l2_requestbuffers {
        count,
        type_: buffer::Type::VideoCapture as u32,
        memory: Memory::Mmap as u32,
        ..unsafe { mem::zeroed() }
    };
    device
        .request(|driver| driver.request_buffers(&mut v4l2_reqbufs))?
        .map_err(|e| BufferError::from_request(count, e))?;

    Ok(v4l2_reqbufs.count)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::device::fake::FakeDriver;
    use crate::error::Error;
    use crate::FourCC;

    fn setup(fake: &FakeDriver) -> (Arc<Device>, Format) {
        let dev = Device::with_driver("/dev/video0", Arc::new(fake.clone())).unwrap();
        let fmt = dev.set_format(&Format::new(320, 240, FourCC::YUYV)).unwrap();
        (Arc::new(dev), fmt)
    }

    #[test]
    fn buffers_match_the_negotiated_layout() {
        let fake = FakeDriver::new();
        let (dev, fmt) = setup(&fake);
        let arena = Arena::allocate(dev, &fmt, 4).unwrap();

        assert_eq!(arena.len(), 4);
        for index in 0..arena.len() {
            assert_eq!(arena.buffer_len(index), Some(320 * 240 * 2));
            assert_eq!(arena.state(index), Some(State::Free));
        }
        assert_eq!(fake.state().mappings.len(), 4);

        drop(arena);
        assert!(fake.state().mappings.is_empty());
        assert!(fake.state().buffers.is_empty());
    }

    #[test]
    fn driver_count_is_authoritative() {
        let fake = FakeDriver::new();
        fake.state().max_buffers = 3;
        let (dev, fmt) = setup(&fake);

        let arena = Arena::allocate(dev, &fmt, 6).unwrap();
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn too_few_buffers() {
        let fake = FakeDriver::new();
        let (dev, fmt) = setup(&fake);
        assert!(matches!(
            Arena::allocate(dev.clone(), &fmt, 1),
            Err(Error::Buffer(BufferError::UnsupportedCount { requested: 1, .. }))
        ));

        fake.state().max_buffers = 1;
        assert!(matches!(
            Arena::allocate(dev, &fmt, 4),
            Err(Error::Buffer(BufferError::UnsupportedCount {
                requested: 4,
                granted: 1
            }))
        ));
        assert!(fake.state().buffers.is_empty());
    }

    #[test]
    fn allocation_failures() {
        let fake = FakeDriver::new();
        let (dev, fmt) = setup(&fake);

        fake.state().out_of_memory = true;
        assert!(matches!(
            Arena::allocate(dev.clone(), &fmt, 4),
            Err(Error::Buffer(BufferError::InsufficientMemory { requested: 4 }))
        ));

        fake.state().out_of_memory = false;
        fake.state().short_buffers = true;
        assert!(matches!(
            Arena::allocate(dev, &fmt, 4),
            Err(Error::Buffer(BufferError::Undersized { index: 0, .. }))
        ));
        // partially set up buffers are handed back
        assert!(fake.state().mappings.is_empty());
        assert!(fake.state().buffers.is_empty());
    }

    #[test]
    fn queued_buffers_cannot_be_viewed_or_requeued() {
        let fake = FakeDriver::new();
        let (dev, fmt) = setup(&fake);
        let mut arena = Arena::allocate(dev, &fmt, 2).unwrap();

        arena.queue(1).unwrap();
        assert!(arena.view(1, 16).is_none());
        assert!(matches!(
            arena.queue(1),
            Err(Error::Buffer(BufferError::InvalidTransition { index: 1, .. }))
        ));
        assert!(matches!(
            arena.queue(7),
            Err(Error::Buffer(BufferError::UnknownIndex(7)))
        ));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Queue(usize),
        Dequeue,
        Restart,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0usize..5).prop_map(Op::Queue),
            4 => Just(Op::Dequeue),
            1 => Just(Op::Restart),
        ]
    }

    proptest! {
        #[test]
        fn ownership_is_exclusive(ops in prop::collection::vec(op(), 1..64)) {
            let fake = FakeDriver::new();
            let (dev, fmt) = setup(&fake);
            let mut arena = Arena::allocate(dev.clone(), &fmt, 4).unwrap();
            dev.request(|d| d.stream_on(1)).unwrap().unwrap();

            // expected order of completion, mirrors the driver's incoming queue
            let mut model: Vec<State> = vec![State::Free; 4];
            let mut fifo = std::collections::VecDeque::new();

            for op in ops {
                match op {
                    Op::Queue(index) => {
                        let res = arena.queue(index);
                        match model.get(index) {
                            Some(State::Free) | Some(State::Dequeued) => {
                                prop_assert!(res.is_ok());
                                model[index] = State::Queued;
                                fifo.push_back(index);
                            }
                            _ => prop_assert!(res.is_err()),
                        }
                    }
                    Op::Dequeue => {
                        let res = arena.dequeue();
                        match fifo.pop_front() {
                            Some(expected) => {
                                let buf = res.unwrap();
                                prop_assert_eq!(buf.index as usize, expected);
                                model[expected] = State::Dequeued;
                                prop_assert!(arena.view(expected, 1).is_some());
                            }
                            None => prop_assert!(res.is_err()),
                        }
                    }
                    Op::Restart => {
                        dev.request(|d| d.stream_off(1)).unwrap().unwrap();
                        arena.reset();
                        dev.request(|d| d.stream_on(1)).unwrap().unwrap();
                        model.iter_mut().for_each(|s| *s = State::Free);
                        fifo.clear();
                    }
                }

                for (index, state) in model.iter().enumerate() {
                    prop_assert_eq!(arena.state(index), Some(*state));
                }
                prop_assert!(model.iter().filter(|s| **s == State::Queued).count() == fifo.len());
            }
        }
    }
}

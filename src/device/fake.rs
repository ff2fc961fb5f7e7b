//! In-memory driver emulating a single USB camera, with failure injection

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::{io, mem, time::Duration};

use super::Driver;
use crate::capability::Flags as CapFlags;
use crate::control::{id, Flags as CtrlFlags};
use crate::format::FourCC;
use crate::v4l_sys::*;
use crate::{buffer, memory::Memory};

pub(crate) const MAX_WIDTH: u32 = 1920;
pub(crate) const MAX_HEIGHT: u32 = 1080;
const PAGE: u32 = 4096;

const FORMATS: [(FourCC, &str); 3] = [
    (FourCC::YUYV, "YUYV 4:2:2"),
    (FourCC::RGB3, "24-bit RGB 8-8-8"),
    (FourCC::MJPG, "Motion-JPEG"),
];

fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

pub(crate) struct FakeControl {
    pub id: u32,
    pub typ: u32,
    pub name: &'static str,
    pub minimum: i64,
    pub maximum: i64,
    pub step: u64,
    pub default: i64,
    pub flags: CtrlFlags,
    pub value: i32,
    pub menu: Vec<(u32, &'static str)>,
}

impl FakeControl {
    fn new(id: u32, typ: u32, name: &'static str, range: (i64, i64, i64)) -> Self {
        FakeControl {
            id,
            typ,
            name,
            minimum: range.0,
            maximum: range.1,
            step: 1,
            default: range.2,
            flags: CtrlFlags::empty(),
            value: range.2 as i32,
            menu: Vec::new(),
        }
    }
}

pub(crate) struct FakeBuffer {
    pub queued: bool,
}

pub(crate) struct FakeState {
    /// Per-node capabilities reported by QUERYCAP
    pub caps: CapFlags,
    /// QUERYCAP fails with ENOTTY
    pub not_v4l2: bool,
    /// Report half the image size the format needs
    pub short_sizeimage: bool,
    /// S_FMT fails with EINVAL
    pub reject_format: bool,
    /// Report half the image size as buffer length
    pub short_buffers: bool,
    /// REQBUFS fails with ENOMEM
    pub out_of_memory: bool,
    /// mmap fails with ENOMEM
    pub fail_map: bool,
    /// STREAMON fails with EBUSY
    pub busy: bool,
    /// The next QBUF fails with EIO
    pub fail_queue: bool,
    /// No frame ever completes
    pub stalled: bool,
    /// The device was unplugged
    pub disconnected: bool,
    /// QUERY_EXT_CTRL with NEXT_CTRL starts over instead of ending the list
    pub wrap_controls: bool,
    /// Upper bound on granted buffers
    pub max_buffers: u32,
    /// Frames to drop before the next completes
    pub skip: u32,
    /// Next driver sequence number
    pub sequence: u32,

    pub format: v4l2_pix_format,
    pub streaming: bool,
    pub buffers: Vec<FakeBuffer>,
    pub incoming: VecDeque<u32>,
    /// Live mappings by address: (buffer index, length)
    pub mappings: HashMap<usize, (u32, usize)>,
    pub controls: Vec<FakeControl>,

    pub queue_calls: usize,
    pub stream_off_calls: usize,
    /// Live mappings at every STREAMOFF
    pub stream_off_mappings: Vec<usize>,
    pub set_control_calls: usize,
}

impl FakeState {
    pub fn control_value(&self, id: u32) -> Option<i32> {
        self.controls
            .iter()
            .find(|ctrl| ctrl.id == id)
            .map(|ctrl| ctrl.value)
    }

    fn control(&mut self, id: u32) -> io::Result<&mut FakeControl> {
        self.controls
            .iter_mut()
            .find(|ctrl| ctrl.id == id)
            .ok_or_else(|| errno(libc::EINVAL))
    }

    fn adjust(&self, fmt: &mut v4l2_pix_format) {
        let fourcc = FourCC::from(fmt.pixelformat);
        let fourcc = if FORMATS.iter().any(|(f, _)| *f == fourcc) {
            fourcc
        } else {
            FourCC::YUYV
        };

        let width = fmt.width.clamp(16, MAX_WIDTH);
        let height = fmt.height.clamp(16, MAX_HEIGHT);
        let (stride, mut size) = match fourcc.bits_per_pixel() {
            Some(bpp) => (width * bpp / 8, width * height * bpp / 8),
            None => (0, width * height),
        };
        if self.short_sizeimage {
            size /= 2;
        }

        *fmt = v4l2_pix_format {
            width,
            height,
            pixelformat: fourcc.into(),
            field: 1,
            bytesperline: stride,
            sizeimage: size,
            ..unsafe { mem::zeroed() }
        };
    }
}

/// Shared handle to the emulated device; clones observe the same state
#[derive(Clone)]
pub(crate) struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        let mut power_line = FakeControl::new(
            id::POWER_LINE_FREQUENCY,
            3,
            "Power Line Frequency",
            (0, 3, 1),
        );
        // index 2 (60 Hz) is not offered
        power_line.menu = vec![(0, "Disabled"), (1, "50 Hz"), (3, "Auto")];

        let mut saturation = FakeControl::new(id::SATURATION, 1, "Saturation", (0, 100, 50));
        saturation.flags = CtrlFlags::DISABLED;

        let mut exposure =
            FakeControl::new(id::EXPOSURE_ABSOLUTE, 1, "Exposure Time, Absolute", (3, 2047, 250));
        exposure.flags = CtrlFlags::READ_ONLY | CtrlFlags::VOLATILE;

        let mut pan = FakeControl::new(id::PAN_RELATIVE, 1, "Pan, Relative", (-3600, 3600, 0));
        pan.step = 3600;
        pan.flags = CtrlFlags::WRITE_ONLY;

        let mut user_class =
            FakeControl::new((id::USER_BASE & 0xffff_0000) | 1, 6, "User Controls", (0, 0, 0));
        user_class.flags = CtrlFlags::READ_ONLY | CtrlFlags::WRITE_ONLY;
        let mut camera_class =
            FakeControl::new((id::CAMERA_BASE & 0xffff_0000) | 1, 6, "Camera Controls", (0, 0, 0));
        camera_class.flags = CtrlFlags::READ_ONLY | CtrlFlags::WRITE_ONLY;

        let controls = vec![
            user_class,
            FakeControl::new(id::BRIGHTNESS, 1, "Brightness", (0, 255, 128)),
            FakeControl::new(id::CONTRAST, 1, "Contrast", (0, 255, 32)),
            saturation,
            FakeControl::new(id::DO_WHITE_BALANCE, 4, "Do White Balance", (0, 0, 0)),
            FakeControl::new(id::HFLIP, 2, "Horizontal Flip", (0, 1, 0)),
            power_line,
            camera_class,
            exposure,
            pan,
        ];

        let mut state = FakeState {
            caps: CapFlags::VIDEO_CAPTURE | CapFlags::STREAMING,
            not_v4l2: false,
            short_sizeimage: false,
            reject_format: false,
            short_buffers: false,
            out_of_memory: false,
            fail_map: false,
            busy: false,
            fail_queue: false,
            stalled: false,
            disconnected: false,
            wrap_controls: false,
            max_buffers: 8,
            skip: 0,
            sequence: 0,
            format: unsafe { mem::zeroed() },
            streaming: false,
            buffers: Vec::new(),
            incoming: VecDeque::new(),
            mappings: HashMap::new(),
            controls,
            queue_calls: 0,
            stream_off_calls: 0,
            stream_off_mappings: Vec::new(),
            set_control_calls: 0,
        };

        let mut fmt = v4l2_pix_format {
            width: 640,
            height: 480,
            pixelformat: FourCC::YUYV.into(),
            ..unsafe { mem::zeroed() }
        };
        state.adjust(&mut fmt);
        state.format = fmt;

        FakeDriver {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn check_buffer(buf: &v4l2_buffer) -> io::Result<()> {
        if buf.type_ != buffer::Type::VideoCapture as u32 || buf.memory != Memory::Mmap as u32 {
            return Err(errno(libc::EINVAL));
        }
        Ok(())
    }
}

// SAFETY: regions are leaked boxes of `length` bytes, freed only by `unmap`.
unsafe impl Driver for FakeDriver {
    fn query_caps(&self) -> io::Result<v4l2_capability> {
        let state = self.state();
        if state.not_v4l2 {
            return Err(errno(libc::ENOTTY));
        }

        let mut caps: v4l2_capability = unsafe { mem::zeroed() };
        caps.driver[..4].copy_from_slice(b"fake");
        caps.card[..11].copy_from_slice(b"Fake Camera");
        caps.bus_info[..13].copy_from_slice(b"platform:fake");
        caps.version = (6 << 16) | (1 << 8);
        caps.capabilities = (state.caps | CapFlags::META_CAPTURE | CapFlags::DEVICE_CAPS).bits();
        caps.device_caps = state.caps.bits();
        Ok(caps)
    }

    fn enum_format(&self, desc: &mut v4l2_fmtdesc) -> io::Result<()> {
        let (fourcc, name) = FORMATS
            .get(desc.index as usize)
            .ok_or_else(|| errno(libc::EINVAL))?;

        desc.pixelformat = (*fourcc).into();
        desc.flags = if *fourcc == FourCC::MJPG { 1 } else { 0 };
        desc.description = [0; 32];
        desc.description[..name.len()].copy_from_slice(name.as_bytes());
        Ok(())
    }

    fn get_format(&self, fmt: &mut v4l2_format) -> io::Result<()> {
        if fmt.type_ != buffer::Type::VideoCapture as u32 {
            return Err(errno(libc::EINVAL));
        }
        fmt.fmt.pix = self.state().format;
        Ok(())
    }

    fn set_format(&self, fmt: &mut v4l2_format) -> io::Result<()> {
        let mut state = self.state();
        if state.reject_format || fmt.type_ != buffer::Type::VideoCapture as u32 {
            return Err(errno(libc::EINVAL));
        }
        if state.streaming || !state.buffers.is_empty() {
            return Err(errno(libc::EBUSY));
        }

        let mut pix = unsafe { fmt.fmt.pix };
        state.adjust(&mut pix);
        state.format = pix;
        fmt.fmt.pix = pix;
        Ok(())
    }

    fn request_buffers(&self, req: &mut v4l2_requestbuffers) -> io::Result<()> {
        let mut state = self.state();
        if req.type_ != buffer::Type::VideoCapture as u32 || req.memory != Memory::Mmap as u32 {
            return Err(errno(libc::EINVAL));
        }
        if state.streaming || !state.mappings.is_empty() {
            return Err(errno(libc::EBUSY));
        }

        state.buffers.clear();
        state.incoming.clear();
        if req.count == 0 {
            return Ok(());
        }
        if state.out_of_memory {
            return Err(errno(libc::ENOMEM));
        }

        req.count = req.count.min(state.max_buffers);
        state.buffers = (0..req.count)
            .map(|_| FakeBuffer { queued: false })
            .collect();
        Ok(())
    }

    fn query_buffer(&self, buf: &mut v4l2_buffer) -> io::Result<()> {
        Self::check_buffer(buf)?;
        let state = self.state();
        let queued = state
            .buffers
            .get(buf.index as usize)
            .ok_or_else(|| errno(libc::EINVAL))?
            .queued;

        let mut length = state.format.sizeimage;
        if state.short_buffers {
            length /= 2;
        }
        buf.length = length;
        buf.m.offset = buf.index * PAGE;
        buf.flags = if queued {
            buffer::Flags::QUEUED.bits()
        } else {
            0
        };
        Ok(())
    }

    fn queue_buffer(&self, buf: &mut v4l2_buffer) -> io::Result<()> {
        Self::check_buffer(buf)?;
        let mut state = self.state();
        if state.disconnected {
            return Err(errno(libc::ENODEV));
        }
        if state.fail_queue {
            state.fail_queue = false;
            return Err(errno(libc::EIO));
        }
        let index = buf.index;
        let slot = state
            .buffers
            .get_mut(index as usize)
            .ok_or_else(|| errno(libc::EINVAL))?;
        if slot.queued {
            return Err(errno(libc::EINVAL));
        }
        slot.queued = true;
        state.incoming.push_back(index);
        state.queue_calls += 1;
        Ok(())
    }

    fn dequeue_buffer(&self, buf: &mut v4l2_buffer) -> io::Result<()> {
        Self::check_buffer(buf)?;
        let mut state = self.state();
        if state.disconnected {
            return Err(errno(libc::ENODEV));
        }
        if !state.streaming {
            return Err(errno(libc::EINVAL));
        }
        if state.stalled {
            return Err(errno(libc::EAGAIN));
        }
        let index = state.incoming.pop_front().ok_or_else(|| errno(libc::EAGAIN))?;
        if let Some(buf) = state.buffers.get_mut(index as usize) {
            buf.queued = false;
        }

        let sequence = state.sequence.wrapping_add(state.skip);
        state.skip = 0;
        state.sequence = sequence.wrapping_add(1);
        let bytesused = state.format.sizeimage;

        for (&addr, &(mapped, len)) in &state.mappings {
            if mapped == index {
                let data = unsafe { std::slice::from_raw_parts_mut(addr as *mut u8, len) };
                data.fill(sequence as u8);
            }
        }

        buf.bytesused = bytesused;
        buf.flags = (buffer::Flags::DONE | buffer::Flags::TIMESTAMP_MONOTONIC).bits();
        buf.sequence = sequence;
        buf.timestamp.tv_sec = (sequence / 30) as _;
        buf.timestamp.tv_usec = ((sequence % 30) * 33_333) as _;
        buf.m.offset = index * PAGE;
        buf.length = bytesused;
        buf.index = index;
        Ok(())
    }

    fn stream_on(&self, typ: u32) -> io::Result<()> {
        let mut state = self.state();
        if typ != buffer::Type::VideoCapture as u32 || state.buffers.is_empty() {
            return Err(errno(libc::EINVAL));
        }
        if state.busy {
            return Err(errno(libc::EBUSY));
        }
        state.streaming = true;
        Ok(())
    }

    fn stream_off(&self, typ: u32) -> io::Result<()> {
        let mut state = self.state();
        if typ != buffer::Type::VideoCapture as u32 {
            return Err(errno(libc::EINVAL));
        }
        state.stream_off_calls += 1;
        let mapped = state.mappings.len();
        state.stream_off_mappings.push(mapped);
        state.streaming = false;
        state.incoming.clear();
        for buf in state.buffers.iter_mut() {
            buf.queued = false;
        }
        if state.disconnected {
            return Err(errno(libc::ENODEV));
        }
        Ok(())
    }

    fn query_ext_ctrl(&self, query: &mut v4l2_query_ext_ctrl) -> io::Result<()> {
        let state = self.state();
        let next = CtrlFlags::NEXT_CTRL.bits() | CtrlFlags::NEXT_COMPOUND.bits();
        let ctrl = if query.id & next != 0 {
            let after = query.id & !next;
            state
                .controls
                .iter()
                .find(|ctrl| ctrl.id > after)
                .or_else(|| state.controls.first().filter(|_| state.wrap_controls))
        } else {
            state.controls.iter().find(|ctrl| ctrl.id == query.id)
        }
        .ok_or_else(|| errno(libc::EINVAL))?;

        *query = v4l2_query_ext_ctrl {
            id: ctrl.id,
            type_: ctrl.typ,
            minimum: ctrl.minimum,
            maximum: ctrl.maximum,
            step: ctrl.step,
            default_value: ctrl.default,
            flags: ctrl.flags.bits(),
            elem_size: 4,
            elems: 1,
            ..unsafe { mem::zeroed() }
        };
        for (dst, src) in query.name.iter_mut().zip(ctrl.name.bytes()) {
            *dst = src as _;
        }
        Ok(())
    }

    fn query_menu(&self, item: &mut v4l2_querymenu) -> io::Result<()> {
        let mut state = self.state();
        let index = item.index;
        let ctrl = state.control(item.id)?;
        let (_, label) = ctrl
            .menu
            .iter()
            .find(|(i, _)| *i == index)
            .ok_or_else(|| errno(libc::EINVAL))?;

        let mut name = [0u8; 32];
        name[..label.len()].copy_from_slice(label.as_bytes());
        item.__bindgen_anon_1.name = name;
        Ok(())
    }

    fn get_control(&self, ctrl: &mut v4l2_control) -> io::Result<()> {
        let mut state = self.state();
        let target = state.control(ctrl.id)?;
        if target.flags.contains(CtrlFlags::WRITE_ONLY) {
            return Err(errno(libc::EACCES));
        }
        ctrl.value = target.value;
        Ok(())
    }

    fn set_control(&self, ctrl: &mut v4l2_control) -> io::Result<()> {
        let mut state = self.state();
        state.set_control_calls += 1;
        let target = state.control(ctrl.id)?;
        if target.flags.contains(CtrlFlags::READ_ONLY) {
            return Err(errno(libc::EACCES));
        }
        if i64::from(ctrl.value) < target.minimum || i64::from(ctrl.value) > target.maximum {
            return Err(errno(libc::ERANGE));
        }
        target.value = ctrl.value;
        Ok(())
    }

    fn map(&self, length: usize, offset: u32) -> io::Result<*mut u8> {
        let mut state = self.state();
        if state.fail_map {
            return Err(errno(libc::ENOMEM));
        }
        let index = offset / PAGE;
        if offset % PAGE != 0 || index as usize >= state.buffers.len() {
            return Err(errno(libc::EINVAL));
        }

        let ptr = Box::into_raw(vec![0u8; length].into_boxed_slice()) as *mut u8;
        state.mappings.insert(ptr as usize, (index, length));
        Ok(ptr)
    }

    unsafe fn unmap(&self, ptr: *mut u8, length: usize) -> io::Result<()> {
        let mut state = self.state();
        match state.mappings.remove(&(ptr as usize)) {
            Some((_, len)) if len == length => {
                drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, length)));
                Ok(())
            }
            _ => Err(errno(libc::EINVAL)),
        }
    }

    fn wait(&self, _timeout: Duration) -> io::Result<bool> {
        let state = self.state();
        if state.disconnected {
            return Err(errno(libc::ENODEV));
        }
        Ok(state.streaming && !state.stalled && !state.incoming.is_empty())
    }
}

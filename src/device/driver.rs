use std::{io, path::Path, time::Duration};

use crate::v4l2;
use crate::v4l_sys::*;

/// Request/response layer of a video4linux driver
///
/// Every method mirrors one ioctl (or system call) and follows its in/out semantics: the
/// argument struct carries the request and is overwritten with the driver's answer. Errors are
/// raw OS errors so callers can translate them by errno.
///
/// [`Handle`] talks to the kernel. Other implementations can stand in for it, e.g. to route
/// requests through a userspace library or to emulate a device.
///
/// # Safety
///
/// Frames are read straight out of the memory returned by [`Driver::map`]. A successful `map`
/// must return a region that is valid for reads and writes of `length` bytes and stays valid
/// until it is passed to [`Driver::unmap`]. The region must not be handed out twice.
///
/// Implementations therefore have to be declared `unsafe impl`:
///
/// ```compile_fail
/// use std::{io, time::Duration};
/// use v4l_capture::device::Driver;
/// use v4l_capture::v4l_sys::*;
///
/// struct Null;
///
/// impl Driver for Null {
///     fn query_caps(&self) -> io::Result<v4l2_capability> { unimplemented!() }
///     fn enum_format(&self, _: &mut v4l2_fmtdesc) -> io::Result<()> { unimplemented!() }
///     fn get_format(&self, _: &mut v4l2_format) -> io::Result<()> { unimplemented!() }
///     fn set_format(&self, _: &mut v4l2_format) -> io::Result<()> { unimplemented!() }
///     fn request_buffers(&self, _: &mut v4l2_requestbuffers) -> io::Result<()> { unimplemented!() }
///     fn query_buffer(&self, _: &mut v4l2_buffer) -> io::Result<()> { unimplemented!() }
///     fn queue_buffer(&self, _: &mut v4l2_buffer) -> io::Result<()> { unimplemented!() }
///     fn dequeue_buffer(&self, _: &mut v4l2_buffer) -> io::Result<()> { unimplemented!() }
///     fn stream_on(&self, _: u32) -> io::Result<()> { unimplemented!() }
///     fn stream_off(&self, _: u32) -> io::Result<()> { unimplemented!() }
///     fn query_ext_ctrl(&self, _: &mut v4l2_query_ext_ctrl) -> io::Result<()> { unimplemented!() }
///     fn query_menu(&self, _: &mut v4l2_querymenu) -> io::Result<()> { unimplemented!() }
///     fn get_control(&self, _: &mut v4l2_control) -> io::Result<()> { unimplemented!() }
///     fn set_control(&self, _: &mut v4l2_control) -> io::Result<()> { unimplemented!() }
///     fn map(&self, _: usize, _: u32) -> io::Result<*mut u8> { Ok(std::ptr::null_mut()) }
///     unsafe fn unmap(&self, _: *mut u8, _: usize) -> io::Result<()> { Ok(()) }
///     fn wait(&self, _: Duration) -> io::Result<bool> { Ok(true) }
/// }
/// ```
pub unsafe trait Driver: Send + Sync {
    /// VIDIOC_QUERYCAP
    fn query_caps(&self) -> io::Result<v4l2_capability>;

    /// VIDIOC_ENUM_FMT
    fn enum_format(&self, desc: &mut v4l2_fmtdesc) -> io::Result<()>;

    /// VIDIOC_G_FMT
    fn get_format(&self, fmt: &mut v4l2_format) -> io::Result<()>;

    /// VIDIOC_S_FMT
    fn set_format(&self, fmt: &mut v4l2_format) -> io::Result<()>;

    /// VIDIOC_REQBUFS
    fn request_buffers(&self, req: &mut v4l2_requestbuffers) -> io::Result<()>;

    /// VIDIOC_QUERYBUF
    fn query_buffer(&self, buf: &mut v4l2_buffer) -> io::Result<()>;

    /// VIDIOC_QBUF
    fn queue_buffer(&self, buf: &mut v4l2_buffer) -> io::Result<()>;

    /// VIDIOC_DQBUF
    fn dequeue_buffer(&self, buf: &mut v4l2_buffer) -> io::Result<()>;

    /// VIDIOC_STREAMON
    fn stream_on(&self, typ: u32) -> io::Result<()>;

    /// VIDIOC_STREAMOFF
    fn stream_off(&self, typ: u32) -> io::Result<()>;

    /// VIDIOC_QUERY_EXT_CTRL
    fn query_ext_ctrl(&self, ctrl: &mut v4l2_query_ext_ctrl) -> io::Result<()>;

    /// VIDIOC_QUERYMENU
    fn query_menu(&self, item: &mut v4l2_querymenu) -> io::Result<()>;

    /// VIDIOC_G_CTRL
    fn get_control(&self, ctrl: &mut v4l2_control) -> io::Result<()>;

    /// VIDIOC_S_CTRL
    fn set_control(&self, ctrl: &mut v4l2_control) -> io::Result<()>;

    /// Maps the buffer memory the driver advertised at `offset`
    ///
    /// The returned region must hold at least `length` bytes until it is unmapped.
    fn map(&self, length: usize, offset: u32) -> io::Result<*mut u8>;

    /// Releases a region returned by [`Driver::map`]
    ///
    /// # Safety
    ///
    /// `ptr` and `length` must come from a single successful `map` call and must not be used
    /// afterwards.
    unsafe fn unmap(&self, ptr: *mut u8, length: usize) -> io::Result<()>;

    /// Blocks until a buffer can be dequeued or the timeout expires
    ///
    /// Returns `Ok(false)` on timeout.
    fn wait(&self, timeout: Duration) -> io::Result<bool>;
}

/// Kernel device handle, owning the file descriptor
///
/// The descriptor is closed when the handle is dropped.
#[derive(Debug)]
pub struct Handle {
    fd: std::os::raw::c_int,
}

impl Handle {
    /// Opens a device node for reading and writing
    ///
    /// # Arguments
    ///
    /// * `path` - Path (e.g. "/dev/video0")
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let fd = v4l2::open(path, libc::O_RDWR | libc::O_CLOEXEC)?;
        Ok(Handle { fd })
    }

    /// Returns the raw fd of the device
    pub fn fd(&self) -> std::os::raw::c_int {
        self.fd
    }

    fn ioctl<T>(&self, request: v4l2::vidioc::_IOC_TYPE, arg: &mut T) -> io::Result<()> {
        unsafe {
            v4l2::ioctl(
                self.fd,
                request,
                arg as *mut T as *mut std::os::raw::c_void,
            )
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if let Err(e) = v4l2::close(self.fd) {
            tracing::warn!(fd = self.fd, error = %e, "failed to close device");
        }
    }
}

// SAFETY: mmap either fails or maps `length` bytes that stay mapped until munmap.
unsafe impl Driver for Handle {
    fn query_caps(&self) -> io::Result<v4l2_capability> {
        let mut caps: v4l2_capability = unsafe { std::mem::zeroed() };
        self.ioctl(v4l2::vidioc::VIDIOC_QUERYCAP, &mut caps)?;
        Ok(caps)
    }

    fn enum_format(&self, desc: &mut v4l2_fmtdesc) -> io::Result<()> {
        self.ioctl(v4l2::vidioc::VIDIOC_ENUM_FMT, desc)
    }

    fn get_format(&self, fmt: &mut v4l2_format) -> io::Result<()> {
        self.ioctl(v4l2::vidioc::VIDIOC_G_FMT, fmt)
    }

    fn set_format(&self, fmt: &mut v4l2_format) -> io::Result<()> {
        self.ioctl(v4l2::vidioc::VIDIOC_S_FMT, fmt)
    }

    fn request_buffers(&self, req: &mut v4l2_requestbuffers) -> io::Result<()> {
        self.ioctl(v4l2::vidioc::VIDIOC_REQBUFS, req)
    }

    fn query_buffer(&self, buf: &mut v4l2_buffer) -> io::Result<()> {
        self.ioctl(v4l2::vidioc::VIDIOC_QUERYBUF, buf)
    }

    fn queue_buffer(&self, buf: &mut v4l2_buffer) -> io::Result<()> {
        self.ioctl(v4l2::vidioc::VIDIOC_QBUF, buf)
    }

    fn dequeue_buffer(&self, buf: &mut v4l2_buffer) -> io::Result<()> {
        self.ioctl(v4l2::vidioc::VIDIOC_DQBUF, buf)
    }

    fn stream_on(&self, typ: u32) -> io::Result<()> {
        let mut typ = typ as std::os::raw::c_int;
        self.ioctl(v4l2::vidioc::VIDIOC_STREAMON, &mut typ)
    }

    fn stream_off(&self, typ: u32) -> io::Result<()> {
        let mut typ = typ as std::os::raw::c_int;
        self.ioctl(v4l2::vidioc::VIDIOC_STREAMOFF, &mut typ)
    }

    fn query_ext_ctrl(&self, ctrl: &mut v4l2_query_ext_ctrl) -> io::Result<()> {
        self.ioctl(v4l2::vidioc::VIDIOC_QUERY_EXT_CTRL, ctrl)
    }

    fn query_menu(&self, item: &mut v4l2_querymenu) -> io::Result<()> {
        self.ioctl(v4l2::vidioc::VIDIOC_QUERYMENU, item)
    }

    fn get_control(&self, ctrl: &mut v4l2_control) -> io::Result<()> {
        self.ioctl(v4l2::vidioc::VIDIOC_G_CTRL, ctrl)
    }

    fn set_control(&self, ctrl: &mut v4l2_control) -> io::Result<()> {
        self.ioctl(v4l2::vidioc::VIDIOC_S_CTRL, ctrl)
    }

    fn map(&self, length: usize, offset: u32) -> io::Result<*mut u8> {
        let ptr = unsafe { v4l2::mmap(self.fd, length, offset as libc::off_t)? };
        Ok(ptr as *mut u8)
    }

    unsafe fn unmap(&self, ptr: *mut u8, length: usize) -> io::Result<()> {
        v4l2::munmap(ptr as *mut std::os::raw::c_void, length)
    }

    fn wait(&self, timeout: Duration) -> io::Result<bool> {
        v4l2::poll_readable(self.fd, timeout)
    }
}

//! This crate provides safe bindings to the Video for Linux (V4L2) stack for capturing frames
//! from cameras and adjusting their controls.
//!
//! Frames are streamed through driver-allocated buffers that are mapped into the process, so
//! image data reaches the application without a copy. A [`Session`] drives a device through
//! format negotiation, buffer allocation and streaming and tears everything down in order;
//! a [`control::Registry`] queries and adjusts camera controls from any thread meanwhile.
//!
//! ```no_run
//! use v4l_capture::{Format, FourCC, Session};
//!
//! let mut session = Session::open("/dev/video0").expect("Failed to open device");
//! let fmt = session
//!     .negotiate(&Format::new(1920, 1080, FourCC::RGB3))
//!     .expect("Failed to set format");
//! session.allocate_buffers(4).expect("Failed to allocate buffers");
//! session.start_stream().expect("Failed to start stream");
//!
//! for _ in 0..2 {
//!     let frame = session.get_frame().expect("Failed to capture frame");
//!     println!(
//!         "Frame #{}: {} bytes of {}x{} {}",
//!         frame.sequence(),
//!         frame.bytes_used(),
//!         fmt.width,
//!         fmt.height,
//!         fmt.fourcc
//!     );
//! }
//!
//! session.close().expect("Failed to close session");
//! ```

pub use v4l2_sys as v4l_sys;

pub mod v4l2;

pub mod buffer;
pub mod capability;
pub mod control;
pub mod device;
pub mod error;
pub mod format;
pub mod io;
pub mod memory;

mod config;
mod frame;
mod session;
mod timestamp;

pub use capability::Capabilities;
pub use config::Config;
pub use device::Device;
pub use error::{Error, Result};
pub use format::{Format, FourCC};
pub use frame::Frame;
pub use session::{Session, State};
pub use timestamp::Timestamp;

pub mod prelude {
    pub use crate::control::Registry;
    pub use crate::{Config, Device, Error, Format, FourCC, Frame, Session, State};
}

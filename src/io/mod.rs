//! Streaming I/O
//!
//! Frames are exchanged through buffers the driver allocates and the process maps, see
//! [`mmap::Arena`] and [`mmap::Stream`].

pub mod mmap;

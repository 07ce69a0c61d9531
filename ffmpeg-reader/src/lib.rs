//! Chunked decoding of audio and video sources.
//!
//! A [`StreamReader`] opens a source through a [`backend::Demuxer`], routes
//! packets to one decoder per source stream and fans decoded frames out to
//! any number of filtered output streams, each buffered into fixed-size
//! [`Chunk`]s. The FFmpeg backend lives behind the `ffmpeg` feature.

pub mod backend;
pub mod buffer;
pub mod config;
pub mod error;
pub mod frame;
pub mod media;
pub mod processor;
pub mod reader;
pub mod sink;
pub mod stream;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

#[cfg(test)]
mod testing;

pub use backend::Status;
pub use config::{OpenOptions, StreamConfig};
pub use error::{Error, Result};
pub use frame::{Chunk, Frame, FrameLayout};
pub use media::{Device, MediaKind, TimeBase};
pub use reader::{Chunks, Progress, StreamReader};
pub use stream::{Metadata, OutputStreamInfo, SrcStreamInfo};

/// Registers FFmpeg components (formats, devices, filters). Call once at
/// startup before opening device inputs such as v4l2 or x11grab.
#[cfg(feature = "ffmpeg")]
pub fn init() -> Result<()> {
    ffmpeg_next::init()?;
    ffmpeg_next::device::register_all();
    Ok(())
}

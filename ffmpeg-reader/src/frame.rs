use std::fmt::{Display, Formatter};

use bytes::{Bytes, BytesMut};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::media::Device;

/// Shape of the units carried by a [`Frame`] or [`Chunk`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FrameLayout {
    /// Interleaved samples; one unit is one sample for every channel.
    Audio {
        sample_rate: u32,
        channels: u32,
        sample_format: String,
    },
    /// One unit is one picture, planes stored back to back without padding.
    Video {
        width: u32,
        height: u32,
        pixel_format: String,
    },
}

impl Display for FrameLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameLayout::Audio {
                sample_rate,
                channels,
                sample_format,
            } => write!(f, "audio {}Hz {}ch {}", sample_rate, channels, sample_format),
            FrameLayout::Video {
                width,
                height,
                pixel_format,
            } => write!(f, "video {}x{} {}", width, height, pixel_format),
        }
    }
}

/// A packed block of decoded and filtered units (samples or pictures).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pts: Option<f64>,
    unit_duration: f64,
    num_frames: usize,
    layout: FrameLayout,
    data: Bytes,
}

impl Frame {
    /// `pts` and `unit_duration` are in seconds. `data` must hold exactly
    /// `num_frames` equally sized units.
    pub fn new(
        pts: Option<f64>,
        unit_duration: f64,
        num_frames: usize,
        layout: FrameLayout,
        data: Bytes,
    ) -> Result<Self> {
        if num_frames == 0 || data.len() % num_frames != 0 {
            return Err(Error::invalid(format!(
                "{} bytes cannot be split into {} units",
                data.len(),
                num_frames
            )));
        }
        Ok(Self {
            pts,
            unit_duration,
            num_frames,
            layout,
            data,
        })
    }

    pub fn pts(&self) -> Option<f64> {
        self.pts
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn unit_size(&self) -> usize {
        self.data.len() / self.num_frames
    }

    /// Splits after `at` units. Both halves share the payload.
    pub fn split_at(self, at: usize) -> (Frame, Frame) {
        debug_assert!(at > 0 && at < self.num_frames);
        let offset = at * self.unit_size();
        let head = Frame {
            pts: self.pts,
            unit_duration: self.unit_duration,
            num_frames: at,
            layout: self.layout.clone(),
            data: self.data.slice(..offset),
        };
        let tail = Frame {
            pts: self.pts.map(|pts| pts + at as f64 * self.unit_duration),
            unit_duration: self.unit_duration,
            num_frames: self.num_frames - at,
            layout: self.layout,
            data: self.data.slice(offset..),
        };
        (head, tail)
    }

    /// Fails with [`Error::LayoutMismatch`] unless `other` can be appended.
    pub fn ensure_same_layout(&self, other: &Frame) -> Result<()> {
        if self.layout != other.layout || self.unit_size() != other.unit_size() {
            return Err(Error::LayoutMismatch {
                expected: self.layout.to_string(),
                found: other.layout.to_string(),
            });
        }
        Ok(())
    }

    /// Appends `other` after `self`. Layouts must match.
    pub fn concat(self, other: Frame) -> Result<Frame> {
        self.ensure_same_layout(&other)?;
        let mut data = BytesMut::with_capacity(self.data.len() + other.data.len());
        data.extend_from_slice(&self.data);
        data.extend_from_slice(&other.data);
        Ok(Frame {
            pts: self.pts.or(other.pts),
            unit_duration: self.unit_duration,
            num_frames: self.num_frames + other.num_frames,
            layout: self.layout,
            data: data.freeze(),
        })
    }

    pub(crate) fn into_chunk(self, device: Device) -> Chunk {
        Chunk {
            pts: self.pts,
            num_frames: self.num_frames,
            layout: self.layout,
            device,
            data: self.data,
        }
    }
}

/// A batch of units handed to the caller by `pop_chunks`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Presentation time of the first unit, in seconds.
    pub pts: Option<f64>,
    pub num_frames: usize,
    pub layout: FrameLayout,
    pub device: Device,
    pub data: Bytes,
}

impl Display for Chunk {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Chunk pts: {:?}, num_frames: {}, layout: {}, device: {}, data_len: {}",
            self.pts,
            self.num_frames,
            self.layout,
            self.device,
            self.data.len()
        )
    }
}

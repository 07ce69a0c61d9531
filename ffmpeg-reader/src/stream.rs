use std::collections::BTreeMap;

use serde::Serialize;

use crate::media::{Device, MediaKind, TimeBase};

/// Key/value metadata read from the container or a stream.
pub type Metadata = BTreeMap<String, String>;

/// Immutable description of one elementary stream of the opened source,
/// captured once the demuxer has probed the container.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStream {
    pub index: usize,
    pub kind: MediaKind,
    pub codec_name: String,
    pub codec_long_name: String,
    /// Sample or pixel format name. `None` when the format could not be
    /// detected, which happens with some file-like sources.
    pub format_name: Option<String>,
    pub bit_rate: i64,
    /// Number of frames as declared by the container, 0 if unknown.
    pub num_frames: i64,
    pub bits_per_sample: i32,
    pub time_base: TimeBase,
    pub sample_rate: Option<f64>,
    pub num_channels: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub metadata: Metadata,
}

impl SourceStream {
    pub fn new(index: usize, kind: MediaKind, time_base: TimeBase) -> Self {
        Self {
            index,
            kind,
            codec_name: String::new(),
            codec_long_name: String::new(),
            format_name: None,
            bit_rate: 0,
            num_frames: 0,
            bits_per_sample: 0,
            time_base,
            sample_rate: None,
            num_channels: None,
            width: None,
            height: None,
            frame_rate: None,
            metadata: Metadata::new(),
        }
    }

    pub fn info(&self) -> SrcStreamInfo {
        let (sample_rate, num_channels) = match self.kind {
            MediaKind::Audio => (self.sample_rate, self.num_channels),
            _ => (None, None),
        };
        let (width, height, frame_rate) = match self.kind {
            MediaKind::Video => (self.width, self.height, self.frame_rate),
            _ => (None, None, None),
        };
        SrcStreamInfo {
            media_kind: self.kind,
            codec_name: self.codec_name.clone(),
            codec_long_name: self.codec_long_name.clone(),
            format_name: self.format_name.clone(),
            bit_rate: self.bit_rate,
            num_frames: self.num_frames,
            bits_per_sample: self.bits_per_sample,
            time_base: self.time_base,
            metadata: self.metadata.clone(),
            sample_rate,
            num_channels,
            width,
            height,
            frame_rate,
        }
    }
}

/// Caller-facing view of a source stream. Kind-specific fields are only set
/// for the matching kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SrcStreamInfo {
    pub media_kind: MediaKind,
    pub codec_name: String,
    pub codec_long_name: String,
    pub format_name: Option<String>,
    pub bit_rate: i64,
    pub num_frames: i64,
    pub bits_per_sample: i32,
    /// Time base of the stream's timestamps.
    pub time_base: TimeBase,
    pub metadata: Metadata,
    /// Audio only.
    pub sample_rate: Option<f64>,
    /// Audio only.
    pub num_channels: Option<u32>,
    /// Video only.
    pub width: Option<u32>,
    /// Video only.
    pub height: Option<u32>,
    /// Video only.
    pub frame_rate: Option<f64>,
}

/// Caller-facing view of a configured output stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputStreamInfo {
    pub source_index: usize,
    pub filter_description: String,
    pub device: Device,
    pub frames_per_chunk: Option<usize>,
    pub num_chunks: Option<usize>,
}

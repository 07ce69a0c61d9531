use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stream::Metadata;

/// Chunking, filtering and decoding parameters of one output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Units per chunk. `None` returns everything buffered as one chunk.
    pub frames_per_chunk: Option<usize>,
    /// Chunks retained before the oldest are dropped. `None` = unbounded.
    pub num_chunks: Option<usize>,
    pub filter_desc: Option<String>,
    pub decoder: Option<String>,
    pub decoder_options: Metadata,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            frames_per_chunk: None,
            num_chunks: Some(3),
            filter_desc: None,
            decoder: None,
            decoder_options: Metadata::new(),
        }
    }
}

impl StreamConfig {
    pub fn new(frames_per_chunk: Option<usize>, num_chunks: Option<usize>) -> Self {
        Self {
            frames_per_chunk,
            num_chunks,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter_desc: &str) -> Self {
        self.filter_desc = Some(filter_desc.to_string());
        self
    }

    pub fn with_decoder(mut self, decoder: &str) -> Self {
        self.decoder = Some(decoder.to_string());
        self
    }

    pub fn with_decoder_option(mut self, key: &str, value: &str) -> Self {
        self.decoder_options
            .insert(key.to_string(), value.to_string());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.frames_per_chunk == Some(0) {
            return Err(Error::invalid("frames_per_chunk must be positive"));
        }
        if self.num_chunks == Some(0) {
            return Err(Error::invalid("num_chunks must be positive"));
        }
        Ok(())
    }
}

/// How a source is opened by the ffmpeg backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenOptions {
    /// Forces an input format (e.g. "mp3", "v4l2", "lavfi").
    pub format: Option<String>,
    /// Demuxer/protocol options.
    pub options: Metadata,
}

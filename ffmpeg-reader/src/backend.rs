//! Seams to the demux/decode/filter library.
//!
//! The reader never decodes or filters by itself; it decides when these
//! collaborators are invoked. [`crate::ffmpeg`] implements them on top of
//! libav, tests use a scripted in-memory implementation.

use crate::error::Result;
use crate::frame::Frame;
use crate::media::{Device, MediaKind};
use crate::stream::{Metadata, SourceStream};

/// Outcome of a non-blocking pull from a demuxer, decoder or filter graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Status<T> {
    Ready(T),
    /// Nothing available yet; feed more input or retry later.
    Again,
    /// No more output will ever be produced.
    Eof,
}

/// A compressed packet as delivered by the demuxer.
pub trait Packet {
    fn stream_index(&self) -> usize;
}

/// Decoder selection for one source stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecoderConfig {
    /// Decoder name overriding the codec's default decoder.
    pub name: Option<String>,
    pub options: Metadata,
    pub device: Device,
}

pub trait Demuxer {
    type Packet: Packet;
    type Decoder: Decoder<Packet = Self::Packet>;
    type Filter: FilterGraph<Input = <Self::Decoder as Decoder>::Frame>;

    /// Determines stream information; must succeed before any other call.
    fn probe(&mut self) -> Result<()>;

    fn streams(&self) -> &[SourceStream];

    fn metadata(&self) -> Metadata;

    /// Library heuristic for the most suitable stream of `kind`.
    fn best_stream(&self, kind: MediaKind) -> Option<usize>;

    /// Discarded streams are skipped by `read_packet`.
    fn set_discard(&mut self, index: usize, discard: bool);

    fn read_packet(&mut self) -> Result<Status<Self::Packet>>;

    /// Seeks every stream to the nearest point at or before `timestamp`
    /// seconds.
    fn seek(&mut self, timestamp: f64) -> Result<()>;

    fn open_decoder(&self, index: usize, config: &DecoderConfig) -> Result<Self::Decoder>;

    fn open_filter(&self, index: usize, description: &str) -> Result<Self::Filter>;
}

pub trait Decoder {
    type Packet;
    type Frame;

    /// Submits a packet, or signals end of input with `None`.
    fn send(&mut self, packet: Option<&Self::Packet>) -> Result<()>;

    fn receive(&mut self) -> Result<Status<Self::Frame>>;

    /// Drops internal state so decoding can restart after a seek.
    fn flush(&mut self);
}

pub trait FilterGraph {
    type Input;

    /// Pushes a decoded frame, or signals end of input with `None`.
    fn push(&mut self, frame: Option<&Self::Input>) -> Result<()>;

    fn pull(&mut self) -> Result<Status<Frame>>;

    /// Rebuilds the graph from its description, dropping buffered frames.
    fn reset(&mut self) -> Result<()>;

    fn description(&self) -> &str;
}

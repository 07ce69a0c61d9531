//! Scripted in-memory backend used by the unit tests.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::backend::{Decoder, DecoderConfig, Demuxer, FilterGraph, Packet, Status};
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameLayout};
use crate::media::{MediaKind, TimeBase};
use crate::stream::{Metadata, SourceStream};

/// Audio streams decode at 40 samples per second, one byte per sample.
pub const SAMPLE_RATE: u32 = 40;
/// Packets are 0.1s apart.
pub const PACKET_INTERVAL: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct FakePacket {
    stream_index: usize,
    pts: f64,
    units: usize,
    corrupt: bool,
}

impl FakePacket {
    pub fn new(stream_index: usize, pts: f64, units: usize) -> Self {
        Self {
            stream_index,
            pts,
            units,
            corrupt: false,
        }
    }

    pub fn corrupt(stream_index: usize, pts: f64) -> Self {
        Self {
            corrupt: true,
            ..Self::new(stream_index, pts, 1)
        }
    }
}

impl Packet for FakePacket {
    fn stream_index(&self) -> usize {
        self.stream_index
    }
}

pub struct FakeDemuxer {
    streams: Vec<SourceStream>,
    packets: Vec<FakePacket>,
    position: usize,
    discard: Vec<bool>,
    delivered: Vec<usize>,
    transient_reads: usize,
    read_error_at: Option<usize>,
    decoder_delay: usize,
    probe_fails: bool,
    metadata: Metadata,
}

fn audio_stream(index: usize) -> SourceStream {
    let time_base = TimeBase::new(1, SAMPLE_RATE as i32);
    let mut stream = SourceStream::new(index, MediaKind::Audio, time_base);
    stream.codec_name = "pcm_u8".to_string();
    stream.codec_long_name = "PCM unsigned 8-bit".to_string();
    stream.format_name = Some("u8".to_string());
    stream.sample_rate = Some(SAMPLE_RATE as f64);
    stream.num_channels = Some(1);
    stream.bits_per_sample = 8;
    stream
}

fn video_stream(index: usize) -> SourceStream {
    let mut stream = SourceStream::new(index, MediaKind::Video, TimeBase::new(1, 10));
    stream.codec_name = "rawvideo".to_string();
    stream.codec_long_name = "raw video".to_string();
    stream.format_name = Some("gray".to_string());
    stream.width = Some(2);
    stream.height = Some(2);
    stream.frame_rate = Some(10.0);
    stream
}

fn subtitle_stream(index: usize) -> SourceStream {
    let mut stream = SourceStream::new(index, MediaKind::Other, TimeBase::new(1, 1000));
    stream.codec_name = "subrip".to_string();
    stream
}

impl FakeDemuxer {
    pub fn new(streams: Vec<SourceStream>, packets: Vec<FakePacket>) -> Self {
        let discard = vec![false; streams.len()];
        Self {
            streams,
            packets,
            position: 0,
            discard,
            delivered: Vec::new(),
            transient_reads: 0,
            read_error_at: None,
            decoder_delay: 0,
            probe_fails: false,
            metadata: Metadata::new(),
        }
    }

    /// One audio stream, ten packets of `samples` samples each.
    pub fn audio_only(samples: usize) -> Self {
        let packets = (0..10)
            .map(|i| FakePacket::new(0, i as f64 * PACKET_INTERVAL, samples))
            .collect();
        Self::new(vec![audio_stream(0)], packets)
    }

    /// Audio (0), video (1) and subtitle (2) streams, ten interleaved packets
    /// each. Audio packets carry 4 samples, video packets one picture.
    pub fn audio_video() -> Self {
        let mut packets = Vec::new();
        for i in 0..10 {
            let pts = i as f64 * PACKET_INTERVAL;
            packets.push(FakePacket::new(0, pts, 4));
            packets.push(FakePacket::new(1, pts, 1));
            packets.push(FakePacket::new(2, pts, 1));
        }
        let mut demuxer = Self::new(
            vec![audio_stream(0), video_stream(1), subtitle_stream(2)],
            packets,
        );
        demuxer
            .metadata
            .insert("title".to_string(), "fake source".to_string());
        demuxer
    }

    pub fn with_decoder_delay(mut self, delay: usize) -> Self {
        self.decoder_delay = delay;
        self
    }

    /// The next `count` reads report a transient condition.
    pub fn with_transient_reads(mut self, count: usize) -> Self {
        self.transient_reads = count;
        self
    }

    pub fn with_read_error_at(mut self, position: usize) -> Self {
        self.read_error_at = Some(position);
        self
    }

    pub fn with_probe_failure(mut self) -> Self {
        self.probe_fails = true;
        self
    }

    pub fn with_undetected_format(mut self, index: usize) -> Self {
        self.streams[index].format_name = None;
        self
    }

    /// Stream indices of every packet handed out so far.
    pub fn delivered(&self) -> &[usize] {
        &self.delivered
    }

    pub fn is_discarded(&self, index: usize) -> bool {
        self.discard[index]
    }
}

impl Demuxer for FakeDemuxer {
    type Packet = FakePacket;
    type Decoder = FakeDecoder;
    type Filter = FakeFilter;

    fn probe(&mut self) -> Result<()> {
        if self.probe_fails {
            return Err(anyhow::anyhow!("invalid data found when processing input").into());
        }
        Ok(())
    }

    fn streams(&self) -> &[SourceStream] {
        &self.streams
    }

    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn best_stream(&self, kind: MediaKind) -> Option<usize> {
        self.streams.iter().find(|s| s.kind == kind).map(|s| s.index)
    }

    fn set_discard(&mut self, index: usize, discard: bool) {
        self.discard[index] = discard;
    }

    fn read_packet(&mut self) -> Result<Status<FakePacket>> {
        if self.transient_reads > 0 {
            self.transient_reads -= 1;
            return Ok(Status::Again);
        }
        loop {
            if self.read_error_at == Some(self.position) {
                return Err(anyhow::anyhow!("i/o error").into());
            }
            let Some(packet) = self.packets.get(self.position) else {
                return Ok(Status::Eof);
            };
            self.position += 1;
            if self.discard[packet.stream_index] {
                continue;
            }
            self.delivered.push(packet.stream_index);
            return Ok(Status::Ready(packet.clone()));
        }
    }

    fn seek(&mut self, timestamp: f64) -> Result<()> {
        let seek_point = self
            .packets
            .iter()
            .map(|p| p.pts)
            .filter(|pts| *pts <= timestamp)
            .fold(0.0, f64::max);
        self.position = self
            .packets
            .iter()
            .position(|p| p.pts >= seek_point)
            .unwrap_or(self.packets.len());
        Ok(())
    }

    fn open_decoder(&self, index: usize, config: &DecoderConfig) -> Result<FakeDecoder> {
        if let Some(name) = config.name.as_deref() {
            if name != "fake" {
                return Err(Error::invalid(format!("unknown decoder: {}", name)));
            }
        }
        let stream = &self.streams[index];
        let (layout, unit_duration) = match stream.kind {
            MediaKind::Audio => (
                FrameLayout::Audio {
                    sample_rate: SAMPLE_RATE,
                    channels: 1,
                    sample_format: "u8".to_string(),
                },
                1.0 / SAMPLE_RATE as f64,
            ),
            MediaKind::Video => (
                FrameLayout::Video {
                    width: 2,
                    height: 2,
                    pixel_format: "gray".to_string(),
                },
                PACKET_INTERVAL,
            ),
            MediaKind::Other => return Err(Error::invalid("no decoder for data streams")),
        };
        Ok(FakeDecoder {
            stream_index: index,
            layout,
            unit_duration,
            delay: self.decoder_delay,
            pending: VecDeque::new(),
            eof: false,
        })
    }

    fn open_filter(&self, _index: usize, description: &str) -> Result<FakeFilter> {
        match description {
            "anull" | "null" => Ok(FakeFilter {
                description: description.to_string(),
                queue: VecDeque::new(),
                eof: false,
            }),
            other => Err(Error::invalid(format!("no such filter: {}", other))),
        }
    }
}

pub struct FakeDecoder {
    stream_index: usize,
    layout: FrameLayout,
    unit_duration: f64,
    delay: usize,
    pending: VecDeque<Frame>,
    eof: bool,
}

impl Decoder for FakeDecoder {
    type Packet = FakePacket;
    type Frame = Frame;

    fn send(&mut self, packet: Option<&FakePacket>) -> Result<()> {
        let Some(packet) = packet else {
            self.eof = true;
            return Ok(());
        };
        if packet.corrupt {
            return Err(anyhow::anyhow!("invalid data found when processing input").into());
        }
        let unit_size = match &self.layout {
            FrameLayout::Audio { channels, .. } => *channels as usize,
            FrameLayout::Video { width, height, .. } => (*width * *height) as usize,
        };
        let data = Bytes::from(vec![self.stream_index as u8; packet.units * unit_size]);
        let frame = Frame::new(
            Some(packet.pts),
            self.unit_duration,
            packet.units,
            self.layout.clone(),
            data,
        )?;
        self.pending.push_back(frame);
        Ok(())
    }

    fn receive(&mut self) -> Result<Status<Frame>> {
        if self.pending.len() > self.delay || (self.eof && !self.pending.is_empty()) {
            return Ok(self.pending.pop_front().map_or(Status::Again, Status::Ready));
        }
        if self.eof {
            return Ok(Status::Eof);
        }
        Ok(Status::Again)
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.eof = false;
    }
}

/// Pass-through filter; only "anull" and "null" are known.
pub struct FakeFilter {
    description: String,
    queue: VecDeque<Frame>,
    eof: bool,
}

impl FilterGraph for FakeFilter {
    type Input = Frame;

    fn push(&mut self, frame: Option<&Frame>) -> Result<()> {
        match frame {
            Some(frame) => self.queue.push_back(frame.clone()),
            None => self.eof = true,
        }
        Ok(())
    }

    fn pull(&mut self) -> Result<Status<Frame>> {
        match self.queue.pop_front() {
            Some(frame) => Ok(Status::Ready(frame)),
            None if self.eof => Ok(Status::Eof),
            None => Ok(Status::Again),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.queue.clear();
        self.eof = false;
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

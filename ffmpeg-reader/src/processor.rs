use std::collections::BTreeMap;

use crate::backend::{Decoder, DecoderConfig, FilterGraph, Status};
use crate::buffer::ChunkBuffer;
use crate::error::{Error, Result};
use crate::frame::Chunk;
use crate::media::Device;
use crate::sink::Sink;

/// Identifies an output stream inside its processor. Keys are never reused
/// during the lifetime of a processor.
pub type SinkKey = usize;

/// Owns the decoder of one source stream and every output stream derived
/// from it. Each decoded frame is fanned out to all sinks.
pub struct StreamProcessor<D, F>
where
    D: Decoder,
    F: FilterGraph<Input = D::Frame>,
{
    decoder: D,
    decoder_config: DecoderConfig,
    sinks: BTreeMap<SinkKey, Sink<F>>,
    next_key: SinkKey,
    discard_before: Option<f64>,
    drained: bool,
}

impl<D, F> StreamProcessor<D, F>
where
    D: Decoder,
    F: FilterGraph<Input = D::Frame>,
{
    pub fn new(decoder: D, decoder_config: DecoderConfig) -> Self {
        Self {
            decoder,
            decoder_config,
            sinks: BTreeMap::new(),
            next_key: 0,
            discard_before: None,
            drained: false,
        }
    }

    pub fn decoder_config(&self) -> &DecoderConfig {
        &self.decoder_config
    }

    pub fn add_stream(
        &mut self,
        filter: F,
        frames_per_chunk: Option<usize>,
        num_chunks: Option<usize>,
        device: Device,
    ) -> SinkKey {
        let key = self.next_key;
        self.next_key += 1;
        let mut buffer = ChunkBuffer::new(frames_per_chunk, num_chunks, device);
        // The decoder has already been drained; nothing more will arrive.
        if self.drained {
            buffer.mark_drained();
        }
        self.sinks.insert(key, Sink::new(filter, buffer));
        key
    }

    pub fn remove_stream(&mut self, key: SinkKey) -> Result<()> {
        self.sinks
            .remove(&key)
            .map(|_| ())
            .ok_or(Error::UnknownKey(key))
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn num_streams(&self) -> usize {
        self.sinks.len()
    }

    /// True once end of stream has been processed and until the next flush.
    pub fn is_drained(&self) -> bool {
        self.drained
    }

    /// Frames starting before `timestamp` seconds are dropped from now on.
    pub fn set_discard_before(&mut self, timestamp: Option<f64>) {
        self.discard_before = timestamp;
    }

    /// Decodes `packet` and routes the frames to every sink. `None` drains
    /// the decoder and the filters; draining twice is a no-op.
    pub fn process_packet(&mut self, packet: Option<&D::Packet>) -> Result<()> {
        if packet.is_none() {
            if self.drained {
                return Ok(());
            }
            self.drained = true;
        }

        self.decoder.send(packet)?;
        loop {
            match self.decoder.receive()? {
                Status::Ready(frame) => self.send_frame(Some(&frame))?,
                Status::Again => return Ok(()),
                Status::Eof => return self.send_frame(None),
            }
        }
    }

    fn send_frame(&mut self, frame: Option<&D::Frame>) -> Result<()> {
        for sink in self.sinks.values_mut() {
            sink.process_frame(frame, self.discard_before)?;
        }
        Ok(())
    }

    /// Resets decoder and filter state and discards buffered data, keeping
    /// the output streams configured.
    pub fn flush(&mut self) -> Result<()> {
        self.decoder.flush();
        for sink in self.sinks.values_mut() {
            sink.flush()?;
        }
        self.drained = false;
        Ok(())
    }

    pub fn is_buffer_ready(&self) -> bool {
        self.sinks.values().all(Sink::is_buffer_ready)
    }

    pub fn pop_chunk(&mut self, key: SinkKey) -> Result<Option<Chunk>> {
        self.sink_mut(key)?.pop_chunk()
    }

    pub fn get_filter_description(&self, key: SinkKey) -> Result<&str> {
        Ok(self.sink(key)?.filter_description())
    }

    pub fn buffer(&self, key: SinkKey) -> Result<&ChunkBuffer> {
        Ok(self.sink(key)?.buffer())
    }

    fn sink(&self, key: SinkKey) -> Result<&Sink<F>> {
        self.sinks.get(&key).ok_or(Error::UnknownKey(key))
    }

    fn sink_mut(&mut self, key: SinkKey) -> Result<&mut Sink<F>> {
        self.sinks.get_mut(&key).ok_or(Error::UnknownKey(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Demuxer;
    use crate::testing::{FakeDecoder, FakeDemuxer, FakeFilter, FakePacket};

    type Processor = StreamProcessor<FakeDecoder, FakeFilter>;

    fn processor(demuxer: &FakeDemuxer) -> Processor {
        let config = DecoderConfig::default();
        StreamProcessor::new(demuxer.open_decoder(0, &config).unwrap(), config)
    }

    fn packet(pts: f64) -> FakePacket {
        FakePacket::new(0, pts, 4)
    }

    #[test]
    fn test_keys_are_unique() -> anyhow::Result<()> {
        let demuxer = FakeDemuxer::audio_only(4);
        let mut p = processor(&demuxer);
        let a = p.add_stream(demuxer.open_filter(0, "anull")?, Some(4), None, Device::Cpu);
        let b = p.add_stream(demuxer.open_filter(0, "anull")?, Some(4), None, Device::Cpu);
        p.remove_stream(a)?;
        let c = p.add_stream(demuxer.open_filter(0, "anull")?, Some(4), None, Device::Cpu);
        assert_ne!(a, b);
        assert_ne!(c, a);
        assert_ne!(c, b);
        assert!(matches!(p.remove_stream(a), Err(Error::UnknownKey(_))));
        assert!(p.pop_chunk(a).is_err());
        assert!(p.get_filter_description(a).is_err());
        Ok(())
    }

    #[test]
    fn test_fans_out_to_every_sink() -> anyhow::Result<()> {
        let demuxer = FakeDemuxer::audio_only(4);
        let mut p = processor(&demuxer);
        let small = p.add_stream(demuxer.open_filter(0, "anull")?, Some(2), None, Device::Cpu);
        let large = p.add_stream(demuxer.open_filter(0, "anull")?, Some(8), None, Device::Cpu);

        p.process_packet(Some(&packet(0.0)))?;
        assert_eq!(p.buffer(small)?.num_buffered_frames(), 4);
        assert_eq!(p.buffer(large)?.num_buffered_frames(), 4);
        assert!(!p.is_buffer_ready());

        p.process_packet(Some(&packet(0.1)))?;
        assert!(p.is_buffer_ready());
        assert_eq!(p.pop_chunk(large)?.unwrap().num_frames, 8);
        assert_eq!(p.pop_chunk(small)?.unwrap().num_frames, 2);
        Ok(())
    }

    #[test]
    fn test_drain_flushes_delayed_frames() -> anyhow::Result<()> {
        let demuxer = FakeDemuxer::audio_only(4).with_decoder_delay(2);
        let mut p = processor(&demuxer);
        let key = p.add_stream(demuxer.open_filter(0, "anull")?, Some(100), None, Device::Cpu);

        p.process_packet(Some(&packet(0.0)))?;
        p.process_packet(Some(&packet(0.1)))?;
        assert_eq!(p.buffer(key)?.num_buffered_frames(), 0);

        p.process_packet(None)?;
        assert!(p.is_buffer_ready());
        let chunk = p.pop_chunk(key)?.unwrap();
        assert_eq!(chunk.num_frames, 8);
        assert_eq!(chunk.pts, Some(0.0));

        // A second drain is a no-op.
        p.process_packet(None)?;
        assert!(p.pop_chunk(key)?.is_none());
        Ok(())
    }

    #[test]
    fn test_stream_added_after_drain_is_ready() -> anyhow::Result<()> {
        let demuxer = FakeDemuxer::audio_only(4);
        let mut p = processor(&demuxer);
        p.add_stream(demuxer.open_filter(0, "anull")?, Some(4), None, Device::Cpu);
        p.process_packet(None)?;
        assert!(p.is_drained());

        let late = p.add_stream(demuxer.open_filter(0, "anull")?, Some(4), None, Device::Cpu);
        assert!(p.buffer(late)?.is_drained());
        assert!(p.is_buffer_ready());
        assert!(p.pop_chunk(late)?.is_none());

        p.flush()?;
        assert!(!p.is_drained());
        assert!(!p.buffer(late)?.is_drained());
        Ok(())
    }

    #[test]
    fn test_flush_is_idempotent() -> anyhow::Result<()> {
        let demuxer = FakeDemuxer::audio_only(4).with_decoder_delay(1);

        let run = |flushes: usize| -> anyhow::Result<Vec<Option<f64>>> {
            let mut p = processor(&demuxer);
            let key = p.add_stream(demuxer.open_filter(0, "anull")?, Some(4), None, Device::Cpu);
            p.process_packet(Some(&packet(0.0)))?;
            for _ in 0..flushes {
                p.flush()?;
            }
            p.process_packet(Some(&packet(1.0)))?;
            p.process_packet(Some(&packet(1.1)))?;
            p.process_packet(None)?;
            let mut pts = Vec::new();
            while let Some(chunk) = p.pop_chunk(key)? {
                pts.push(chunk.pts);
            }
            Ok(pts)
        };

        let once = run(1)?;
        assert_eq!(once, vec![Some(1.0), Some(1.1)]);
        assert_eq!(run(2)?, once);
        Ok(())
    }

    #[test]
    fn test_discards_frames_before_threshold() -> anyhow::Result<()> {
        let demuxer = FakeDemuxer::audio_only(4);
        let mut p = processor(&demuxer);
        let key = p.add_stream(demuxer.open_filter(0, "anull")?, Some(4), None, Device::Cpu);
        p.set_discard_before(Some(0.5));

        p.process_packet(Some(&packet(0.4)))?;
        p.process_packet(Some(&packet(0.5)))?;
        let chunk = p.pop_chunk(key)?.unwrap();
        assert_eq!(chunk.pts, Some(0.5));
        assert!(p.pop_chunk(key)?.is_none());
        Ok(())
    }

    #[test]
    fn test_decode_error_propagates() {
        let demuxer = FakeDemuxer::audio_only(4);
        let mut p = processor(&demuxer);
        p.add_stream(demuxer.open_filter(0, "anull").unwrap(), Some(4), None, Device::Cpu);
        let err = p.process_packet(Some(&FakePacket::corrupt(0, 0.0))).unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }
}

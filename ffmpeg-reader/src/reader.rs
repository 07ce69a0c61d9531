use std::time::{Duration, Instant};

use crate::backend::{DecoderConfig, Demuxer, Packet, Status};
use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::frame::Chunk;
use crate::media::{Device, MediaKind, resolve_hw_accel};
use crate::processor::{SinkKey, StreamProcessor};
use crate::stream::{Metadata, OutputStreamInfo, SrcStreamInfo};

type Processor<D> = StreamProcessor<<D as Demuxer>::Decoder, <D as Demuxer>::Filter>;

/// Result of driving the reader by one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// A packet was consumed (or skipped); keep calling.
    Continue,
    /// The source has nothing right now; retry later.
    Again,
    /// End of stream reached and every processor drained.
    Finished,
}

/// Pulls packets from a demuxer and routes them to per-source-stream
/// processors, each feeding one or more chunked output streams.
///
/// `processors` has one slot per source stream; a slot is occupied exactly
/// while some output stream references that source. `stream_indices` maps
/// the dense output index to `(source index, sink key)`. `discard_before`
/// is the last seek target, applied to processors created after the seek.
pub struct StreamReader<D: Demuxer> {
    demuxer: D,
    processors: Vec<Option<Processor<D>>>,
    stream_indices: Vec<(usize, SinkKey)>,
    discard_before: Option<f64>,
}

impl<D: Demuxer> StreamReader<D> {
    /// Probes `demuxer` and discards every stream that is neither audio nor
    /// video so their packets are never delivered.
    pub fn new(mut demuxer: D) -> Result<Self> {
        demuxer
            .probe()
            .map_err(|e| Error::ProbeFailed(e.to_string()))?;

        let kinds: Vec<MediaKind> = demuxer.streams().iter().map(|s| s.kind).collect();
        for (index, kind) in kinds.iter().enumerate() {
            if !kind.is_decodable() {
                demuxer.set_discard(index, true);
            }
        }

        let mut processors = Vec::with_capacity(kinds.len());
        processors.resize_with(kinds.len(), || None);
        Ok(Self {
            demuxer,
            processors,
            stream_indices: Vec::new(),
            discard_before: None,
        })
    }

    pub fn demuxer(&self) -> &D {
        &self.demuxer
    }

    fn validate_src_stream_index(&self, index: usize) -> Result<()> {
        let count = self.num_src_streams();
        if index >= count {
            return Err(Error::SourceIndexOutOfRange { index, count });
        }
        Ok(())
    }

    fn validate_output_stream_index(&self, index: usize) -> Result<()> {
        let count = self.num_out_streams();
        if index >= count {
            return Err(Error::OutputIndexOutOfRange { index, count });
        }
        Ok(())
    }

    fn validate_src_stream_kind(&self, index: usize, expected: MediaKind) -> Result<()> {
        self.validate_src_stream_index(index)?;
        if self.demuxer.streams()[index].kind != expected {
            return Err(Error::MediaKindMismatch { index, expected });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------

    pub fn num_src_streams(&self) -> usize {
        self.demuxer.streams().len()
    }

    pub fn get_src_stream_info(&self, index: usize) -> Result<SrcStreamInfo> {
        self.validate_src_stream_index(index)?;
        Ok(self.demuxer.streams()[index].info())
    }

    pub fn get_metadata(&self) -> Metadata {
        self.demuxer.metadata()
    }

    pub fn find_best_audio_stream(&self) -> Option<usize> {
        self.demuxer.best_stream(MediaKind::Audio)
    }

    pub fn find_best_video_stream(&self) -> Option<usize> {
        self.demuxer.best_stream(MediaKind::Video)
    }

    pub fn num_out_streams(&self) -> usize {
        self.stream_indices.len()
    }

    pub fn get_out_stream_info(&self, index: usize) -> Result<OutputStreamInfo> {
        self.validate_output_stream_index(index)?;
        let (source_index, key) = self.stream_indices[index];
        let processor = self.processor(source_index)?;
        let buffer = processor.buffer(key)?;
        Ok(OutputStreamInfo {
            source_index,
            filter_description: processor.get_filter_description(key)?.to_string(),
            device: buffer.device(),
            frames_per_chunk: buffer.frames_per_chunk(),
            num_chunks: buffer.num_chunks(),
        })
    }

    /// True when every output stream holds a chunk ready to pop.
    pub fn is_buffer_ready(&self) -> bool {
        self.processors
            .iter()
            .flatten()
            .all(StreamProcessor::is_buffer_ready)
    }

    /// True once end of stream has drained every processor. Cleared by
    /// [`Self::seek`].
    pub fn is_finished(&self) -> bool {
        let mut processors = self.processors.iter().flatten().peekable();
        processors.peek().is_some() && processors.all(StreamProcessor::is_drained)
    }

    fn processor(&self, source_index: usize) -> Result<&Processor<D>> {
        self.processors[source_index]
            .as_ref()
            .ok_or_else(|| Error::invalid(format!("no processor for stream {}", source_index)))
    }

    // ------------------------------------------------------------------
    // Configure
    // ------------------------------------------------------------------

    /// Adds an audio output stream and returns its output index.
    pub fn add_audio_stream(&mut self, index: usize, config: &StreamConfig) -> Result<usize> {
        self.add_stream(index, MediaKind::Audio, config, Device::Cpu)
    }

    /// Adds a video output stream and returns its output index. `hw_accel`
    /// names a CUDA device (e.g. "cuda:0") and requires the `cuda` feature.
    pub fn add_video_stream(
        &mut self,
        index: usize,
        config: &StreamConfig,
        hw_accel: Option<&str>,
    ) -> Result<usize> {
        self.validate_src_stream_kind(index, MediaKind::Video)?;
        let device = resolve_hw_accel(hw_accel)?;
        self.add_stream(index, MediaKind::Video, config, device)
    }

    fn add_stream(
        &mut self,
        index: usize,
        kind: MediaKind,
        config: &StreamConfig,
        device: Device,
    ) -> Result<usize> {
        self.validate_src_stream_kind(index, kind)?;
        config.validate()?;
        if self.demuxer.streams()[index].format_name.is_none() {
            return Err(Error::UndetectedFormat(index));
        }

        let description = config
            .filter_desc
            .clone()
            .unwrap_or_else(|| kind.null_filter().to_string());
        let filter = self.demuxer.open_filter(index, &description)?;
        let decoder_config = DecoderConfig {
            name: config.decoder.clone(),
            options: config.decoder_options.clone(),
            device,
        };

        // Everything fallible happens before the slot is touched.
        let mut processor = match self.processors[index].take() {
            Some(existing) => {
                if existing.decoder_config() != &decoder_config {
                    log::warn!(
                        "stream {} already has a decoder ({:?}), ignoring {:?}",
                        index,
                        existing.decoder_config(),
                        decoder_config
                    );
                }
                existing
            }
            None => {
                let decoder = self.demuxer.open_decoder(index, &decoder_config)?;
                let mut processor = StreamProcessor::new(decoder, decoder_config);
                processor.set_discard_before(self.discard_before);
                processor
            }
        };
        let key = processor.add_stream(filter, config.frames_per_chunk, config.num_chunks, device);
        self.processors[index] = Some(processor);
        self.demuxer.set_discard(index, false);
        self.stream_indices.push((index, key));

        log::debug!(
            "added output stream {} (source {}, key {}, filter {:?}, device {})",
            self.stream_indices.len() - 1,
            index,
            key,
            description,
            device
        );
        Ok(self.stream_indices.len() - 1)
    }

    /// Removes an output stream. Later output indices shift down by one.
    /// The processor of the source stream is released once no output
    /// stream references it anymore.
    pub fn remove_stream(&mut self, index: usize) -> Result<()> {
        self.validate_output_stream_index(index)?;
        let (source_index, key) = self.stream_indices[index];
        self.processors[source_index]
            .as_mut()
            .ok_or(Error::UnknownKey(key))?
            .remove_stream(key)?;
        self.stream_indices.remove(index);

        // Entries for one source are not necessarily contiguous.
        let still_used = self.stream_indices.iter().any(|(i, _)| *i == source_index);
        if !still_used {
            self.processors[source_index] = None;
            log::debug!("released processor of stream {}", source_index);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Stream
    // ------------------------------------------------------------------

    /// Seeks to the nearest point at or before `timestamp` seconds and resets
    /// every processor. Data earlier than `timestamp` is not delivered, also
    /// for output streams added after the seek.
    pub fn seek(&mut self, timestamp: f64) -> Result<()> {
        if timestamp < 0.0 || timestamp.is_nan() {
            return Err(Error::NegativeTimestamp(timestamp));
        }
        self.demuxer.seek(timestamp)?;
        self.discard_before = Some(timestamp);
        for processor in self.processors.iter_mut().flatten() {
            processor.flush()?;
            processor.set_discard_before(Some(timestamp));
        }
        log::debug!("seeked to {:.3}s", timestamp);
        Ok(())
    }

    /// Reads one packet and hands it to the processor of its stream.
    ///
    /// End of stream drains every processor and reports
    /// [`Progress::Finished`]; a transient read reports [`Progress::Again`].
    pub fn process_packet(&mut self) -> Result<Progress> {
        let packet = match self.demuxer.read_packet()? {
            Status::Ready(packet) => packet,
            Status::Again => return Ok(Progress::Again),
            Status::Eof => {
                self.drain()?;
                return Ok(Progress::Finished);
            }
        };
        // Packets of streams without output streams are dropped.
        if let Some(processor) = self
            .processors
            .get_mut(packet.stream_index())
            .and_then(Option::as_mut)
        {
            processor.process_packet(Some(&packet))?;
        }
        Ok(Progress::Continue)
    }

    /// Flushes every processor with an end-of-stream marker. All processors
    /// are drained even if one fails; the last error is returned.
    fn drain(&mut self) -> Result<()> {
        log::debug!("end of stream, draining processors");
        let mut result = Ok(());
        for processor in self.processors.iter_mut().flatten() {
            if let Err(e) = processor.process_packet(None) {
                result = Err(e);
            }
        }
        result
    }

    /// Like [`Self::process_packet`], but retries while the source reports a
    /// transient condition, sleeping `backoff` between attempts. `None`
    /// retries forever, as does a timeout too large to form a deadline. Once
    /// the deadline has passed the transient status is returned as is.
    pub fn process_packet_block(
        &mut self,
        timeout: Option<Duration>,
        backoff: Duration,
    ) -> Result<Progress> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        loop {
            let progress = self.process_packet()?;
            if progress != Progress::Again {
                return Ok(progress);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(progress);
            }
            std::thread::sleep(backoff);
        }
    }

    /// Async flavour of [`Self::process_packet_block`]. The backoff sleep is
    /// the only suspension point.
    pub async fn process_packet_block_async(
        &mut self,
        timeout: Option<Duration>,
        backoff: Duration,
    ) -> Result<Progress> {
        let deadline = timeout.and_then(|t| tokio::time::Instant::now().checked_add(t));
        loop {
            let progress = self.process_packet()?;
            if progress != Progress::Again {
                return Ok(progress);
            }
            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                return Ok(progress);
            }
            tokio::time::sleep(backoff).await;
        }
    }

    /// Processes packets until every output stream has a chunk ready.
    /// Returns [`Progress::Continue`] when ready, otherwise the progress value
    /// that stopped it. A reader that has already reached the end of the
    /// source reports [`Progress::Finished`] without reading.
    pub fn fill_buffer(
        &mut self,
        timeout: Option<Duration>,
        backoff: Duration,
    ) -> Result<Progress> {
        if self.is_finished() {
            return Ok(Progress::Finished);
        }
        while !self.is_buffer_ready() {
            let progress = self.process_packet_block(timeout, backoff)?;
            if progress != Progress::Continue {
                return Ok(progress);
            }
        }
        Ok(Progress::Continue)
    }

    /// Pops one chunk per output stream, in output index order. `None`
    /// marks a stream with nothing to deliver.
    pub fn pop_chunks(&mut self) -> Result<Vec<Option<Chunk>>> {
        let mut chunks = Vec::with_capacity(self.stream_indices.len());
        for (source_index, key) in self.stream_indices.iter() {
            let processor = self.processors[*source_index]
                .as_mut()
                .ok_or(Error::UnknownKey(*key))?;
            chunks.push(processor.pop_chunk(*key)?);
        }
        Ok(chunks)
    }

    /// Iterates over `pop_chunks` results until the source is exhausted and
    /// every buffered chunk has been delivered. On a reader that is already
    /// finished it yields the remaining chunks, then stops.
    pub fn chunks(&mut self, timeout: Option<Duration>, backoff: Duration) -> Chunks<'_, D> {
        Chunks {
            reader: self,
            timeout,
            backoff,
            finished: false,
            done: false,
        }
    }
}

/// Iterator returned by [`StreamReader::chunks`].
pub struct Chunks<'a, D: Demuxer> {
    reader: &'a mut StreamReader<D>,
    timeout: Option<Duration>,
    backoff: Duration,
    finished: bool,
    done: bool,
}

impl<D: Demuxer> Iterator for Chunks<'_, D> {
    type Item = Result<Vec<Option<Chunk>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.reader.num_out_streams() == 0 {
            return None;
        }
        if !self.finished {
            match self.reader.fill_buffer(self.timeout, self.backoff) {
                Ok(Progress::Continue) => {}
                Ok(Progress::Finished) => self.finished = true,
                Ok(Progress::Again) => {
                    self.done = true;
                    return Some(Err(Error::Timeout));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        // Ready but empty everywhere only happens once every buffer is drained.
        match self.reader.pop_chunks() {
            Ok(chunks) if chunks.iter().all(Option::is_none) => {
                self.done = true;
                None
            }
            other => Some(other),
        }
    }
}

#[cfg(test)]
#[path = "reader_test.rs"]
mod reader_test;

use std::collections::VecDeque;

use crate::error::Result;
use crate::frame::{Chunk, Frame};
use crate::media::Device;

/// Accumulates filtered frames of one output stream and cuts them into
/// chunks of `frames_per_chunk` units.
///
/// Buffered frames are kept aligned to chunk boundaries: every entry of
/// `chunks` except the last holds exactly `frames_per_chunk` units.
pub struct ChunkBuffer {
    frames_per_chunk: Option<usize>,
    num_chunks: Option<usize>,
    device: Device,
    chunks: VecDeque<Frame>,
    num_buffered_frames: usize,
    drained: bool,
    warned_overflow: bool,
}

impl ChunkBuffer {
    pub fn new(frames_per_chunk: Option<usize>, num_chunks: Option<usize>, device: Device) -> Self {
        Self {
            frames_per_chunk,
            num_chunks,
            device,
            chunks: VecDeque::new(),
            num_buffered_frames: 0,
            drained: false,
            warned_overflow: false,
        }
    }

    pub fn frames_per_chunk(&self) -> Option<usize> {
        self.frames_per_chunk
    }

    pub fn num_chunks(&self) -> Option<usize> {
        self.num_chunks
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn num_buffered_frames(&self) -> usize {
        self.num_buffered_frames
    }

    /// Buffers `frame`. A frame whose layout differs from the buffered ones
    /// is rejected and leaves the buffer untouched.
    pub fn push_frame(&mut self, frame: Frame) -> Result<()> {
        if let Some(last) = self.chunks.back() {
            last.ensure_same_layout(&frame)?;
        }
        let Some(frames_per_chunk) = self.frames_per_chunk else {
            self.num_buffered_frames += frame.num_frames();
            self.chunks.push_back(frame);
            return Ok(());
        };

        // Top up a trailing partial chunk first.
        let mut frame = frame;
        if self.num_buffered_frames % frames_per_chunk != 0 {
            if let Some(prev) = self.chunks.pop_back() {
                self.num_buffered_frames -= prev.num_frames();
                frame = prev.concat(frame)?;
            }
        }

        loop {
            if frame.num_frames() <= frames_per_chunk {
                self.num_buffered_frames += frame.num_frames();
                self.chunks.push_back(frame);
                break;
            }
            let (head, tail) = frame.split_at(frames_per_chunk);
            self.num_buffered_frames += head.num_frames();
            self.chunks.push_back(head);
            frame = tail;
        }

        if let Some(num_chunks) = self.num_chunks {
            let max_frames = num_chunks * frames_per_chunk;
            while self.num_buffered_frames > max_frames {
                if !self.warned_overflow {
                    log::warn!(
                        "buffered frames exceed {} chunks, dropping old frames",
                        num_chunks
                    );
                    self.warned_overflow = true;
                }
                match self.chunks.pop_front() {
                    Some(dropped) => self.num_buffered_frames -= dropped.num_frames(),
                    None => break,
                }
            }
        }
        Ok(())
    }

    /// Marks the end of input: whatever remains becomes poppable.
    pub fn mark_drained(&mut self) {
        self.drained = true;
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }

    pub fn is_ready(&self) -> bool {
        if self.drained {
            return true;
        }
        match self.frames_per_chunk {
            None => self.num_buffered_frames > 0,
            Some(n) => self.num_buffered_frames >= n,
        }
    }

    /// Pops the oldest chunk. Partial chunks are only handed out once the
    /// buffer is drained or when no chunk size is set.
    pub fn pop_chunk(&mut self) -> Result<Option<Chunk>> {
        if self.num_buffered_frames == 0 {
            return Ok(None);
        }
        match self.frames_per_chunk {
            None => {
                let mut all: Option<Frame> = None;
                while let Some(frame) = self.chunks.pop_front() {
                    all = Some(match all {
                        Some(acc) => acc.concat(frame)?,
                        None => frame,
                    });
                }
                self.num_buffered_frames = 0;
                Ok(all.map(|frame| frame.into_chunk(self.device)))
            }
            Some(n) => {
                let complete = self.chunks.front().is_some_and(|f| f.num_frames() >= n);
                if !complete && !self.drained {
                    return Ok(None);
                }
                Ok(self.chunks.pop_front().map(|frame| {
                    self.num_buffered_frames -= frame.num_frames();
                    frame.into_chunk(self.device)
                }))
            }
        }
    }

    /// Discards everything, including the drained state.
    pub fn flush(&mut self) {
        self.chunks.clear();
        self.num_buffered_frames = 0;
        self.drained = false;
    }
}

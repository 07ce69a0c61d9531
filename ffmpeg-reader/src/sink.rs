use crate::backend::{FilterGraph, Status};
use crate::buffer::ChunkBuffer;
use crate::error::Result;
use crate::frame::Chunk;

/// One output stream: a filter graph feeding a chunk buffer.
pub struct Sink<F: FilterGraph> {
    filter: F,
    buffer: ChunkBuffer,
}

impl<F: FilterGraph> Sink<F> {
    pub fn new(filter: F, buffer: ChunkBuffer) -> Self {
        Self { filter, buffer }
    }

    /// Pushes one decoded frame (or end of input) through the filter and
    /// buffers everything it yields. Frames starting before `discard_before`
    /// seconds are dropped.
    pub fn process_frame(
        &mut self,
        frame: Option<&F::Input>,
        discard_before: Option<f64>,
    ) -> Result<()> {
        let eof = frame.is_none();
        self.filter.push(frame)?;
        loop {
            match self.filter.pull()? {
                Status::Ready(filtered) => {
                    let stale = matches!(
                        (discard_before, filtered.pts()),
                        (Some(threshold), Some(pts)) if pts < threshold
                    );
                    if !stale {
                        self.buffer.push_frame(filtered)?;
                    }
                }
                Status::Again | Status::Eof => break,
            }
        }
        if eof {
            self.buffer.mark_drained();
        }
        Ok(())
    }

    pub fn filter_description(&self) -> &str {
        self.filter.description()
    }

    pub fn buffer(&self) -> &ChunkBuffer {
        &self.buffer
    }

    pub fn is_buffer_ready(&self) -> bool {
        self.buffer.is_ready()
    }

    pub fn pop_chunk(&mut self) -> Result<Option<Chunk>> {
        self.buffer.pop_chunk()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.filter.reset()?;
        self.buffer.flush();
        Ok(())
    }
}

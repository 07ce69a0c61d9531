//! libav backend: demuxing, decoding and filtering through `ffmpeg-next`.

mod decoder;
mod filter;
mod frame;
mod hw;
mod packet;
mod stream;

use std::ffi::CString;

use ffmpeg_next::Dictionary;
use ffmpeg_next::ffi::AVDiscard;

pub use decoder::{DecodedFrame, FfmpegDecoder};
pub use filter::FfmpegFilter;
pub use packet::FfmpegPacket;

use crate::backend::{DecoderConfig, Demuxer, Status};
use crate::config::OpenOptions;
use crate::error::{Error, Result};
use crate::media::MediaKind;
use crate::reader::StreamReader;
use crate::stream::{Metadata, SourceStream};

pub(crate) fn is_again(err: &ffmpeg_next::Error) -> bool {
    matches!(err, ffmpeg_next::Error::Other { errno } if *errno == ffmpeg_next::util::error::EAGAIN)
}

/// Resolve input format by name (e.g. "v4l2", "lavfi") via av_find_input_format.
fn find_input_format(name: &str) -> Result<*const ffmpeg_next::ffi::AVInputFormat> {
    let cname = CString::new(name)
        .map_err(|e| Error::invalid(format!("invalid format name {:?}: {}", name, e)))?;
    let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
    if ptr.is_null() {
        return Err(Error::invalid(format!("unsupported device/format: \"{}\"", name)));
    }
    Ok(ptr)
}

fn dictionary(options: &Metadata) -> Dictionary<'static> {
    let mut dict = Dictionary::new();
    for (key, value) in options {
        dict.set(key, value);
    }
    dict
}

/// An opened libav input context.
pub struct FfmpegInput {
    input: ffmpeg_next::format::context::Input,
    streams: Vec<SourceStream>,
    discard: Vec<bool>,
}

impl FfmpegInput {
    /// Opens `url` (a path, URL or device name). Stream information is not
    /// available until [`Demuxer::probe`] has run.
    pub fn open(url: &str, options: &OpenOptions) -> Result<Self> {
        let c_url =
            CString::new(url).map_err(|e| Error::invalid(format!("invalid url {:?}: {}", url, e)))?;
        let format = match options.format.as_deref() {
            Some(name) => find_input_format(name)?,
            None => std::ptr::null(),
        };

        let mut ps = std::ptr::null_mut();
        let mut opts = unsafe { dictionary(&options.options).disown() };
        let ret = unsafe {
            ffmpeg_next::ffi::avformat_open_input(&mut ps, c_url.as_ptr(), format, &mut opts)
        };
        let unused = unsafe { Dictionary::own(opts) };
        if ret < 0 {
            let err = ffmpeg_next::Error::from(ret);
            return Err(Error::invalid(format!("failed to open the input \"{}\": {}", url, err)));
        }
        for (key, value) in unused.iter() {
            log::warn!("input option not used: {}={}", key, value);
        }

        log::info!("opened input {}", url);
        Ok(Self {
            input: unsafe { ffmpeg_next::format::context::Input::wrap(ps) },
            streams: Vec::new(),
            discard: Vec::new(),
        })
    }

    pub fn format_name(&self) -> &str {
        self.input.format().name()
    }

    /// Duration of the source in seconds, when known.
    pub fn duration(&self) -> Option<f64> {
        let d = self.input.duration();
        if d == ffmpeg_next::ffi::AV_NOPTS_VALUE || d <= 0 {
            return None;
        }
        Some(d as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE))
    }
}

impl Demuxer for FfmpegInput {
    type Packet = FfmpegPacket;
    type Decoder = FfmpegDecoder;
    type Filter = FfmpegFilter;

    fn probe(&mut self) -> Result<()> {
        let ctx = unsafe { self.input.as_mut_ptr() };
        let ret = unsafe { ffmpeg_next::ffi::avformat_find_stream_info(ctx, std::ptr::null_mut()) };
        if ret < 0 {
            return Err(ffmpeg_next::Error::from(ret).into());
        }
        self.streams = self.input.streams().map(|s| stream::source_stream(&s)).collect();
        self.discard = vec![false; self.streams.len()];
        log::debug!(
            "probed {} ({} streams)",
            self.format_name(),
            self.streams.len()
        );
        Ok(())
    }

    fn streams(&self) -> &[SourceStream] {
        &self.streams
    }

    fn metadata(&self) -> Metadata {
        stream::metadata(self.input.metadata())
    }

    fn best_stream(&self, kind: MediaKind) -> Option<usize> {
        let medium = match kind {
            MediaKind::Audio => ffmpeg_next::media::Type::Audio,
            MediaKind::Video => ffmpeg_next::media::Type::Video,
            MediaKind::Other => return None,
        };
        self.input.streams().best(medium).map(|s| s.index())
    }

    fn set_discard(&mut self, index: usize, discard: bool) {
        let Some(flag) = self.discard.get_mut(index) else {
            return;
        };
        *flag = discard;
        unsafe {
            let ctx = self.input.as_mut_ptr();
            let stream = *(*ctx).streams.add(index);
            (*stream).discard = if discard {
                AVDiscard::AVDISCARD_ALL
            } else {
                AVDiscard::AVDISCARD_DEFAULT
            };
        }
    }

    fn read_packet(&mut self) -> Result<Status<FfmpegPacket>> {
        loop {
            let mut packet = ffmpeg_next::codec::packet::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => return Ok(Status::Eof),
                Err(ref err) if is_again(err) => return Ok(Status::Again),
                Err(err) => return Err(err.into()),
            }
            // Some demuxers ignore the discard flag.
            if self.discard.get(packet.stream()).copied().unwrap_or(true) {
                continue;
            }
            return Ok(Status::Ready(packet.into()));
        }
    }

    fn seek(&mut self, timestamp: f64) -> Result<()> {
        let ts = (timestamp * f64::from(ffmpeg_next::ffi::AV_TIME_BASE)) as i64;
        self.input
            .seek(ts, ..ts)
            .map_err(|e| Error::SeekFailed(e.to_string()))
    }

    fn open_decoder(&self, index: usize, config: &DecoderConfig) -> Result<FfmpegDecoder> {
        let stream = self.input.stream(index).ok_or(Error::SourceIndexOutOfRange {
            index,
            count: self.streams.len(),
        })?;
        FfmpegDecoder::new(stream.parameters(), stream.time_base(), config)
    }

    fn open_filter(&self, index: usize, description: &str) -> Result<FfmpegFilter> {
        let stream = self.input.stream(index).ok_or(Error::SourceIndexOutOfRange {
            index,
            count: self.streams.len(),
        })?;
        FfmpegFilter::new(
            &stream.parameters(),
            stream.time_base(),
            stream.avg_frame_rate(),
            description,
        )
    }
}

impl StreamReader<FfmpegInput> {
    /// Opens and probes a source. `options.format` forces an input format or
    /// device (e.g. "v4l2"); `options.options` are passed to the demuxer.
    pub fn open(url: &str, options: &OpenOptions) -> Result<Self> {
        Self::new(FfmpegInput::open(url, options)?)
    }
}

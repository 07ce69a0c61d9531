use ffmpeg_next::{Dictionary, Rational};

use super::{hw, is_again};
use super::packet::FfmpegPacket;
use crate::backend::{Decoder, DecoderConfig, Status};
use crate::error::{Error, Result};
use crate::media::Device;

/// A decoded frame as produced by libav, before filtering.
pub enum DecodedFrame {
    Video(ffmpeg_next::frame::Video),
    Audio(ffmpeg_next::frame::Audio),
}

impl DecodedFrame {
    pub fn as_frame(&self) -> &ffmpeg_next::Frame {
        match self {
            DecodedFrame::Video(frame) => &**frame,
            DecodedFrame::Audio(frame) => &**frame,
        }
    }
}

enum DecoderType {
    Video(ffmpeg_next::codec::decoder::Video),
    Audio(ffmpeg_next::codec::decoder::Audio),
}

pub struct FfmpegDecoder {
    inner: DecoderType,
    eof_sent: bool,
}

fn select_codec(
    id: ffmpeg_next::codec::Id,
    config: &DecoderConfig,
) -> Result<ffmpeg_next::Codec> {
    if let Some(name) = config.name.as_deref() {
        return ffmpeg_next::decoder::find_by_name(name)
            .ok_or_else(|| Error::invalid(format!("unsupported codec: \"{}\"", name)));
    }
    match config.device {
        Device::Cpu => ffmpeg_next::decoder::find(id)
            .ok_or_else(|| Error::invalid(format!("unsupported codec: {:?}", id))),
        Device::Cuda(_) => hw::find_cuvid_decoder(id).ok_or_else(|| {
            Error::HwAccelUnavailable(format!("no cuvid decoder for {}", id.name()))
        }),
    }
}

impl FfmpegDecoder {
    pub fn new(
        parameters: ffmpeg_next::codec::Parameters,
        time_base: Rational,
        config: &DecoderConfig,
    ) -> Result<Self> {
        let codec = select_codec(parameters.id(), config)?;

        let mut decoder_ctx = ffmpeg_next::codec::Context::from_parameters(parameters)?;
        unsafe {
            let ctx = decoder_ctx.as_mut_ptr();
            (*ctx).time_base = time_base.into();
            (*ctx).pkt_timebase = time_base.into();
        }

        let mut options = Dictionary::new();
        for (key, value) in &config.options {
            options.set(key, value);
        }
        if let Device::Cuda(index) = config.device {
            options.set("gpu", &index.to_string());
        }

        let opened = decoder_ctx.decoder().open_as_with(codec, options)?;
        let inner = match opened.medium() {
            ffmpeg_next::media::Type::Video => {
                let video = opened.video()?;
                if video.format() == ffmpeg_next::format::Pixel::None
                    || video.width() == 0
                    || video.height() == 0
                {
                    return Err(Error::invalid("missing codec parameters"));
                }
                DecoderType::Video(video)
            }
            ffmpeg_next::media::Type::Audio => DecoderType::Audio(opened.audio()?),
            other => {
                return Err(Error::invalid(format!("unsupported stream type: {:?}", other)));
            }
        };
        log::debug!("opened decoder {} ({})", codec.name(), config.device);

        Ok(Self {
            inner,
            eof_sent: false,
        })
    }
}

impl Decoder for FfmpegDecoder {
    type Packet = FfmpegPacket;
    type Frame = DecodedFrame;

    fn send(&mut self, packet: Option<&FfmpegPacket>) -> Result<()> {
        let result = match (packet, &mut self.inner) {
            (Some(packet), DecoderType::Video(decoder)) => decoder.send_packet(packet.packet()),
            (Some(packet), DecoderType::Audio(decoder)) => decoder.send_packet(packet.packet()),
            (None, _) if self.eof_sent => return Ok(()),
            (None, DecoderType::Video(decoder)) => decoder.send_eof(),
            (None, DecoderType::Audio(decoder)) => decoder.send_eof(),
        };
        if packet.is_none() {
            self.eof_sent = true;
        }
        match result {
            Err(ffmpeg_next::Error::Eof) => Ok(()),
            other => other.map_err(Error::from),
        }
    }

    fn receive(&mut self) -> Result<Status<DecodedFrame>> {
        let result = match &mut self.inner {
            DecoderType::Video(decoder) => {
                let mut frame = ffmpeg_next::frame::Video::empty();
                decoder
                    .receive_frame(&mut frame)
                    .map(|()| DecodedFrame::Video(frame))
            }
            DecoderType::Audio(decoder) => {
                let mut frame = ffmpeg_next::frame::Audio::empty();
                decoder
                    .receive_frame(&mut frame)
                    .map(|()| DecodedFrame::Audio(frame))
            }
        };
        match result {
            Ok(frame) => Ok(Status::Ready(frame)),
            Err(ffmpeg_next::Error::Eof) => Ok(Status::Eof),
            Err(ref err) if is_again(err) => Ok(Status::Again),
            Err(err) => Err(err.into()),
        }
    }

    fn flush(&mut self) {
        match &mut self.inner {
            DecoderType::Video(decoder) => decoder.flush(),
            DecoderType::Audio(decoder) => decoder.flush(),
        }
        self.eof_sent = false;
    }
}

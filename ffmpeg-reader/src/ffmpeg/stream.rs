use std::ffi::CStr;

use ffmpeg_next::ffi::{AVCodecParameters, AVPixelFormat, AVSampleFormat};
use ffmpeg_next::format::stream::Stream;
use ffmpeg_next::{DictionaryRef, Rational};

use crate::media::{MediaKind, TimeBase};
use crate::stream::{Metadata, SourceStream};

pub(crate) fn media_kind(medium: ffmpeg_next::media::Type) -> MediaKind {
    match medium {
        ffmpeg_next::media::Type::Audio => MediaKind::Audio,
        ffmpeg_next::media::Type::Video => MediaKind::Video,
        _ => MediaKind::Other,
    }
}

pub(crate) fn time_base(rational: Rational) -> TimeBase {
    TimeBase::new(rational.numerator(), rational.denominator())
}

pub(crate) fn metadata(dict: DictionaryRef<'_>) -> Metadata {
    dict.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn rational_to_f64(rational: Rational) -> Option<f64> {
    if rational.numerator() <= 0 || rational.denominator() <= 0 {
        return None;
    }
    Some(rational.numerator() as f64 / rational.denominator() as f64)
}

/// Name of a raw `AVSampleFormat` value, `None` if unknown.
pub(crate) fn sample_format_name(format: i32) -> Option<String> {
    if format < 0 || format >= AVSampleFormat::AV_SAMPLE_FMT_NB as i32 {
        return None;
    }
    unsafe {
        let format: AVSampleFormat = std::mem::transmute(format);
        let name = ffmpeg_next::ffi::av_get_sample_fmt_name(format);
        (!name.is_null()).then(|| CStr::from_ptr(name).to_string_lossy().into_owned())
    }
}

/// Name of a raw `AVPixelFormat` value, `None` if unknown.
pub(crate) fn pixel_format_name(format: i32) -> Option<String> {
    if format < 0 || format >= AVPixelFormat::AV_PIX_FMT_NB as i32 {
        return None;
    }
    unsafe {
        let format: AVPixelFormat = std::mem::transmute(format);
        let name = ffmpeg_next::ffi::av_get_pix_fmt_name(format);
        (!name.is_null()).then(|| CStr::from_ptr(name).to_string_lossy().into_owned())
    }
}

/// Captures the probed description of one container stream.
pub(crate) fn source_stream(stream: &Stream<'_>) -> SourceStream {
    let parameters = stream.parameters();
    let kind = media_kind(parameters.medium());
    let mut source = SourceStream::new(stream.index(), kind, time_base(stream.time_base()));

    let id = parameters.id();
    source.codec_name = id.name().to_string();
    source.codec_long_name = ffmpeg_next::decoder::find(id)
        .map(|codec| codec.description().to_string())
        .unwrap_or_default();
    source.num_frames = stream.frames();
    source.metadata = metadata(stream.metadata());

    unsafe {
        let par = parameters.as_ptr() as *const AVCodecParameters;
        source.bit_rate = (*par).bit_rate;
        source.bits_per_sample = (*par).bits_per_raw_sample;
        match kind {
            MediaKind::Audio => {
                source.format_name = sample_format_name((*par).format);
                source.sample_rate = Some((*par).sample_rate.max(0) as f64);
                source.num_channels = Some((*par).ch_layout.nb_channels.max(0) as u32);
            }
            MediaKind::Video => {
                source.format_name = pixel_format_name((*par).format);
                source.width = Some((*par).width.max(0) as u32);
                source.height = Some((*par).height.max(0) as u32);
                source.frame_rate = rational_to_f64(stream.avg_frame_rate())
                    .or_else(|| rational_to_f64(stream.rate()));
            }
            MediaKind::Other => {}
        }
    }
    source
}

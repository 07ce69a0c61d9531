use std::ffi::CStr;
use std::os::raw::c_char;

use ffmpeg_next::ffi::{AVChannelLayout, AVCodecParameters, AVFrame};
use ffmpeg_next::{Rational, filter};

use super::decoder::DecodedFrame;
use super::stream::{pixel_format_name, sample_format_name};
use super::{frame, is_again};
use crate::backend::{FilterGraph, Status};
use crate::error::{Error, Result};
use crate::frame::Frame;

/// Properties of the frames fed into the graph's buffer source.
#[derive(Debug, Clone, PartialEq)]
enum SourceParams {
    Audio {
        sample_rate: i32,
        sample_format: String,
        channel_layout: String,
    },
    Video {
        width: i32,
        height: i32,
        pixel_format: String,
        pixel_aspect: (i32, i32),
    },
}

fn describe_layout(layout: &AVChannelLayout) -> Result<String> {
    if layout.nb_channels <= 0 {
        return Err(Error::invalid("unknown channel layout"));
    }
    let mut buf = [0 as c_char; 64];
    let ret = unsafe {
        ffmpeg_next::ffi::av_channel_layout_describe(layout, buf.as_mut_ptr(), buf.len())
    };
    if ret < 0 {
        return Err(ffmpeg_next::Error::from(ret).into());
    }
    Ok(unsafe { CStr::from_ptr(buf.as_ptr()) }
        .to_string_lossy()
        .into_owned())
}

fn unknown_format(format: i32) -> Error {
    Error::invalid(format!("unknown media format: {}", format))
}

impl SourceParams {
    fn from_parameters(parameters: &ffmpeg_next::codec::Parameters) -> Result<Self> {
        let par = unsafe { &*(parameters.as_ptr() as *const AVCodecParameters) };
        match parameters.medium() {
            ffmpeg_next::media::Type::Audio => Ok(SourceParams::Audio {
                sample_rate: par.sample_rate,
                sample_format: sample_format_name(par.format)
                    .ok_or_else(|| unknown_format(par.format))?,
                channel_layout: describe_layout(&par.ch_layout)?,
            }),
            ffmpeg_next::media::Type::Video => Ok(SourceParams::Video {
                width: par.width,
                height: par.height,
                pixel_format: pixel_format_name(par.format)
                    .ok_or_else(|| unknown_format(par.format))?,
                pixel_aspect: (par.sample_aspect_ratio.num, par.sample_aspect_ratio.den),
            }),
            other => Err(Error::invalid(format!("cannot filter {:?} streams", other))),
        }
    }

    fn from_frame(decoded: &DecodedFrame) -> Result<Self> {
        let raw = unsafe { &*(decoded.as_frame().as_ptr() as *const AVFrame) };
        match decoded {
            DecodedFrame::Audio(_) => Ok(SourceParams::Audio {
                sample_rate: raw.sample_rate,
                sample_format: sample_format_name(raw.format)
                    .ok_or_else(|| unknown_format(raw.format))?,
                channel_layout: describe_layout(&raw.ch_layout)?,
            }),
            DecodedFrame::Video(_) => Ok(SourceParams::Video {
                width: raw.width,
                height: raw.height,
                pixel_format: pixel_format_name(raw.format)
                    .ok_or_else(|| unknown_format(raw.format))?,
                pixel_aspect: (raw.sample_aspect_ratio.num, raw.sample_aspect_ratio.den),
            }),
        }
    }

    fn filter_names(&self) -> (&'static str, &'static str) {
        match self {
            SourceParams::Audio { .. } => ("abuffer", "abuffersink"),
            SourceParams::Video { .. } => ("buffer", "buffersink"),
        }
    }

    fn buffer_args(&self, time_base: Rational, frame_rate: Option<Rational>) -> String {
        match self {
            SourceParams::Audio {
                sample_rate,
                sample_format,
                channel_layout,
            } => format!(
                "time_base={}/{}:sample_rate={}:sample_fmt={}:channel_layout={}",
                time_base.numerator(),
                time_base.denominator(),
                sample_rate,
                sample_format,
                channel_layout
            ),
            SourceParams::Video {
                width,
                height,
                pixel_format,
                pixel_aspect,
            } => {
                let mut args = format!(
                    "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect={}/{}",
                    width,
                    height,
                    pixel_format,
                    time_base.numerator(),
                    time_base.denominator(),
                    pixel_aspect.0.max(0),
                    pixel_aspect.1.max(1)
                );
                if let Some(rate) = frame_rate {
                    args.push_str(&format!(
                        ":frame_rate={}/{}",
                        rate.numerator(),
                        rate.denominator()
                    ));
                }
                args
            }
        }
    }
}

fn valid_rate(rate: Rational) -> Option<Rational> {
    (rate.numerator() > 0 && rate.denominator() > 0).then_some(rate)
}

struct Built {
    graph: filter::Graph,
    time_base: Rational,
    frame_rate: Option<Rational>,
}

fn build(
    params: &SourceParams,
    time_base: Rational,
    frame_rate: Option<Rational>,
    description: &str,
) -> Result<Built> {
    let (source_name, sink_name) = params.filter_names();
    let source = filter::find(source_name)
        .ok_or_else(|| Error::invalid(format!("filter not found: {}", source_name)))?;
    let sink = filter::find(sink_name)
        .ok_or_else(|| Error::invalid(format!("filter not found: {}", sink_name)))?;

    let mut graph = filter::Graph::new();
    graph.add(&source, "in", &params.buffer_args(time_base, frame_rate))?;
    graph.add(&sink, "out", "")?;
    graph
        .output("in", 0)?
        .input("out", 0)?
        .parse(description)
        .map_err(|e| {
            Error::invalid(format!("invalid filter description {:?}: {}", description, e))
        })?;
    graph.validate()?;

    let (out_time_base, out_frame_rate) = {
        let out = graph
            .get("out")
            .ok_or_else(|| Error::invalid("filter graph has no sink"))?;
        unsafe {
            (
                ffmpeg_next::ffi::av_buffersink_get_time_base(out.as_ptr()),
                ffmpeg_next::ffi::av_buffersink_get_frame_rate(out.as_ptr()),
            )
        }
    };
    Ok(Built {
        graph,
        time_base: out_time_base.into(),
        frame_rate: valid_rate(out_frame_rate.into()),
    })
}

/// A libavfilter graph `buffer -> description -> buffersink` for one output
/// stream.
pub struct FfmpegFilter {
    description: String,
    params: SourceParams,
    input_time_base: Rational,
    input_frame_rate: Option<Rational>,
    built: Built,
    pushed: bool,
    eof_sent: bool,
}

impl FfmpegFilter {
    /// Builds the graph for a stream with the given codec parameters. The
    /// graph is rebuilt if decoded frames turn out to differ from them.
    pub fn new(
        parameters: &ffmpeg_next::codec::Parameters,
        time_base: Rational,
        frame_rate: Rational,
        description: &str,
    ) -> Result<Self> {
        let params = SourceParams::from_parameters(parameters)?;
        let input_frame_rate = valid_rate(frame_rate);
        let built = build(&params, time_base, input_frame_rate, description)?;
        Ok(Self {
            description: description.to_string(),
            params,
            input_time_base: time_base,
            input_frame_rate,
            built,
            pushed: false,
            eof_sent: false,
        })
    }

    fn rebuild(&mut self) -> Result<()> {
        self.built = build(
            &self.params,
            self.input_time_base,
            self.input_frame_rate,
            &self.description,
        )?;
        self.pushed = false;
        self.eof_sent = false;
        Ok(())
    }

    fn source(&mut self) -> Result<filter::Context<'_>> {
        self.built
            .graph
            .get("in")
            .ok_or_else(|| Error::invalid("filter graph has no source"))
    }
}

impl FilterGraph for FfmpegFilter {
    type Input = DecodedFrame;

    fn push(&mut self, decoded: Option<&DecodedFrame>) -> Result<()> {
        let Some(decoded) = decoded else {
            if !self.eof_sent {
                self.source()?.source().flush()?;
                self.eof_sent = true;
            }
            return Ok(());
        };

        let params = SourceParams::from_frame(decoded)?;
        if params != self.params {
            if self.pushed {
                log::warn!(
                    "decoded frames changed from {:?} to {:?}, rebuilding filter graph {:?}",
                    self.params,
                    params,
                    self.description
                );
            }
            self.params = params;
            self.rebuild()?;
        }
        self.source()?.source().add(decoded.as_frame())?;
        self.pushed = true;
        Ok(())
    }

    fn pull(&mut self) -> Result<Status<Frame>> {
        let Built {
            graph,
            time_base,
            frame_rate,
        } = &mut self.built;
        let mut out = graph
            .get("out")
            .ok_or_else(|| Error::invalid("filter graph has no sink"))?;

        let result = match self.params {
            SourceParams::Audio { .. } => {
                let mut audio = ffmpeg_next::frame::Audio::empty();
                out.sink()
                    .frame(&mut audio)
                    .map(|()| frame::audio_frame(&audio, *time_base))
            }
            SourceParams::Video { .. } => {
                let mut video = ffmpeg_next::frame::Video::empty();
                out.sink()
                    .frame(&mut video)
                    .map(|()| frame::video_frame(&video, *time_base, *frame_rate))
            }
        };
        match result {
            Ok(converted) => Ok(Status::Ready(converted?)),
            Err(ffmpeg_next::Error::Eof) => Ok(Status::Eof),
            Err(ref err) if is_again(err) => Ok(Status::Again),
            Err(err) => Err(err.into()),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.rebuild()
    }

    fn description(&self) -> &str {
        &self.description
    }
}

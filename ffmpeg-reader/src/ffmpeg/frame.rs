//! Conversion of filtered libav frames into contiguous [`Frame`]s.
//!
//! Audio is always emitted interleaved; planar sample formats are
//! interleaved here and reported by their packed name. Video planes are
//! copied row by row without the line padding libav adds.

use bytes::{BufMut, Bytes, BytesMut};
use ffmpeg_next::Rational;

use super::stream;
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameLayout};

fn pts_seconds(pts: Option<i64>, time_base: Rational) -> Option<f64> {
    pts.map(|pts| stream::time_base(time_base).to_seconds(pts))
}

pub(crate) fn audio_frame(
    frame: &ffmpeg_next::frame::Audio,
    time_base: Rational,
) -> Result<Frame> {
    let format = frame.format();
    let samples = frame.samples();
    let channels = frame.channels() as usize;
    let bytes_per_sample = format.bytes();
    if samples == 0 || channels == 0 {
        return Err(Error::invalid("empty audio frame"));
    }

    let mut data = BytesMut::with_capacity(samples * channels * bytes_per_sample);
    if format.is_planar() {
        if channels > frame.planes() {
            return Err(Error::invalid(format!(
                "planar audio with {} channels is not supported",
                channels
            )));
        }
        for i in 0..samples {
            let offset = i * bytes_per_sample;
            for ch in 0..channels {
                data.put_slice(&frame.data(ch)[offset..offset + bytes_per_sample]);
            }
        }
    } else {
        data.put_slice(&frame.data(0)[..samples * channels * bytes_per_sample]);
    }

    let layout = FrameLayout::Audio {
        sample_rate: frame.rate(),
        channels: channels as u32,
        sample_format: format.packed().name().to_string(),
    };
    Frame::new(
        pts_seconds(frame.pts(), time_base),
        1.0 / frame.rate().max(1) as f64,
        samples,
        layout,
        data.freeze(),
    )
}

pub(crate) fn video_frame(
    frame: &ffmpeg_next::frame::Video,
    time_base: Rational,
    frame_rate: Option<Rational>,
) -> Result<Frame> {
    let format = frame.format();
    let width = frame.width();
    let height = frame.height();
    let pixel_format = format
        .descriptor()
        .map(|d| d.name().to_string())
        .ok_or_else(|| Error::invalid(format!("unknown pixel format: {:?}", format)))?;

    let mut data = BytesMut::new();
    for plane in 0..frame.planes() {
        let row_bytes = unsafe {
            ffmpeg_next::ffi::av_image_get_linesize(format.into(), width as i32, plane as i32)
        };
        if row_bytes <= 0 {
            return Err(Error::invalid(format!(
                "cannot copy plane {} of {} frame",
                plane, pixel_format
            )));
        }
        let row_bytes = row_bytes as usize;
        let stride = frame.stride(plane);
        let plane_data = frame.data(plane);
        for row in 0..frame.plane_height(plane) as usize {
            let start = row * stride;
            data.put_slice(&plane_data[start..start + row_bytes]);
        }
    }

    // One picture per frame; its duration follows the sink frame rate.
    let unit_duration = frame_rate
        .filter(|r| r.numerator() > 0 && r.denominator() > 0)
        .map(|r| 1.0 / f64::from(r))
        .unwrap_or(0.0);
    let layout = FrameLayout::Video {
        width,
        height,
        pixel_format,
    };
    Frame::new(
        pts_seconds(frame.pts(), time_base),
        unit_duration,
        1,
        layout,
        Bytes::from(data),
    )
}

#[cfg(test)]
pub(super) mod tests {
    use ffmpeg_next::ffi::AVSampleFormat;
    use ffmpeg_next::format::Pixel;

    use super::*;

    /// An audio frame with allocated, zeroed planes.
    pub(in crate::ffmpeg) fn audio(
        format: AVSampleFormat,
        channels: i32,
        rate: i32,
        samples: i32,
        pts: i64,
    ) -> ffmpeg_next::frame::Audio {
        let mut audio = ffmpeg_next::frame::Audio::empty();
        unsafe {
            let ptr = audio.as_mut_ptr();
            (*ptr).format = format as i32;
            (*ptr).sample_rate = rate;
            (*ptr).nb_samples = samples;
            ffmpeg_next::ffi::av_channel_layout_default(&mut (*ptr).ch_layout, channels);
            assert!(ffmpeg_next::ffi::av_frame_get_buffer(ptr, 0) >= 0);
        }
        for plane in 0..audio.planes() {
            audio.data_mut(plane).fill(0);
        }
        audio.set_pts(Some(pts));
        audio
    }

    #[test]
    fn test_planar_audio_is_interleaved() -> anyhow::Result<()> {
        let mut planar = audio(AVSampleFormat::AV_SAMPLE_FMT_S16P, 2, 8000, 3, 16000);
        planar.data_mut(0)[..6].copy_from_slice(&[1, 0, 2, 0, 3, 0]);
        planar.data_mut(1)[..6].copy_from_slice(&[9, 0, 8, 0, 7, 0]);

        let frame = audio_frame(&planar, Rational::new(1, 8000))?;
        assert_eq!(frame.pts(), Some(2.0));
        assert_eq!(frame.num_frames(), 3);
        assert_eq!(
            frame.layout(),
            &FrameLayout::Audio {
                sample_rate: 8000,
                channels: 2,
                sample_format: "s16".to_string(),
            }
        );
        assert_eq!(
            frame.data().as_ref(),
            &[1, 0, 9, 0, 2, 0, 8, 0, 3, 0, 7, 0]
        );
        Ok(())
    }

    #[test]
    fn test_packed_audio_is_copied() -> anyhow::Result<()> {
        let mut packed = audio(AVSampleFormat::AV_SAMPLE_FMT_U8, 1, 40, 4, 0);
        packed.data_mut(0)[..4].copy_from_slice(&[10, 20, 30, 40]);
        let frame = audio_frame(&packed, Rational::new(1, 40))?;
        assert_eq!(frame.data().as_ref(), &[10, 20, 30, 40]);
        assert_eq!(frame.pts(), Some(0.0));
        Ok(())
    }

    #[test]
    fn test_video_rows_drop_line_padding() -> anyhow::Result<()> {
        let mut video = ffmpeg_next::frame::Video::new(Pixel::GRAY8, 3, 2);
        let stride = video.stride(0);
        assert!(stride > 3);
        for row in 0..2 {
            let start = row * stride;
            video.data_mut(0)[start..start + 3].copy_from_slice(&[row as u8; 3]);
        }
        video.set_pts(Some(5));

        let frame = video_frame(&video, Rational::new(1, 10), Some(Rational::new(10, 1)))?;
        assert_eq!(frame.pts(), Some(0.5));
        assert_eq!(frame.data().as_ref(), &[0, 0, 0, 1, 1, 1]);
        assert_eq!(
            frame.layout(),
            &FrameLayout::Video {
                width: 3,
                height: 2,
                pixel_format: "gray".to_string(),
            }
        );
        Ok(())
    }

    #[test]
    fn test_planar_video_copies_every_plane() -> anyhow::Result<()> {
        let video = ffmpeg_next::frame::Video::new(Pixel::YUV420P, 4, 4);
        let frame = video_frame(&video, Rational::new(1, 25), None)?;
        assert_eq!(frame.data().len(), 16 + 4 + 4);
        assert_eq!(frame.num_frames(), 1);
        assert_eq!(frame.pts(), None);
        Ok(())
    }
}

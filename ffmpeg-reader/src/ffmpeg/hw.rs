//! CUDA decoder discovery.

/// Finds the NVDEC (cuvid) decoder for `codec_id`, if libav was built with it.
pub fn find_cuvid_decoder(codec_id: ffmpeg_next::codec::Id) -> Option<ffmpeg_next::Codec> {
    let name = match codec_id {
        ffmpeg_next::codec::Id::H264 => "h264_cuvid",
        ffmpeg_next::codec::Id::HEVC => "hevc_cuvid",
        ffmpeg_next::codec::Id::VP8 => "vp8_cuvid",
        ffmpeg_next::codec::Id::VP9 => "vp9_cuvid",
        ffmpeg_next::codec::Id::AV1 => "av1_cuvid",
        ffmpeg_next::codec::Id::MJPEG => "mjpeg_cuvid",
        ffmpeg_next::codec::Id::MPEG1VIDEO => "mpeg1_cuvid",
        ffmpeg_next::codec::Id::MPEG2VIDEO => "mpeg2_cuvid",
        ffmpeg_next::codec::Id::MPEG4 => "mpeg4_cuvid",
        ffmpeg_next::codec::Id::VC1 => "vc1_cuvid",
        _ => return None,
    };
    let codec = ffmpeg_next::decoder::find_by_name(name)?;
    log::info!("found hardware decoder: {}", name);
    Some(codec)
}

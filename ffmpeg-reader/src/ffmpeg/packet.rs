use crate::backend::Packet;

/// A demuxed packet on its way to the decoder of its stream.
pub struct FfmpegPacket(ffmpeg_next::codec::packet::Packet);

impl FfmpegPacket {
    pub fn packet(&self) -> &ffmpeg_next::codec::packet::Packet {
        &self.0
    }
}

impl Packet for FfmpegPacket {
    fn stream_index(&self) -> usize {
        self.0.stream()
    }
}

impl From<ffmpeg_next::codec::packet::Packet> for FfmpegPacket {
    fn from(packet: ffmpeg_next::codec::packet::Packet) -> Self {
        Self(packet)
    }
}

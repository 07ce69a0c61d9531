use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Media kind of a source stream. Only audio and video can be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Other,
}

impl MediaKind {
    pub fn is_decodable(&self) -> bool {
        matches!(self, MediaKind::Audio | MediaKind::Video)
    }

    /// Pass-through filter used when an output stream has no description.
    pub fn null_filter(&self) -> &'static str {
        match self {
            MediaKind::Audio => "anull",
            _ => "null",
        }
    }
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Rational time base, e.g. 1/48000 or 1/90000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn to_seconds(&self, ts: i64) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        ts as f64 * self.num as f64 / self.den as f64
    }
}

impl Display for TimeBase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Where decoded chunks are destined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(u32),
}

impl Display for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(index) => write!(f, "cuda:{}", index),
        }
    }
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.split_once(':') {
            None if s == "cpu" => Ok(Device::Cpu),
            None if s == "cuda" => Ok(Device::Cuda(0)),
            Some(("cuda", index)) => index
                .parse::<u32>()
                .map(Device::Cuda)
                .map_err(|_| Error::invalid(format!("invalid device index: {:?}", index))),
            _ => Err(Error::invalid(format!("unknown device: {:?}", s))),
        }
    }
}

/// Resolves the `hw_accel` argument of a video output stream.
///
/// No request means CPU. A request is only honoured when the crate is built
/// with the `cuda` feature and the device is a CUDA device.
pub fn resolve_hw_accel(hw_accel: Option<&str>) -> Result<Device, Error> {
    let Some(requested) = hw_accel else {
        return Ok(Device::Cpu);
    };
    if !cfg!(feature = "cuda") {
        return Err(Error::HwAccelUnavailable(format!(
            "not compiled with CUDA support (requested {:?})",
            requested
        )));
    }
    match requested.parse::<Device>()? {
        device @ Device::Cuda(_) => Ok(device),
        other => Err(Error::UnsupportedDevice(other.to_string())),
    }
}

// SPDX-License-Identifier: GPL-2.0-or-later

use crate::time::MPEG_TS_TIMESCALE;
use bytes::Bytes;

/// One access unit in AVCC framing.
#[derive(Clone, Debug, Default)]
pub struct VideoSample {
    /// Presentation timestamp in 90 kHz ticks.
    pub pts: i64,

    /// Decode timestamp in 90 kHz ticks.
    pub dts: i64,

    pub data: Bytes,
    pub keyframe: bool,
}

#[derive(Clone, Debug, Default)]
pub struct AudioSample {
    pub pts: i64,
    pub data: Bytes,
}

/// Timed opaque payload (ID3 or WebVTT carried in the container).
#[derive(Clone, Debug, Default)]
pub struct MetadataSample {
    pub pts: i64,
    pub data: Bytes,
}

#[derive(Clone, Debug)]
pub struct VideoTrack {
    pub samples: Vec<VideoSample>,
    pub sps: Option<Bytes>,
    pub pps: Option<Bytes>,

    /// RFC 6381 codec string, e.g. "avc1.64001f".
    pub codec: Option<String>,

    pub width: u16,
    pub height: u16,
    pub timescale: u32,

    /// Samples discarded before the first keyframe.
    pub dropped: u32,
}

impl Default for VideoTrack {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            sps: None,
            pps: None,
            codec: None,
            width: 0,
            height: 0,
            timescale: MPEG_TS_TIMESCALE,
            dropped: 0,
        }
    }
}

impl VideoTrack {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn has_parameter_sets(&self) -> bool {
        self.sps.is_some() && self.pps.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct AudioTrack {
    pub samples: Vec<AudioSample>,

    /// RFC 6381 codec string, e.g. "mp4a.40.2".
    pub codec: Option<String>,

    /// AudioSpecificConfig for the esds box. Empty for MPEG audio.
    pub config: Vec<u8>,

    pub sample_rate: u32,
    pub channels: u8,

    /// PCM samples per coded frame: 1024 for AAC, 1152 for MP3.
    pub samples_per_frame: u32,

    pub timescale: u32,
}

impl Default for AudioTrack {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            codec: None,
            config: Vec::new(),
            sample_rate: 0,
            channels: 0,
            samples_per_frame: 1024,
            timescale: MPEG_TS_TIMESCALE,
        }
    }
}

impl AudioTrack {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    // Frame duration in track ticks.
    #[must_use]
    pub fn frame_duration(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        i64::from(self.samples_per_frame) * i64::from(self.timescale)
            / i64::from(self.sample_rate)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MetadataTrack {
    pub samples: Vec<MetadataSample>,
}

impl MetadataTrack {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Already fragmented MP4 bytes forwarded without re-packaging.
#[derive(Clone, Debug)]
pub struct PassthroughSegment {
    pub data: Bytes,

    /// Inline init segment when the payload carried a moov box.
    pub init: Option<Bytes>,

    /// Earliest base decode time across track fragments, in seconds.
    pub start_time: Option<f64>,
}

/// Elementary streams produced by one demux call.
#[derive(Clone, Debug, Default)]
pub struct DemuxedTracks {
    pub audio: AudioTrack,
    pub video: VideoTrack,
    pub id3: MetadataTrack,
    pub text: MetadataTrack,

    /// Set by the fragmented MP4 demuxer only.
    pub passthrough: Option<PassthroughSegment>,
}

impl DemuxedTracks {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
            && self.video.is_empty()
            && self.id3.is_empty()
            && self.passthrough.is_none()
    }
}

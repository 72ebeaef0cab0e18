mod fragment;
mod init;
mod mp4;
mod passthrough;

pub use mp4::Mp4Remuxer;
pub use passthrough::PassthroughRemuxer;

use bytes::Bytes;
use common::track::{DemuxedTracks, MetadataSample};

// 14496-12_2015 8.3.2.3
// track_ID is an integer that uniquely identifies this track
// over the entire life-time of this presentation.
// Track IDs are never re-used and cannot be zero.
pub const VIDEO_TRACK_ID: u32 = 1;
pub const AUDIO_TRACK_ID: u32 = 2;

/// Repackages elementary streams into fragmented MP4.
pub trait Remuxer: Send {
    fn remux(
        &mut self,
        tracks: DemuxedTracks,
        time_offset: f64,
        accurate_time_offset: bool,
        flush: bool,
        id: u64,
    ) -> RemuxResult;

    fn reset_init_segment(
        &mut self,
        init_segment: Option<Bytes>,
        audio_codec: Option<&str>,
        video_codec: Option<&str>,
    );

    fn reset_timestamp(&mut self, default_init_pts: Option<i64>);

    fn reset_next_timestamp(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,

    /// Interleaved audio and video forwarded as-is.
    Muxed,
}

/// Codec initialization header for the downstream buffer.
#[derive(Clone, Debug)]
pub struct InitSegment {
    pub data: Bytes,
    pub audio_codec: Option<String>,
    pub video_codec: Option<String>,
}

/// One moof+mdat pair for a single track.
#[derive(Clone, Debug)]
pub struct Fragment {
    pub kind: TrackKind,
    pub data: Bytes,

    /// Presentation window in seconds.
    pub start_pts: f64,
    pub end_pts: f64,
    pub start_dts: f64,

    pub sample_count: u32,

    /// Starts with a keyframe.
    pub independent: bool,
}

#[derive(Clone, Debug, Default)]
pub struct RemuxResult {
    pub init_segment: Option<InitSegment>,
    pub audio: Option<Fragment>,
    pub video: Option<Fragment>,
    pub id3: Vec<MetadataSample>,
    pub text: Vec<MetadataSample>,
}

impl RemuxResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.init_segment.is_none()
            && self.audio.is_none()
            && self.video.is_none()
            && self.id3.is_empty()
            && self.text.is_empty()
    }
}

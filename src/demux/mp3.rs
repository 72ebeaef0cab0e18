use crate::{sample_aes::SampleAesError, strip_id3, Demuxer};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use common::{
    time::{seconds_to_ticks, MPEG_TS_TIMESCALE},
    track::{AudioSample, AudioTrack, DemuxedTracks, MetadataSample, MetadataTrack},
    ArcMsgLogger, KeyData, LogLevel,
};

pub const MP3_MIN_PROBE_BYTE_LENGTH: usize = 4;

// Layer III bitrates in kbit/s, by version.
const BITRATES_V1: [u32; 16] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0,
];
const BITRATES_V2: [u32; 16] = [
    0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0,
];

const SAMPLE_RATES_V1: [u32; 3] = [44100, 48000, 32000];

fn is_header(data: &[u8]) -> bool {
    // Eleven sync bits with a non-zero layer, distinguishing MPEG
    // audio from ADTS.
    data.len() >= 2 && data[0] == 0xff && data[1] & 0xe0 == 0xe0 && data[1] & 0x06 != 0
}

#[must_use]
pub fn probe_mp3(data: &[u8]) -> bool {
    let data = strip_id3(data);
    is_header(data) && parse_header(data).is_some()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Mp3Header {
    pub sample_rate: u32,
    pub channels: u8,
    pub samples_per_frame: u32,
    pub frame_len: usize,
}

// Layer III only. Other layers fail the parse and are skipped.
pub(crate) fn parse_header(data: &[u8]) -> Option<Mp3Header> {
    if !is_header(data) || data.len() < 4 {
        return None;
    }

    let version = data[1] >> 3 & 0x3; // 0=2.5, 2=2, 3=1.
    let layer = data[1] >> 1 & 0x3;
    if layer != 1 {
        // Not layer III.
        return None;
    }

    let bitrate_index = usize::from(data[2] >> 4);
    let sample_rate_index = usize::from(data[2] >> 2 & 0x3);
    if sample_rate_index == 3 {
        return None;
    }
    let padding = u32::from(data[2] >> 1 & 1);

    let bitrate = if version == 3 {
        BITRATES_V1[bitrate_index]
    } else {
        BITRATES_V2[bitrate_index]
    } * 1000;
    if bitrate == 0 {
        return None;
    }

    let sample_rate = match version {
        3 => SAMPLE_RATES_V1[sample_rate_index],
        2 => SAMPLE_RATES_V1[sample_rate_index] / 2,
        0 => SAMPLE_RATES_V1[sample_rate_index] / 4,
        _ => return None,
    };

    let samples_per_frame: u32 = if version == 3 { 1152 } else { 576 };
    let frame_len =
        usize::try_from(samples_per_frame / 8 * bitrate / sample_rate + padding).ok()?;

    let channel_mode = data[3] >> 6;
    let channels = if channel_mode == 3 { 1 } else { 2 };

    Some(Mp3Header {
        sample_rate,
        channels,
        samples_per_frame,
        frame_len,
    })
}

/// Demuxer for MPEG audio (MP3) streams.
pub struct Mp3Demuxer {
    logger: ArcMsgLogger,
    remainder: BytesMut,
    config: Option<Mp3Header>,
    next_pts: Option<i64>,
}

impl Mp3Demuxer {
    #[must_use]
    pub fn new(logger: ArcMsgLogger) -> Self {
        Self {
            logger,
            remainder: BytesMut::new(),
            config: None,
            next_pts: None,
        }
    }

    fn parse_frames(&mut self, flush: bool) -> AudioTrack {
        let mut track = AudioTrack::default();

        loop {
            let data = &self.remainder[..];
            if data.is_empty() {
                break;
            }
            if !is_header(data) {
                let Some(skip) = data.iter().skip(1).position(|&b| b == 0xff) else {
                    self.remainder.clear();
                    break;
                };
                self.logger
                    .log(LogLevel::Warning, &format!("mp3: skipping {} bytes", skip + 1));
                let _ = self.remainder.split_to(skip + 1);
                continue;
            }
            let Some(header) = parse_header(data) else {
                if flush {
                    self.remainder.clear();
                }
                break;
            };
            if data.len() < header.frame_len {
                if flush {
                    self.remainder.clear();
                }
                break;
            }

            if self.config.is_none() {
                self.config = Some(header);
            }

            // MPEG audio frames keep their headers.
            let frame = self.remainder.split_to(header.frame_len);
            let pts = self.next_pts.unwrap_or(0);
            track.samples.push(AudioSample {
                pts,
                data: Bytes::copy_from_slice(&frame),
            });
            self.next_pts = Some(
                pts + i64::from(header.samples_per_frame) * i64::from(MPEG_TS_TIMESCALE)
                    / i64::from(header.sample_rate),
            );
        }

        if let Some(config) = &self.config {
            track.codec = Some("mp3".to_owned());
            track.sample_rate = config.sample_rate;
            track.channels = config.channels;
            track.samples_per_frame = config.samples_per_frame;
        }
        track
    }
}

#[async_trait]
impl Demuxer for Mp3Demuxer {
    fn demux(
        &mut self,
        data: Bytes,
        time_offset: f64,
        contiguous: bool,
        flush: bool,
    ) -> DemuxedTracks {
        if !contiguous || self.next_pts.is_none() {
            self.next_pts = Some(seconds_to_ticks(time_offset));
        }

        let mut id3 = MetadataTrack::default();
        let payload = strip_id3(&data);
        if payload.len() < data.len() {
            id3.samples.push(MetadataSample {
                pts: self.next_pts.unwrap_or(0),
                data: data.slice(..data.len() - payload.len()),
            });
        }

        self.remainder.extend_from_slice(payload);
        DemuxedTracks {
            audio: self.parse_frames(flush),
            id3,
            ..Default::default()
        }
    }

    async fn demux_sample_aes(
        &mut self,
        _data: Bytes,
        _key_data: KeyData,
        _time_offset: f64,
    ) -> Result<DemuxedTracks, SampleAesError> {
        Err(SampleAesError::Unsupported("mp3"))
    }

    fn flush(&mut self, _time_offset: f64) -> DemuxedTracks {
        DemuxedTracks {
            audio: self.parse_frames(true),
            ..Default::default()
        }
    }

    fn reset_init_segment(
        &mut self,
        _init_segment: Option<Bytes>,
        _audio_codec: Option<&str>,
        _video_codec: Option<&str>,
        _duration: f64,
    ) {
        self.config = None;
    }

    fn reset_timestamp(&mut self, default_init_pts: Option<i64>) {
        self.next_pts = default_init_pts;
    }

    fn reset_contiguity(&mut self) {
        self.next_pts = None;
        self.remainder.clear();
    }
}

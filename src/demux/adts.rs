use crate::{sample_aes::SampleAesError, strip_id3, Demuxer};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use common::{
    time::{seconds_to_ticks, MPEG_TS_TIMESCALE},
    track::{AudioSample, AudioTrack, DemuxedTracks, MetadataSample, MetadataTrack},
    ArcMsgLogger, KeyData, LogLevel,
};

pub const ADTS_MIN_PROBE_BYTE_LENGTH: usize = 9;

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

// Sync word plus zero layer bits.
fn is_header(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xff && data[1] & 0xf6 == 0xf0
}

#[must_use]
pub fn probe_adts(data: &[u8]) -> bool {
    let data = strip_id3(data);
    is_header(data) && parse_header(data).is_some()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AdtsHeader {
    pub object_type: u8,
    pub sampling_freq_index: u8,
    pub sample_rate: u32,
    pub channels: u8,
    pub header_len: usize,
    pub frame_len: usize,
}

impl AdtsHeader {
    // Two byte AudioSpecificConfig for the esds box.
    pub(crate) fn audio_specific_config(&self) -> Vec<u8> {
        vec![
            self.object_type << 3 | self.sampling_freq_index >> 1,
            (self.sampling_freq_index & 1) << 7 | self.channels << 3,
        ]
    }

    pub(crate) fn codec(&self) -> String {
        format!("mp4a.40.{}", self.object_type)
    }
}

pub(crate) fn parse_header(data: &[u8]) -> Option<AdtsHeader> {
    if !is_header(data) || data.len() < 7 {
        return None;
    }

    let protection_absent = data[1] & 1 == 1;
    let object_type = (data[2] >> 6) + 1;
    let sampling_freq_index = data[2] >> 2 & 0xf;
    let sample_rate = *SAMPLE_RATES.get(usize::from(sampling_freq_index))?;
    let channels = (data[2] & 1) << 2 | data[3] >> 6;

    let frame_len = usize::from(data[3] & 0x3) << 11
        | usize::from(data[4]) << 3
        | usize::from(data[5]) >> 5;
    let header_len = if protection_absent { 7 } else { 9 };
    if frame_len <= header_len {
        return None;
    }

    Some(AdtsHeader {
        object_type,
        sampling_freq_index,
        sample_rate,
        channels,
        header_len,
        frame_len,
    })
}

/// Demuxer for raw ADTS/AAC streams.
pub struct AdtsDemuxer {
    logger: ArcMsgLogger,
    remainder: BytesMut,
    config: Option<AdtsHeader>,
    next_pts: Option<i64>,
    audio_codec: Option<String>,
}

impl AdtsDemuxer {
    #[must_use]
    pub fn new(logger: ArcMsgLogger) -> Self {
        Self {
            logger,
            remainder: BytesMut::new(),
            config: None,
            next_pts: None,
            audio_codec: None,
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
                // Lost sync, scan for the next sync word.
                let Some(skip) = data.iter().skip(1).position(|&b| b == 0xff) else {
                    self.remainder.clear();
                    break;
                };
                self.logger
                    .log(LogLevel::Warning, &format!("adts: skipping {} bytes", skip + 1));
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
                // Incomplete frame, wait for the next chunk.
                if flush {
                    self.remainder.clear();
                }
                break;
            }

            if self.config.is_none() {
                self.config = Some(header);
            }
            let frame = self.remainder.split_to(header.frame_len);
            let pts = self.next_pts.unwrap_or(0);

            let config = self.config.unwrap_or(header);
            track.samples.push(AudioSample {
                pts,
                data: Bytes::copy_from_slice(&frame[header.header_len..]),
            });
            self.next_pts = Some(
                pts + i64::from(track.samples_per_frame) * i64::from(MPEG_TS_TIMESCALE)
                    / i64::from(config.sample_rate),
            );
        }

        if let Some(config) = &self.config {
            track.codec = Some(config.codec());
            track.config = config.audio_specific_config();
            track.sample_rate = config.sample_rate;
            track.channels = config.channels;
        } else {
            track.codec = self.audio_codec.clone();
        }
        track
    }
}

#[async_trait]
impl Demuxer for AdtsDemuxer {
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
        Err(SampleAesError::Unsupported("adts"))
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
        audio_codec: Option<&str>,
        _video_codec: Option<&str>,
        _duration: f64,
    ) {
        self.config = None;
        self.audio_codec = audio_codec.map(ToOwned::to_owned);
    }

    fn reset_timestamp(&mut self, default_init_pts: Option<i64>) {
        self.next_pts = default_init_pts;
    }

    fn reset_contiguity(&mut self) {
        self.next_pts = None;
        self.remainder.clear();
    }
}

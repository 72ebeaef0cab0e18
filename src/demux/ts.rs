use crate::{adts, avc, sample_aes, sample_aes::SampleAesError, Demuxer};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use common::{
    time::{normalize_pts, MPEG_TS_TIMESCALE},
    track::{
        AudioSample, AudioTrack, DemuxedTracks, MetadataSample, MetadataTrack, VideoSample,
        VideoTrack,
    },
    ArcMsgLogger, KeyData, LogLevel,
};
use mpeg2ts_reader::{
    demultiplex::{self, DemuxContext, FilterChangeset, FilterRequest},
    packet_filter_switch,
    pes::{self, PesHeader},
    psi, StreamType,
};

const PACKET_SIZE: usize = 188;

pub const TS_MIN_PROBE_BYTE_LENGTH: usize = 3 * PACKET_SIZE;

// Three sync bytes at packet cadence.
fn sync_offset(data: &[u8]) -> Option<usize> {
    if data.len() < TS_MIN_PROBE_BYTE_LENGTH {
        return None;
    }
    (0..=data.len() - TS_MIN_PROBE_BYTE_LENGTH).find(|&i| {
        data[i] == 0x47 && data[i + PACKET_SIZE] == 0x47 && data[i + 2 * PACKET_SIZE] == 0x47
    })
}

#[must_use]
pub fn probe_ts(data: &[u8]) -> bool {
    sync_offset(data).is_some()
}

// One partially assembled PES packet.
#[derive(Default)]
struct PendingPes {
    data: Vec<u8>,
    pts: Option<u64>,
    dts: Option<u64>,
}

fn parse_timestamps(header: &PesHeader<'_>) -> PendingPes {
    let mut pending = PendingPes::default();
    match header.contents() {
        pes::PesContents::Parsed(Some(parsed)) => {
            match parsed.pts_dts() {
                Ok(pes::PtsDts::PtsOnly(Ok(pts))) => {
                    pending.pts = Some(pts.value());
                }
                Ok(pes::PtsDts::Both {
                    pts: Ok(pts),
                    dts: Ok(dts),
                }) => {
                    pending.pts = Some(pts.value());
                    pending.dts = Some(dts.value());
                }
                _ => {}
            }
            pending.data.extend_from_slice(parsed.payload());
        }
        pes::PesContents::Parsed(None) => {}
        pes::PesContents::Payload(payload) => {
            pending.data.extend_from_slice(payload);
        }
    }
    pending
}

#[derive(Default)]
struct VideoStream {
    pending: Option<PendingPes>,
    samples: Vec<VideoSample>,
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    codec: Option<String>,
    width: u16,
    height: u16,
    last_pts: Option<i64>,
    dropped: u32,
}

impl VideoStream {
    // One PES packet is treated as one access unit.
    fn finish(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let units = avc::split_nal_units(&pending.data);
        if units.is_empty() {
            return;
        }

        let Some(raw_pts) = pending.pts.and_then(|v| i64::try_from(v).ok()) else {
            // No decodable timestamp, nothing to anchor the unit to.
            self.dropped += 1;
            return;
        };
        let pts = normalize_pts(raw_pts, self.last_pts);
        let dts = match pending.dts.and_then(|v| i64::try_from(v).ok()) {
            Some(raw_dts) => normalize_pts(raw_dts, self.last_pts),
            None => pts,
        };
        self.last_pts = Some(pts);

        let mut keyframe = false;
        let mut kept = Vec::with_capacity(units.len());
        for unit in units {
            match avc::nal_unit_type(unit) {
                avc::NAL_AUD => continue,
                avc::NAL_IDR => keyframe = true,
                avc::NAL_SPS if self.sps.is_none() => {
                    self.sps = Some(Bytes::copy_from_slice(unit));
                    self.codec = avc::codec_string(unit);
                    if let Ok(info) = avc::parse_sps(unit) {
                        self.width = info.width;
                        self.height = info.height;
                    }
                }
                avc::NAL_PPS if self.pps.is_none() => {
                    self.pps = Some(Bytes::copy_from_slice(unit));
                }
                _ => {}
            }
            kept.push(unit);
        }

        self.samples.push(VideoSample {
            pts,
            dts,
            data: avc::units_to_avcc(kept),
            keyframe,
        });
    }

    fn collect(&mut self) -> VideoTrack {
        VideoTrack {
            samples: std::mem::take(&mut self.samples),
            sps: self.sps.clone(),
            pps: self.pps.clone(),
            codec: self.codec.clone(),
            width: self.width,
            height: self.height,
            timescale: MPEG_TS_TIMESCALE,
            dropped: std::mem::take(&mut self.dropped),
        }
    }
}

#[derive(Default)]
struct AudioStream {
    pending: Option<PendingPes>,
    remainder: BytesMut,
    samples: Vec<AudioSample>,
    config: Option<adts::AdtsHeader>,
    next_pts: Option<i64>,
    last_pts: Option<i64>,
}

impl AudioStream {
    fn finish(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if let Some(raw_pts) = pending.pts.and_then(|v| i64::try_from(v).ok()) {
            let pts = normalize_pts(raw_pts, self.last_pts);
            self.last_pts = Some(pts);
            self.next_pts = Some(pts);
        }
        self.remainder.extend_from_slice(&pending.data);
        self.parse_frames();
    }

    fn parse_frames(&mut self) {
        loop {
            let data = &self.remainder[..];
            if data.len() < 2 {
                break;
            }
            let Some(header) = adts::parse_header(data) else {
                // Lost sync, scan for the next sync word.
                let Some(skip) = data.iter().skip(1).position(|&b| b == 0xff) else {
                    self.remainder.clear();
                    break;
                };
                let _ = self.remainder.split_to(skip + 1);
                continue;
            };
            if data.len() < header.frame_len {
                break;
            }

            if self.config.is_none() {
                self.config = Some(header);
            }
            let frame = self.remainder.split_to(header.frame_len);
            let pts = self.next_pts.unwrap_or(0);
            self.samples.push(AudioSample {
                pts,
                data: Bytes::copy_from_slice(&frame[header.header_len..]),
            });
            self.next_pts = Some(
                pts + 1024 * i64::from(MPEG_TS_TIMESCALE) / i64::from(header.sample_rate),
            );
        }
    }

    fn collect(&mut self) -> AudioTrack {
        let mut track = AudioTrack {
            samples: std::mem::take(&mut self.samples),
            ..Default::default()
        };
        if let Some(config) = &self.config {
            track.codec = Some(config.codec());
            track.config = config.audio_specific_config();
            track.sample_rate = config.sample_rate;
            track.channels = config.channels;
        }
        track
    }
}

#[derive(Default)]
struct MetaStream {
    pending: Option<PendingPes>,
    samples: Vec<MetadataSample>,
    last_pts: Option<i64>,
}

impl MetaStream {
    fn finish(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.data.is_empty() {
            return;
        }
        let Some(raw_pts) = pending.pts.and_then(|v| i64::try_from(v).ok()) else {
            return;
        };
        let pts = normalize_pts(raw_pts, self.last_pts);
        self.last_pts = Some(pts);
        self.samples.push(MetadataSample {
            pts,
            data: Bytes::from(pending.data),
        });
    }
}

packet_filter_switch! {
    TsFilterSwitch<TsStreams> {
        Avc: pes::PesPacketFilter<TsStreams, AvcStreamConsumer>,
        Adts: pes::PesPacketFilter<TsStreams, AdtsStreamConsumer>,
        Meta: pes::PesPacketFilter<TsStreams, MetaStreamConsumer>,
        Pat: demultiplex::PatPacketFilter<TsStreams>,
        Pmt: demultiplex::PmtPacketFilter<TsStreams>,
        Null: demultiplex::NullPacketFilter<TsStreams>,
    }
}

#[derive(Default)]
pub struct TsStreams {
    changeset: FilterChangeset<TsFilterSwitch>,
    video: VideoStream,
    audio: AudioStream,
    id3: MetaStream,
}

impl DemuxContext for TsStreams {
    type F = TsFilterSwitch;

    fn filter_changeset(&mut self) -> &mut FilterChangeset<Self::F> {
        &mut self.changeset
    }

    fn construct(&mut self, req: FilterRequest<'_, '_>) -> Self::F {
        match req {
            FilterRequest::ByPid(psi::pat::PAT_PID) => {
                TsFilterSwitch::Pat(demultiplex::PatPacketFilter::default())
            }
            // Stuffing and unannounced PIDs.
            FilterRequest::ByPid(_) => {
                TsFilterSwitch::Null(demultiplex::NullPacketFilter::default())
            }
            FilterRequest::ByStream {
                stream_type: StreamType::H264,
                ..
            } => TsFilterSwitch::Avc(pes::PesPacketFilter::new(AvcStreamConsumer)),
            FilterRequest::ByStream {
                stream_type: StreamType::ADTS,
                ..
            } => TsFilterSwitch::Adts(pes::PesPacketFilter::new(AdtsStreamConsumer)),
            // Timed ID3 metadata.
            FilterRequest::ByStream { stream_type, .. } if u8::from(stream_type) == 0x15 => {
                TsFilterSwitch::Meta(pes::PesPacketFilter::new(MetaStreamConsumer))
            }
            FilterRequest::ByStream { .. } => {
                TsFilterSwitch::Null(demultiplex::NullPacketFilter::default())
            }
            FilterRequest::Pmt {
                pid,
                program_number,
            } => TsFilterSwitch::Pmt(demultiplex::PmtPacketFilter::new(pid, program_number)),
            FilterRequest::Nit { .. } => {
                TsFilterSwitch::Null(demultiplex::NullPacketFilter::default())
            }
        }
    }
}

pub struct AvcStreamConsumer;

impl pes::ElementaryStreamConsumer<TsStreams> for AvcStreamConsumer {
    fn start_stream(&mut self, _ctx: &mut TsStreams) {}

    fn begin_packet(&mut self, ctx: &mut TsStreams, header: PesHeader<'_>) {
        ctx.video.finish();
        ctx.video.pending = Some(parse_timestamps(&header));
    }

    fn continue_packet(&mut self, ctx: &mut TsStreams, data: &[u8]) {
        if let Some(pending) = &mut ctx.video.pending {
            pending.data.extend_from_slice(data);
        }
    }

    fn end_packet(&mut self, ctx: &mut TsStreams) {
        ctx.video.finish();
    }

    fn continuity_error(&mut self, ctx: &mut TsStreams) {
        ctx.video.pending = None;
    }
}

pub struct AdtsStreamConsumer;

impl pes::ElementaryStreamConsumer<TsStreams> for AdtsStreamConsumer {
    fn start_stream(&mut self, _ctx: &mut TsStreams) {}

    fn begin_packet(&mut self, ctx: &mut TsStreams, header: PesHeader<'_>) {
        ctx.audio.finish();
        ctx.audio.pending = Some(parse_timestamps(&header));
    }

    fn continue_packet(&mut self, ctx: &mut TsStreams, data: &[u8]) {
        if let Some(pending) = &mut ctx.audio.pending {
            pending.data.extend_from_slice(data);
        }
    }

    fn end_packet(&mut self, ctx: &mut TsStreams) {
        ctx.audio.finish();
    }

    fn continuity_error(&mut self, ctx: &mut TsStreams) {
        ctx.audio.pending = None;
        ctx.audio.remainder.clear();
    }
}

pub struct MetaStreamConsumer;

impl pes::ElementaryStreamConsumer<TsStreams> for MetaStreamConsumer {
    fn start_stream(&mut self, _ctx: &mut TsStreams) {}

    fn begin_packet(&mut self, ctx: &mut TsStreams, header: PesHeader<'_>) {
        ctx.id3.finish();
        ctx.id3.pending = Some(parse_timestamps(&header));
    }

    fn continue_packet(&mut self, ctx: &mut TsStreams, data: &[u8]) {
        if let Some(pending) = &mut ctx.id3.pending {
            pending.data.extend_from_slice(data);
        }
    }

    fn end_packet(&mut self, ctx: &mut TsStreams) {
        ctx.id3.finish();
    }

    fn continuity_error(&mut self, ctx: &mut TsStreams) {
        ctx.id3.pending = None;
    }
}

/// Demuxer for MPEG-TS segments carrying H.264, ADTS/AAC and timed ID3.
pub struct TsDemuxer {
    logger: ArcMsgLogger,
    streams: TsStreams,
    demux: demultiplex::Demultiplex<TsStreams>,
    remainder: BytesMut,
    synced: bool,
    audio_codec: Option<String>,
    video_codec: Option<String>,
}

impl TsDemuxer {
    #[must_use]
    pub fn new(logger: ArcMsgLogger) -> Self {
        let mut streams = TsStreams::default();
        let demux = demultiplex::Demultiplex::new(&mut streams);
        Self {
            logger,
            streams,
            demux,
            remainder: BytesMut::new(),
            synced: false,
            audio_codec: None,
            video_codec: None,
        }
    }

    fn push_packets(&mut self, data: &[u8]) {
        self.remainder.extend_from_slice(data);

        if !self.synced {
            match sync_offset(&self.remainder) {
                Some(0) => self.synced = true,
                Some(offset) => {
                    self.logger.log(
                        LogLevel::Warning,
                        &format!("ts: skipping {offset} bytes to sync"),
                    );
                    let _ = self.remainder.split_to(offset);
                    self.synced = true;
                }
                // Not enough data to find the sync pattern yet.
                None => return,
            }
        }

        let aligned = self.remainder.len() / PACKET_SIZE * PACKET_SIZE;
        if aligned == 0 {
            return;
        }
        let packets = self.remainder.split_to(aligned);
        self.demux.push(&mut self.streams, &packets);
    }

    // Assembles the per-call result and clears the sample queues.
    fn collect(&mut self) -> DemuxedTracks {
        let mut tracks = DemuxedTracks {
            audio: self.streams.audio.collect(),
            video: self.streams.video.collect(),
            id3: MetadataTrack {
                samples: std::mem::take(&mut self.streams.id3.samples),
            },
            text: MetadataTrack::default(),
            passthrough: None,
        };
        if tracks.audio.codec.is_none() {
            tracks.audio.codec = self.audio_codec.clone();
        }
        if tracks.video.codec.is_none() {
            tracks.video.codec = self.video_codec.clone();
        }
        tracks
    }

    fn drain_pending(&mut self) {
        self.streams.video.finish();
        self.streams.audio.finish();
        self.streams.audio.parse_frames();
        self.streams.id3.finish();
    }
}

#[async_trait]
impl Demuxer for TsDemuxer {
    fn demux(
        &mut self,
        data: Bytes,
        _time_offset: f64,
        contiguous: bool,
        flush: bool,
    ) -> DemuxedTracks {
        if !contiguous {
            self.reset_contiguity();
        }
        self.push_packets(&data);
        if flush {
            self.drain_pending();
        }
        self.collect()
    }

    async fn demux_sample_aes(
        &mut self,
        data: Bytes,
        key_data: KeyData,
        time_offset: f64,
    ) -> Result<DemuxedTracks, SampleAesError> {
        // The whole payload is drained so every sample gets decrypted.
        let tracks = self.demux(data, time_offset, true, true);
        tokio::task::spawn_blocking(move || sample_aes::decrypt_tracks(tracks, &key_data))
            .await
            .map_err(|_| SampleAesError::TaskJoin)?
    }

    fn flush(&mut self, _time_offset: f64) -> DemuxedTracks {
        self.drain_pending();
        self.collect()
    }

    fn reset_init_segment(
        &mut self,
        _init_segment: Option<Bytes>,
        audio_codec: Option<&str>,
        video_codec: Option<&str>,
        _duration: f64,
    ) {
        self.audio_codec = audio_codec.map(ToOwned::to_owned);
        self.video_codec = video_codec.map(ToOwned::to_owned);
    }

    fn reset_timestamp(&mut self, _default_init_pts: Option<i64>) {
        self.streams.video.last_pts = None;
        self.streams.audio.last_pts = None;
        self.streams.audio.next_pts = None;
        self.streams.id3.last_pts = None;
    }

    fn reset_contiguity(&mut self) {
        self.streams.video.pending = None;
        self.streams.audio.pending = None;
        self.streams.audio.remainder.clear();
        self.streams.id3.pending = None;
        self.remainder.clear();
        self.synced = false;
        self.reset_timestamp(None);
    }
}

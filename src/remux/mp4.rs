use crate::{
    fragment::{generate_fragment, FragmentSample},
    init::{generate_init, AudioInit, VideoInit},
    Fragment, InitSegment, RemuxResult, Remuxer, TrackKind, AUDIO_TRACK_ID, VIDEO_TRACK_ID,
};
use bytes::Bytes;
use common::{
    time::{seconds_to_ticks, ticks_to_seconds, MPEG_TS_TIMESCALE},
    track::{AudioTrack, DemuxedTracks, VideoTrack},
    ArcEventSink, ArcMsgLogger, ErrorDetails, ErrorKind, ErrorPayload, LogLevel, TransmuxEvent,
    TypeSupported,
};

// Tracks whose configuration changed need a new init segment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct InitSignature {
    video: Option<(Bytes, Bytes, u16, u16)>,
    audio: Option<(Vec<u8>, u32, u8, u8)>,
}

impl InitSignature {
    fn from_tracks(tracks: &DemuxedTracks) -> Self {
        let video = match (&tracks.video.sps, &tracks.video.pps) {
            (Some(sps), Some(pps)) => Some((
                sps.clone(),
                pps.clone(),
                tracks.video.width,
                tracks.video.height,
            )),
            _ => None,
        };
        let audio = (tracks.audio.sample_rate != 0).then(|| {
            (
                tracks.audio.config.clone(),
                tracks.audio.sample_rate,
                tracks.audio.channels,
                audio_object_type(&tracks.audio),
            )
        });
        Self { video, audio }
    }

    fn is_empty(&self) -> bool {
        self.video.is_none() && self.audio.is_none()
    }

    // An init covering `other` does not need to be regenerated for a
    // chunk that merely lost a config the demuxer already reported.
    fn covers(&self, other: &Self) -> bool {
        (other.video.is_none() || self.video == other.video)
            && (other.audio.is_none() || self.audio == other.audio)
    }
}

fn audio_object_type(track: &AudioTrack) -> u8 {
    if track.codec.as_deref() == Some("mp3") {
        fmp4::OBJECT_TYPE_MPEG_AUDIO
    } else {
        fmp4::OBJECT_TYPE_AAC
    }
}

/// Remuxes elementary streams into one fragmented MP4 moof+mdat pair
/// per track and call.
pub struct Mp4Remuxer {
    observer: ArcEventSink,
    logger: ArcMsgLogger,

    init_pts: Option<i64>,
    init_signature: Option<InitSignature>,
    audio_codec_hint: Option<String>,
    video_codec_hint: Option<String>,
    next_video_dts: Option<i64>,
    next_audio_pts: Option<i64>,
    sequence_number: u32,
}

impl Mp4Remuxer {
    #[must_use]
    pub fn new(
        observer: ArcEventSink,
        logger: ArcMsgLogger,
        type_supported: &TypeSupported,
    ) -> Self {
        if !type_supported.mp4 {
            logger.log(LogLevel::Warning, "fmp4 output not supported by this host");
        }
        Self {
            observer,
            logger,
            init_pts: None,
            init_signature: None,
            audio_codec_hint: None,
            video_codec_hint: None,
            next_video_dts: None,
            next_audio_pts: None,
            sequence_number: 0,
        }
    }

    // The timeline baseline maps the earliest timestamp onto the
    // playlist time offset.
    fn establish_init_pts(&mut self, tracks: &DemuxedTracks, time_offset: f64) {
        if self.init_pts.is_some() {
            return;
        }
        let video_dts = tracks.video.samples.first().map(|s| s.dts);
        let audio_pts = tracks.audio.samples.first().map(|s| s.pts);
        let earliest = match (video_dts, audio_pts) {
            (Some(v), Some(a)) => v.min(a),
            (Some(v), None) => v,
            (None, Some(a)) => a,
            (None, None) => return,
        };
        self.init_pts = Some(earliest - seconds_to_ticks(time_offset));
    }

    fn generate_init_segment(&mut self, tracks: &DemuxedTracks) -> Option<InitSegment> {
        let signature = InitSignature::from_tracks(tracks);
        if signature.is_empty() {
            return None;
        }
        if let Some(current) = &self.init_signature {
            if current.covers(&signature) {
                return None;
            }
        }

        let video = signature
            .video
            .as_ref()
            .map(|(sps, pps, width, height)| VideoInit {
                sps,
                pps,
                width: *width,
                height: *height,
            });
        let audio = signature
            .audio
            .as_ref()
            .map(|(config, sample_rate, channels, object_type)| AudioInit {
                object_type: *object_type,
                config,
                sample_rate: *sample_rate,
                channels: *channels,
            });

        let data = match generate_init(video.as_ref(), audio.as_ref()) {
            Ok(data) => data,
            Err(e) => {
                self.observer
                    .emit(&TransmuxEvent::Error(ErrorPayload {
                        kind: ErrorKind::MuxError,
                        details: ErrorDetails::FragParsingError,
                        fatal: false,
                        reason: format!("generate init: {e}"),
                    }));
                return None;
            }
        };

        self.init_signature = Some(signature);
        Some(InitSegment {
            data,
            audio_codec: tracks
                .audio
                .codec
                .clone()
                .or_else(|| self.audio_codec_hint.clone()),
            video_codec: tracks
                .video
                .codec
                .clone()
                .or_else(|| self.video_codec_hint.clone()),
        })
    }

    fn remux_video(&mut self, track: &VideoTrack) -> Option<Fragment> {
        let first = track.samples.first()?;
        let init_pts = self.init_pts.unwrap_or(0);

        let base_dts = self.next_video_dts.unwrap_or(first.dts - init_pts).max(0);

        let mut samples = Vec::with_capacity(track.samples.len());
        let mut data = Vec::new();
        let mut independent = false;
        let mut last_duration = 0;
        for (i, sample) in track.samples.iter().enumerate() {
            let duration = match track.samples.get(i + 1) {
                Some(next) => u32::try_from(next.dts - sample.dts).unwrap_or(0),
                // Reuse the previous duration for the final sample.
                None => last_duration,
            };
            last_duration = duration;

            if sample.keyframe {
                independent = true;
            }
            samples.push(FragmentSample {
                duration,
                size: u32::try_from(sample.data.len()).unwrap_or(u32::MAX),
                flags: if sample.keyframe {
                    fmp4::SAMPLE_DEPENDS_ON_NONE
                } else {
                    fmp4::SAMPLE_DEPENDS_ON_OTHERS | fmp4::SAMPLE_IS_NON_SYNC
                },
                composition_offset: i32::try_from(sample.pts - sample.dts).unwrap_or(0),
            });
            data.extend_from_slice(&sample.data);
        }

        let last = track.samples.last()?;

        self.sequence_number += 1;
        let fragment_data = match generate_fragment(
            VIDEO_TRACK_ID,
            self.sequence_number,
            u64::try_from(base_dts).unwrap_or(0),
            &samples,
            data,
        ) {
            Ok(data) => data,
            Err(e) => {
                self.logger
                    .log(LogLevel::Error, &format!("remux video: {e}"));
                return None;
            }
        };

        let duration: i64 = i64::from(last_duration) + (last.dts - first.dts);
        self.next_video_dts = Some(base_dts + duration);

        Some(Fragment {
            kind: TrackKind::Video,
            data: fragment_data,
            start_pts: ticks_to_seconds(first.pts - init_pts),
            end_pts: ticks_to_seconds(last.pts - init_pts + i64::from(last_duration)),
            start_dts: ticks_to_seconds(base_dts),
            sample_count: u32::try_from(track.samples.len()).unwrap_or(0),
            independent,
        })
    }

    fn remux_audio(&mut self, track: &AudioTrack) -> Option<Fragment> {
        let first = track.samples.first()?;
        if track.sample_rate == 0 {
            return None;
        }
        let init_pts = self.init_pts.unwrap_or(0);
        let rate = i64::from(track.sample_rate);

        // The audio track runs on a sample rate timescale so frame
        // durations stay exact.
        let to_track_time = |ticks: i64| ticks * rate / i64::from(MPEG_TS_TIMESCALE);

        let base_pts = self
            .next_audio_pts
            .unwrap_or_else(|| to_track_time(first.pts - init_pts))
            .max(0);

        let mut samples = Vec::with_capacity(track.samples.len());
        let mut data = Vec::new();
        for sample in &track.samples {
            samples.push(FragmentSample {
                duration: track.samples_per_frame,
                size: u32::try_from(sample.data.len()).unwrap_or(u32::MAX),
                flags: fmp4::SAMPLE_DEPENDS_ON_NONE,
                composition_offset: 0,
            });
            data.extend_from_slice(&sample.data);
        }

        self.sequence_number += 1;
        let fragment_data = match generate_fragment(
            AUDIO_TRACK_ID,
            self.sequence_number,
            u64::try_from(base_pts).unwrap_or(0),
            &samples,
            data,
        ) {
            Ok(data) => data,
            Err(e) => {
                self.logger
                    .log(LogLevel::Error, &format!("remux audio: {e}"));
                return None;
            }
        };

        let frames = i64::try_from(track.samples.len()).unwrap_or(0);
        let duration = frames * i64::from(track.samples_per_frame);
        self.next_audio_pts = Some(base_pts + duration);

        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let to_seconds = |t: i64| t as f64 / f64::from(track.sample_rate);

        Some(Fragment {
            kind: TrackKind::Audio,
            data: fragment_data,
            start_pts: to_seconds(base_pts),
            end_pts: to_seconds(base_pts + duration),
            start_dts: to_seconds(base_pts),
            sample_count: u32::try_from(track.samples.len()).unwrap_or(0),
            independent: true,
        })
    }
}

impl Remuxer for Mp4Remuxer {
    fn remux(
        &mut self,
        tracks: DemuxedTracks,
        time_offset: f64,
        _accurate_time_offset: bool,
        _flush: bool,
        _id: u64,
    ) -> RemuxResult {
        let mut result = RemuxResult {
            id3: tracks.id3.samples.clone(),
            text: tracks.text.samples.clone(),
            ..Default::default()
        };

        self.establish_init_pts(&tracks, time_offset);
        result.init_segment = self.generate_init_segment(&tracks);
        result.video = self.remux_video(&tracks.video);
        result.audio = self.remux_audio(&tracks.audio);
        result
    }

    fn reset_init_segment(
        &mut self,
        _init_segment: Option<Bytes>,
        audio_codec: Option<&str>,
        video_codec: Option<&str>,
    ) {
        self.init_signature = None;
        self.audio_codec_hint = audio_codec.map(ToOwned::to_owned);
        self.video_codec_hint = video_codec.map(ToOwned::to_owned);
    }

    fn reset_timestamp(&mut self, default_init_pts: Option<i64>) {
        self.init_pts = default_init_pts;
    }

    fn reset_next_timestamp(&mut self) {
        self.next_video_dts = None;
        self.next_audio_pts = None;
    }
}

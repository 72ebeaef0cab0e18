use crate::{Fragment, InitSegment, RemuxResult, Remuxer, TrackKind};
use bytes::Bytes;
use common::{track::DemuxedTracks, ArcMsgLogger, LogLevel};

/// Forwards fragmented MP4 with minimal modification.
pub struct PassthroughRemuxer {
    logger: ArcMsgLogger,
    init_data: Option<Bytes>,
    init_sent: bool,
    audio_codec: Option<String>,
    video_codec: Option<String>,
}

impl PassthroughRemuxer {
    #[must_use]
    pub fn new(logger: ArcMsgLogger) -> Self {
        Self {
            logger,
            init_data: None,
            init_sent: false,
            audio_codec: None,
            video_codec: None,
        }
    }
}

impl Remuxer for PassthroughRemuxer {
    fn remux(
        &mut self,
        tracks: DemuxedTracks,
        time_offset: f64,
        _accurate_time_offset: bool,
        _flush: bool,
        _id: u64,
    ) -> RemuxResult {
        let mut result = RemuxResult {
            id3: tracks.id3.samples,
            text: tracks.text.samples,
            ..Default::default()
        };
        let Some(passthrough) = tracks.passthrough else {
            return result;
        };

        // An inline moov replaces whatever init the caller supplied.
        if let Some(inline) = &passthrough.init {
            self.init_data = Some(inline.clone());
            self.init_sent = false;
        }
        if !self.init_sent {
            if let Some(data) = &self.init_data {
                result.init_segment = Some(InitSegment {
                    data: data.clone(),
                    audio_codec: self.audio_codec.clone(),
                    video_codec: self.video_codec.clone(),
                });
                self.init_sent = true;
            } else {
                self.logger
                    .log(LogLevel::Warning, "passthrough: no init segment available");
            }
        }

        if passthrough.data.is_empty() {
            return result;
        }
        let start = passthrough.start_time.unwrap_or(time_offset);
        result.video = Some(Fragment {
            kind: TrackKind::Muxed,
            data: passthrough.data,
            start_pts: start,
            end_pts: start,
            start_dts: start,
            sample_count: 0,
            independent: true,
        });
        result
    }

    fn reset_init_segment(
        &mut self,
        init_segment: Option<Bytes>,
        audio_codec: Option<&str>,
        video_codec: Option<&str>,
    ) {
        self.init_data = init_segment;
        self.init_sent = false;
        self.audio_codec = audio_codec.map(ToOwned::to_owned);
        self.video_codec = video_codec.map(ToOwned::to_owned);
    }

    fn reset_timestamp(&mut self, _default_init_pts: Option<i64>) {}

    fn reset_next_timestamp(&mut self) {}
}

use crate::{sample_aes::SampleAesError, Demuxer};
use async_trait::async_trait;
use bytes::Bytes;
use common::{
    track::{DemuxedTracks, PassthroughSegment},
    ArcMsgLogger, KeyData, LogLevel,
};
use std::collections::HashMap;

pub const FMP4_MIN_PROBE_BYTE_LENGTH: usize = 1024;

type BoxType = [u8; 4];

// Iterates over the boxes in `data`, yielding type and payload.
// Stops at the first malformed header.
fn boxes(data: &[u8]) -> impl Iterator<Item = (BoxType, &[u8])> + '_ {
    let mut offset = 0;
    std::iter::from_fn(move || {
        let header = data.get(offset..offset + 8)?;
        let mut size = usize::try_from(u32::from_be_bytes([
            header[0], header[1], header[2], header[3],
        ]))
        .ok()?;
        let typ: BoxType = [header[4], header[5], header[6], header[7]];

        let mut payload_start = offset + 8;
        if size == 1 {
            // 64-bit largesize.
            let large = data.get(offset + 8..offset + 16)?;
            size = usize::try_from(u64::from_be_bytes([
                large[0], large[1], large[2], large[3], large[4], large[5], large[6], large[7],
            ]))
            .ok()?;
            payload_start = offset + 16;
        } else if size == 0 {
            size = data.len() - offset;
        }
        if size < payload_start - offset {
            return None;
        }

        let payload = data.get(payload_start..offset + size)?;
        offset += size;
        Some((typ, payload))
    })
}

fn find_boxes<'a>(data: &'a [u8], path: &[BoxType]) -> Vec<&'a [u8]> {
    let Some((typ, rest)) = path.split_first() else {
        return vec![data];
    };
    let mut found = Vec::new();
    for (t, payload) in boxes(data) {
        if t == *typ {
            found.extend(find_boxes(payload, rest));
        }
    }
    found
}

#[must_use]
pub fn probe_fmp4(data: &[u8]) -> bool {
    for (typ, _) in boxes(data) {
        if matches!(&typ, b"ftyp" | b"styp" | b"moov" | b"moof" | b"sidx") {
            return true;
        }
    }
    false
}

// track_id to timescale, from moov/trak pairs.
fn parse_track_timescales(moov: &[u8]) -> HashMap<u32, u32> {
    let mut timescales = HashMap::new();
    for trak in find_boxes(moov, &[*b"trak"]) {
        let Some(tkhd) = find_boxes(trak, &[*b"tkhd"]).first().copied() else {
            continue;
        };
        let Some(mdhd) = find_boxes(trak, &[*b"mdia", *b"mdhd"]).first().copied() else {
            continue;
        };

        let track_id_offset = if tkhd.first() == Some(&1) { 20 } else { 12 };
        let timescale_offset = if mdhd.first() == Some(&1) { 20 } else { 12 };
        let (Some(track_id), Some(timescale)) = (
            read_u32(tkhd, track_id_offset),
            read_u32(mdhd, timescale_offset),
        ) else {
            continue;
        };
        if timescale != 0 {
            timescales.insert(track_id, timescale);
        }
    }
    timescales
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let hi = read_u32(data, offset)?;
    let lo = read_u32(data, offset + 4)?;
    Some(u64::from(hi) << 32 | u64::from(lo))
}

// Earliest base media decode time across the track fragments.
fn earliest_decode_time(data: &[u8], timescales: &HashMap<u32, u32>) -> Option<f64> {
    let mut earliest: Option<f64> = None;
    for traf in find_boxes(data, &[*b"moof", *b"traf"]) {
        let Some(tfhd) = find_boxes(traf, &[*b"tfhd"]).first().copied() else {
            continue;
        };
        let Some(tfdt) = find_boxes(traf, &[*b"tfdt"]).first().copied() else {
            continue;
        };

        let Some(track_id) = read_u32(tfhd, 4) else {
            continue;
        };
        let Some(&timescale) = timescales.get(&track_id) else {
            continue;
        };

        let decode_time = if tfdt.first() == Some(&1) {
            read_u64(tfdt, 4)
        } else {
            read_u32(tfdt, 4).map(u64::from)
        };
        let Some(decode_time) = decode_time else {
            continue;
        };

        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let start = decode_time as f64 / f64::from(timescale);
        earliest = Some(earliest.map_or(start, |v| v.min(start)));
    }
    earliest
}

/// Demuxer for already fragmented MP4. The payload is forwarded
/// untouched; only the timing window is extracted.
pub struct Fmp4Demuxer {
    logger: ArcMsgLogger,
    timescales: HashMap<u32, u32>,
}

impl Fmp4Demuxer {
    #[must_use]
    pub fn new(logger: ArcMsgLogger) -> Self {
        Self {
            logger,
            timescales: HashMap::new(),
        }
    }
}

#[async_trait]
impl Demuxer for Fmp4Demuxer {
    fn demux(
        &mut self,
        data: Bytes,
        _time_offset: f64,
        _contiguous: bool,
        _flush: bool,
    ) -> DemuxedTracks {
        let mut init = None;
        if let Some(moov) = find_boxes(&data, &[*b"moov"]).first() {
            // Inline init segment, usually a separate push.
            self.timescales = parse_track_timescales(moov);
            init = Some(data.clone());
        }

        if self.timescales.is_empty() {
            self.logger
                .log(LogLevel::Warning, "fmp4: no init segment seen before media");
        }
        let start_time = earliest_decode_time(&data, &self.timescales);

        DemuxedTracks {
            passthrough: Some(PassthroughSegment {
                data,
                init,
                start_time,
            }),
            ..Default::default()
        }
    }

    async fn demux_sample_aes(
        &mut self,
        _data: Bytes,
        _key_data: KeyData,
        _time_offset: f64,
    ) -> Result<DemuxedTracks, SampleAesError> {
        Err(SampleAesError::Unsupported("fmp4"))
    }

    fn flush(&mut self, _time_offset: f64) -> DemuxedTracks {
        DemuxedTracks::default()
    }

    fn reset_init_segment(
        &mut self,
        init_segment: Option<Bytes>,
        _audio_codec: Option<&str>,
        _video_codec: Option<&str>,
        _duration: f64,
    ) {
        self.timescales.clear();
        if let Some(init) = init_segment {
            if let Some(moov) = find_boxes(&init, &[*b"moov"]).first() {
                self.timescales = parse_track_timescales(moov);
            }
        }
    }

    fn reset_timestamp(&mut self, _default_init_pts: Option<i64>) {}

    fn reset_contiguity(&mut self) {}
}

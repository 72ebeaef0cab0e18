mod adts;
mod avc;
mod mp3;
mod mp4;
mod sample_aes;
mod ts;

pub use adts::{probe_adts, AdtsDemuxer, ADTS_MIN_PROBE_BYTE_LENGTH};
pub use mp3::{probe_mp3, Mp3Demuxer, MP3_MIN_PROBE_BYTE_LENGTH};
pub use mp4::{probe_fmp4, Fmp4Demuxer, FMP4_MIN_PROBE_BYTE_LENGTH};
pub use sample_aes::SampleAesError;
pub use ts::{probe_ts, TsDemuxer, TS_MIN_PROBE_BYTE_LENGTH};

use async_trait::async_trait;
use bytes::Bytes;
use common::{track::DemuxedTracks, KeyData};

/// Parses one container family into elementary track streams.
///
/// Instances are stateful: partial frames are carried between `demux`
/// calls and drained by `flush`. Dropping the instance is the teardown.
#[async_trait]
pub trait Demuxer: Send {
    fn demux(
        &mut self,
        data: Bytes,
        time_offset: f64,
        contiguous: bool,
        flush: bool,
    ) -> DemuxedTracks;

    /// Demux and decrypt SAMPLE-AES encrypted samples. The block
    /// decryption runs on the blocking pool.
    async fn demux_sample_aes(
        &mut self,
        data: Bytes,
        key_data: KeyData,
        time_offset: f64,
    ) -> Result<DemuxedTracks, SampleAesError>;

    /// Drain any partially assembled frames at end of segment.
    fn flush(&mut self, time_offset: f64) -> DemuxedTracks;

    fn reset_init_segment(
        &mut self,
        init_segment: Option<Bytes>,
        audio_codec: Option<&str>,
        video_codec: Option<&str>,
        duration: f64,
    );

    fn reset_timestamp(&mut self, default_init_pts: Option<i64>);

    fn reset_contiguity(&mut self);
}

// Returns the payload after an optional ID3v2 tag.
pub(crate) fn strip_id3(data: &[u8]) -> &[u8] {
    let mut offset = 0;
    while data.len() >= offset + 10 && &data[offset..offset + 3] == b"ID3" {
        // Syncsafe 28-bit size, optional 10 byte footer.
        let size = (usize::from(data[offset + 6] & 0x7f) << 21)
            | (usize::from(data[offset + 7] & 0x7f) << 14)
            | (usize::from(data[offset + 8] & 0x7f) << 7)
            | usize::from(data[offset + 9] & 0x7f);
        let footer = if data[offset + 5] & 0x10 == 0 { 0 } else { 10 };
        offset += size + footer + 10;
    }
    data.get(offset..).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_id3() {
        assert_eq!(b"abc".as_slice(), strip_id3(b"abc"));

        let mut tagged = vec![b'I', b'D', b'3', 4, 0, 0, 0, 0, 0, 2];
        tagged.extend_from_slice(&[9, 9]); // Tag body.
        tagged.extend_from_slice(b"abc");
        assert_eq!(b"abc".as_slice(), strip_id3(&tagged));

        // Too short to carry a tag header.
        assert_eq!(b"ID3".as_slice(), strip_id3(b"ID3"));
    }
}

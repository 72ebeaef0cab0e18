#![allow(clippy::unwrap_used)]

use crate::Transmuxer;
use aes::Aes128;
use bytes::Bytes;
use cipher::{generic_array::GenericArray, BlockEncryptMut, KeyIvInit};
use common::{
    ChunkMetadata, EncryptionMethod, ErrorDetails, ErrorKind, EventSink, ManualClock, SegmentKey,
    TransmuxConfig, TransmuxEvent, TransmuxState, TransmuxerOptions, TypeSupported,
};
use pretty_assertions::assert_eq;
use remux::TrackKind;
use std::sync::{Arc, Mutex};

const KEY: [u8; 16] = [0x42; 16];
const IV: [u8; 16] = [0x24; 16];

#[derive(Default)]
struct CollectingSink(Mutex<Vec<TransmuxEvent>>);

impl CollectingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn events(&self) -> Vec<TransmuxEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &TransmuxEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

fn new_transmuxer(sink: &Arc<CollectingSink>, options: TransmuxerOptions) -> Transmuxer {
    Transmuxer::new(
        sink.clone(),
        common::new_dummy_msg_logger(),
        ManualClock::new(1000),
        options,
        TypeSupported::default(),
        String::new(),
        0,
    )
}

fn meta() -> ChunkMetadata {
    ChunkMetadata::new(3, 7, 0)
}

fn segment_state(time_offset: f64) -> TransmuxState {
    TransmuxState::new(false, false, true, false, false, time_offset)
}

/************************** fixtures **************************/

const PACKET_SIZE: usize = 188;
const PMT_PID: u16 = 0x1000;
const VIDEO_PID: u16 = 0x100;
const AUDIO_PID: u16 = 0x101;

// 650x450 high profile parameter set.
const SPS: &[u8] = &[
    0x67, 0x64, 0x00, 0x16, 0xac, 0xd9, 0x40, 0xa4, 0x3b, 0xe4, 0x88, 0xc0, 0x44, 0x00, 0x00,
    0x03, 0x00, 0x04, 0x00, 0x00, 0x03, 0x00, 0x60, 0x3c, 0x58, 0xb6, 0x58,
];
const PPS: &[u8] = &[0x68, 0xce, 0x3c, 0x80];

struct SegmentBuilder {
    continuity: std::collections::HashMap<u16, u8>,
    packets: Vec<u8>,
}

impl SegmentBuilder {
    fn new() -> Self {
        Self {
            continuity: std::collections::HashMap::new(),
            packets: Vec::new(),
        }
    }

    fn packet(&mut self, pid: u16, unit_start: bool, payload: &[u8]) {
        assert!(payload.len() <= PACKET_SIZE - 4);
        let counter = self.continuity.entry(pid).or_insert(0);

        let mut packet = Vec::with_capacity(PACKET_SIZE);
        packet.push(0x47);
        packet.push(u8::try_from(pid >> 8).unwrap() | if unit_start { 0x40 } else { 0 });
        packet.push(u8::try_from(pid & 0xff).unwrap());

        let stuffing = PACKET_SIZE - 4 - payload.len();
        if stuffing > 0 {
            packet.push(0x30 | *counter);
            packet.push(u8::try_from(stuffing - 1).unwrap());
            if stuffing > 1 {
                packet.push(0);
                packet.resize(packet.len() + stuffing - 2, 0xff);
            }
        } else {
            packet.push(0x10 | *counter);
        }
        packet.extend_from_slice(payload);
        assert_eq!(PACKET_SIZE, packet.len());

        *counter = (*counter + 1) & 0xf;
        self.packets.extend_from_slice(&packet);
    }

    fn section(&mut self, pid: u16, table: &[u8]) {
        let mut payload = vec![0]; // Pointer field.
        payload.extend_from_slice(table);
        self.packet(pid, true, &payload);
    }

    fn pat(&mut self) {
        let mut section = vec![
            0x00, // Table id.
            0xb0, 0x0d, // Section length.
            0x00, 0x01, // Transport stream id.
            0xc1, // Version 0, current.
            0x00, 0x00, // Section and last section number.
            0x00, 0x01, // Program number.
            0xe0 | u8::try_from(PMT_PID >> 8).unwrap(),
            u8::try_from(PMT_PID & 0xff).unwrap(),
        ];
        let crc = mpeg_crc32(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        self.section(0, &section);
    }

    fn pmt(&mut self, streams: &[(u16, u8)]) {
        let mut body = vec![
            0x00, 0x01, // Program number.
            0xc1, // Version 0, current.
            0x00, 0x00, // Section and last section number.
            0xe0 | u8::try_from(VIDEO_PID >> 8).unwrap(),
            u8::try_from(VIDEO_PID & 0xff).unwrap(), // PCR PID.
            0xf0, 0x00, // Program info length.
        ];
        for (pid, stream_type) in streams {
            body.push(*stream_type);
            body.push(0xe0 | u8::try_from(pid >> 8).unwrap());
            body.push(u8::try_from(pid & 0xff).unwrap());
            body.extend_from_slice(&[0xf0, 0x00]); // ES info length.
        }

        let mut section = vec![0x02]; // Table id.
        let section_len = u16::try_from(body.len() + 4).unwrap();
        section.push(0xb0 | u8::try_from(section_len >> 8).unwrap());
        section.push(u8::try_from(section_len & 0xff).unwrap());
        section.extend_from_slice(&body);
        let crc = mpeg_crc32(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        self.section(PMT_PID, &section);
    }

    fn pes(&mut self, pid: u16, stream_id: u8, pts: u64, payload: &[u8]) {
        let mut header = vec![0x00, 0x00, 0x01, stream_id];
        header.extend_from_slice(&u16::try_from(payload.len() + 8).unwrap().to_be_bytes());
        header.extend_from_slice(&[0x80, 0x80, 0x05]); // PTS only.
        header.extend_from_slice(&encode_pts(pts));

        let mut data = header;
        data.extend_from_slice(payload);

        let mut first = true;
        for chunk in data.chunks(PACKET_SIZE - 4) {
            self.packet(pid, first, chunk);
            first = false;
        }
    }

    fn build(self) -> Vec<u8> {
        self.packets
    }
}

fn encode_pts(pts: u64) -> [u8; 5] {
    [
        0x21 | u8::try_from(pts >> 29 & 0xe).unwrap(),
        u8::try_from(pts >> 22 & 0xff).unwrap(),
        0x01 | u8::try_from(pts >> 14 & 0xfe).unwrap(),
        u8::try_from(pts >> 7 & 0xff).unwrap(),
        0x01 | u8::try_from(pts << 1 & 0xfe).unwrap(),
    ]
}

// CRC-32/MPEG-2 over PSI sections.
fn mpeg_crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for &byte in data {
        crc ^= u32::from(byte) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                crc << 1 ^ 0x04c1_1db7
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn adts_frame(payload: &[u8]) -> Vec<u8> {
    let frame_len = 7 + payload.len();
    let mut frame = vec![0xff, 0xf1, 0x50, 0x80, 0, 0, 0xfc];
    frame[3] |= u8::try_from(frame_len >> 11).unwrap();
    frame[4] = u8::try_from(frame_len >> 3 & 0xff).unwrap();
    frame[5] |= u8::try_from(frame_len & 0x7).unwrap() << 5;
    frame.extend_from_slice(payload);
    frame
}

fn keyframe_au(idr_payload: &[u8]) -> Vec<u8> {
    let mut au = vec![0, 0, 0, 1, 0x09, 0xf0]; // AUD.
    au.extend_from_slice(&[0, 0, 0, 1]);
    au.extend_from_slice(SPS);
    au.extend_from_slice(&[0, 0, 0, 1]);
    au.extend_from_slice(PPS);
    au.extend_from_slice(&[0, 0, 0, 1, 0x65]); // IDR slice.
    au.extend_from_slice(idr_payload);
    au
}

fn delta_au(payload: &[u8]) -> Vec<u8> {
    let mut au = vec![0, 0, 0, 1, 0x41]; // Non-IDR slice.
    au.extend_from_slice(payload);
    au
}

// Audio and video segment with two access units per track. The first
// video packetized elementary stream spans several packets.
fn ts_segment() -> Vec<u8> {
    let mut builder = SegmentBuilder::new();
    builder.pat();
    builder.pmt(&[(VIDEO_PID, 0x1b), (AUDIO_PID, 0x0f)]);
    builder.pes(VIDEO_PID, 0xe0, 90000, &keyframe_au(&[0x88; 520]));
    builder.pes(AUDIO_PID, 0xc0, 90000, &adts_frame(&[0xaa; 32]));
    builder.pes(VIDEO_PID, 0xe0, 93000, &delta_au(&[0x77; 100]));
    builder.pes(AUDIO_PID, 0xc0, 92089, &adts_frame(&[0xbb; 32]));
    builder.build()
}

fn fmp4_init() -> Vec<u8> {
    let ftyp = fmp4::Boxes::new(fmp4::Ftyp {
        typ: fmp4::TYPE_FTYP,
        major_brand: *b"iso5",
        minor_version: 1,
        compatible_brands: vec![fmp4::CompatibleBrandElem(*b"isom")],
    });

    let moov = fmp4::Boxes::new(fmp4::Moov).with_child(
        fmp4::Boxes::new(fmp4::Trak).with_children(vec![
            fmp4::Boxes::new(fmp4::Tkhd {
                track_id: 1,
                ..fmp4::Tkhd::default()
            }),
            fmp4::Boxes::new(fmp4::Mdia).with_child(fmp4::Boxes::new(fmp4::Mdhd {
                timescale: 90000,
                ..fmp4::Mdhd::default()
            })),
        ]),
    );

    let mut buf = Vec::with_capacity(ftyp.size() + moov.size());
    ftyp.marshal(&mut buf).unwrap();
    moov.marshal(&mut buf).unwrap();
    buf
}

// One moof+mdat pair padded past the probe threshold.
fn fmp4_media(decode_time: u64) -> Vec<u8> {
    let payload = vec![0xab; 1100];

    let moof = fmp4::Boxes::new(fmp4::Moof).with_children(vec![
        fmp4::Boxes::new(fmp4::Mfhd {
            full_box: fmp4::FullBox::default(),
            sequence_number: 1,
        }),
        fmp4::Boxes::new(fmp4::Traf).with_children(vec![
            fmp4::Boxes::new(fmp4::Tfhd {
                full_box: fmp4::FullBox {
                    version: 0,
                    flags: [2, 0, 0],
                },
                track_id: 1,
                ..fmp4::Tfhd::default()
            }),
            fmp4::Boxes::new(fmp4::Tfdt {
                flags: [0, 0, 0],
                base_media_decode_time: decode_time,
            }),
        ]),
    ]);
    let mdat = fmp4::Boxes::new(fmp4::Mdat(payload));

    let mut buf = Vec::with_capacity(moof.size() + mdat.size());
    moof.marshal(&mut buf).unwrap();
    mdat.marshal(&mut buf).unwrap();
    buf
}

fn cbc_encrypt_padded(plaintext: &[u8]) -> Vec<u8> {
    type Aes128CbcEnc = cbc::Encryptor<Aes128>;

    let padding = 16 - plaintext.len() % 16;
    let mut buf = plaintext.to_vec();
    buf.resize(plaintext.len() + padding, u8::try_from(padding).unwrap());

    let mut encryptor = Aes128CbcEnc::new(&KEY.into(), &IV.into());
    for block in buf.chunks_exact_mut(16) {
        encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    buf
}

fn aes128_key() -> SegmentKey {
    SegmentKey {
        method: Some(EncryptionMethod::Aes128),
        key: Some(Bytes::copy_from_slice(&KEY)),
        iv: Some(IV),
    }
}

/************************** scenarios **************************/

// Plain fMP4, single push.
#[tokio::test]
async fn test_fmp4_single_push() {
    let sink = CollectingSink::new();
    let mut transmuxer = new_transmuxer(&sink, TransmuxerOptions::default());
    transmuxer.configure(TransmuxConfig {
        init_segment_data: Some(Bytes::from(fmp4_init())),
        duration: 4.0,
        ..Default::default()
    });

    let media = fmp4_media(180_000);
    assert!(media.len() >= 1024);

    let result = transmuxer
        .push(Bytes::from(media), None, meta(), Some(segment_state(0.0)))
        .await
        .unwrap();
    assert!(!result.is_empty());

    let init = result.remux.init_segment.unwrap();
    assert_eq!(Bytes::from(fmp4_init()), init.data);
    let video = result.remux.video.unwrap();
    assert_eq!(TrackKind::Muxed, video.kind);
    assert_eq!(2.0, video.start_pts);

    let results = transmuxer.flush(meta()).await.unwrap();
    assert_eq!(1, results.len());
    assert!(results[0].is_empty());
    assert!(sink.events().is_empty());
}

// TS, three-chunk progressive.
#[tokio::test]
async fn test_ts_three_chunk_progressive() {
    let sink = CollectingSink::new();
    let options = TransmuxerOptions {
        progressive: true,
        ..Default::default()
    };
    let mut transmuxer = new_transmuxer(&sink, options);
    transmuxer.configure(TransmuxConfig {
        duration: 4.0,
        ..Default::default()
    });

    let segment = ts_segment();
    assert!(segment.len() >= 1200);

    let first = transmuxer
        .push(
            Bytes::copy_from_slice(&segment[..300]),
            None,
            meta(),
            Some(segment_state(0.0)),
        )
        .await
        .unwrap();
    assert!(first.is_empty());

    let second = transmuxer
        .push(Bytes::copy_from_slice(&segment[300..600]), None, meta(), None)
        .await
        .unwrap();
    assert!(second.is_empty());

    let third = transmuxer
        .push(Bytes::copy_from_slice(&segment[600..]), None, meta(), None)
        .await
        .unwrap();
    assert!(!third.is_empty());
    assert!(third.remux.init_segment.is_some());
    assert!(third.remux.video.is_some());

    let results = transmuxer.flush(meta()).await.unwrap();
    assert_eq!(1, results.len());
    assert!(sink.events().is_empty());
}

// AES-128 software, chunked.
#[tokio::test]
async fn test_aes128_software_chunked() {
    let sink = CollectingSink::new();
    let options = TransmuxerOptions {
        progressive: true,
        ..Default::default()
    };
    let mut transmuxer = new_transmuxer(&sink, options);
    transmuxer.configure(TransmuxConfig::default());

    let ciphertext = cbc_encrypt_padded(&ts_segment());
    let key = aes128_key();

    // Less than one cipher block.
    let first = transmuxer
        .push(
            Bytes::copy_from_slice(&ciphertext[..8]),
            Some(&key),
            meta(),
            Some(segment_state(0.0)),
        )
        .await
        .unwrap();
    assert!(first.is_empty());

    // The decrypter output is staggered one call behind.
    let second = transmuxer
        .push(
            Bytes::copy_from_slice(&ciphertext[8..712]),
            Some(&key),
            meta(),
            None,
        )
        .await
        .unwrap();
    assert!(second.is_empty());

    let third = transmuxer
        .push(
            Bytes::copy_from_slice(&ciphertext[712..]),
            Some(&key),
            meta(),
            None,
        )
        .await
        .unwrap();

    let results = transmuxer.flush(meta()).await.unwrap();
    assert!(!results.is_empty());

    let any_media = !third.is_empty()
        || results.iter().any(|r| !r.is_empty());
    assert!(any_media);
    assert!(sink.events().is_empty());
}

// Software and offloaded decryption agree.
#[tokio::test]
async fn test_aes128_web_crypto_path() {
    let sink = CollectingSink::new();
    let options = TransmuxerOptions {
        enable_software_aes: false,
        ..Default::default()
    };
    let mut transmuxer = new_transmuxer(&sink, options);
    transmuxer.configure(TransmuxConfig::default());

    let ciphertext = cbc_encrypt_padded(&ts_segment());

    let result = transmuxer
        .push(
            Bytes::from(ciphertext),
            Some(&aes128_key()),
            meta(),
            Some(segment_state(0.0)),
        )
        .await
        .unwrap();
    assert!(!result.is_empty());
    assert!(result.remux.video.is_some());
    assert!(result.remux.audio.is_some());
}

// SAMPLE-AES.
#[tokio::test]
async fn test_sample_aes() {
    let sink = CollectingSink::new();
    let mut transmuxer = new_transmuxer(&sink, TransmuxerOptions::default());
    transmuxer.configure(TransmuxConfig::default());

    type Aes128CbcEnc = cbc::Encryptor<Aes128>;
    let cbc_encrypt = |data: &mut [u8]| {
        let mut encryptor = Aes128CbcEnc::new(&KEY.into(), &IV.into());
        for block in data.chunks_exact_mut(16) {
            encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
    };

    // Audio frame: 16 byte clear lead, whole blocks encrypted.
    let audio_clear: Vec<u8> = (1u8..54).collect();
    let mut audio_encrypted = audio_clear.clone();
    cbc_encrypt(&mut audio_encrypted[16..48]);

    // IDR slice: 32 byte clear lead, every tenth block encrypted.
    let mut idr_clear: Vec<u8> = (0..63u8).map(|i| i % 7 + 1).collect();
    idr_clear.insert(0, 0x65);
    let mut idr_encrypted = idr_clear.clone();
    cbc_encrypt(&mut idr_encrypted[32..48]);
    // The byte stream escapes any start code emulation the ciphertext
    // introduced.
    let idr_escaped = insert_emulation_prevention(&idr_encrypted);

    let mut au = vec![0, 0, 0, 1];
    au.extend_from_slice(SPS);
    au.extend_from_slice(&[0, 0, 0, 1]);
    au.extend_from_slice(PPS);
    au.extend_from_slice(&[0, 0, 0, 1]);
    au.extend_from_slice(&idr_escaped);

    let mut builder = SegmentBuilder::new();
    builder.pat();
    builder.pmt(&[(VIDEO_PID, 0x1b), (AUDIO_PID, 0x0f)]);
    builder.pes(VIDEO_PID, 0xe0, 90000, &au);
    builder.pes(AUDIO_PID, 0xc0, 90000, &adts_frame(&audio_encrypted));
    let segment = builder.build();

    let key = SegmentKey {
        method: Some(EncryptionMethod::SampleAes),
        key: Some(Bytes::copy_from_slice(&KEY)),
        iv: Some(IV),
    };

    let result = transmuxer
        .push(
            Bytes::from(segment),
            Some(&key),
            meta(),
            Some(segment_state(0.0)),
        )
        .await
        .unwrap();
    assert!(!result.is_empty());

    // The fragment payloads end with the decrypted samples.
    let audio = result.remux.audio.unwrap();
    assert_eq!(
        audio_clear.as_slice(),
        &audio.data[audio.data.len() - audio_clear.len()..]
    );
    let video = result.remux.video.unwrap();
    assert_eq!(
        idr_clear.as_slice(),
        &video.data[video.data.len() - idr_clear.len()..]
    );

    let results = transmuxer.flush(meta()).await.unwrap();
    assert_eq!(1, results.len());
    assert!(sink.events().is_empty());
}

fn insert_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &b in data {
        if zeros == 2 && b <= 3 {
            out.push(3);
            zeros = 0;
        }
        if b == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        out.push(b);
    }
    out
}

// Unknown content.
#[tokio::test]
async fn test_unknown_content() {
    let sink = CollectingSink::new();
    let mut transmuxer = new_transmuxer(&sink, TransmuxerOptions::default());
    transmuxer.configure(TransmuxConfig::default());

    let garbage: Vec<u8> = (0..4096u32).map(|i| u8::try_from(i % 251).unwrap()).collect();

    let result = transmuxer
        .push(Bytes::from(garbage), None, meta(), Some(segment_state(0.0)))
        .await
        .unwrap();
    assert!(result.is_empty());

    let results = transmuxer.flush(meta()).await.unwrap();
    assert_eq!(1, results.len());
    assert!(results[0].is_empty());

    let events = sink.events();
    assert_eq!(1, events.len());
    let TransmuxEvent::Error(payload) = &events[0];
    assert_eq!(ErrorKind::MediaError, payload.kind);
    assert_eq!(ErrorDetails::FragParsingError, payload.details);
    assert!(payload.fatal);
}

// Discontinuity mid-stream with a container switch.
#[tokio::test]
async fn test_discontinuity_container_switch() {
    let sink = CollectingSink::new();
    let mut transmuxer = new_transmuxer(&sink, TransmuxerOptions::default());
    transmuxer.configure(TransmuxConfig {
        init_segment_data: Some(Bytes::from(fmp4_init())),
        ..Default::default()
    });

    let result = transmuxer
        .push(
            Bytes::from(ts_segment()),
            None,
            meta(),
            Some(segment_state(0.0)),
        )
        .await
        .unwrap();
    assert_eq!(Some(TrackKind::Video), result.remux.video.map(|v| v.kind));

    // New discontinuity, different container family.
    let state = TransmuxState::new(true, false, true, true, false, 10.0);
    let result = transmuxer
        .push(Bytes::from(fmp4_media(900_000)), None, meta(), Some(state))
        .await
        .unwrap();
    let video = result.remux.video.unwrap();
    assert_eq!(TrackKind::Muxed, video.kind);
}

/************************** properties **************************/

#[tokio::test]
async fn test_timing_stamps() {
    let sink = CollectingSink::new();
    let clock = ManualClock::new(5000);
    let mut transmuxer = Transmuxer::new(
        sink.clone(),
        common::new_dummy_msg_logger(),
        clock.clone(),
        TransmuxerOptions::default(),
        TypeSupported::default(),
        String::new(),
        0,
    );
    transmuxer.configure(TransmuxConfig::default());

    let result = transmuxer
        .push(
            Bytes::from(ts_segment()),
            None,
            meta(),
            Some(segment_state(0.0)),
        )
        .await
        .unwrap();
    assert_eq!(5000, result.chunk_meta.transmuxing.execute_start);
    assert!(result.chunk_meta.transmuxing.execute_end >= 5000);

    clock.advance(25);
    let results = transmuxer.flush(meta()).await.unwrap();
    assert_eq!(5025, results[0].chunk_meta.transmuxing.execute_start);
    assert_eq!(5025, results[0].chunk_meta.transmuxing.execute_end);

    // The caller's cookie fields come back untouched.
    assert_eq!(3, results[0].chunk_meta.level);
    assert_eq!(7, results[0].chunk_meta.sn);
}

#[tokio::test]
async fn test_configure_is_idempotent() {
    let sink = CollectingSink::new();
    let mut transmuxer = new_transmuxer(&sink, TransmuxerOptions::default());

    let config = TransmuxConfig {
        audio_codec: Some("mp4a.40.2".to_owned()),
        duration: 4.0,
        ..Default::default()
    };
    transmuxer.configure(config.clone());
    transmuxer.configure(config);

    let result = transmuxer
        .push(
            Bytes::from(ts_segment()),
            None,
            meta(),
            Some(segment_state(0.0)),
        )
        .await
        .unwrap();
    assert!(!result.is_empty());
}

#[tokio::test]
async fn test_destroy_is_terminal() {
    let sink = CollectingSink::new();
    let mut transmuxer = new_transmuxer(&sink, TransmuxerOptions::default());
    transmuxer.configure(TransmuxConfig::default());

    let result = transmuxer
        .push(
            Bytes::from(ts_segment()),
            None,
            meta(),
            Some(segment_state(0.0)),
        )
        .await
        .unwrap();
    assert!(!result.is_empty());

    transmuxer.destroy();

    // No demuxer is bound and nothing was cached, so a flush yields a
    // single empty result and no error event.
    let results = transmuxer.flush(meta()).await.unwrap();
    assert_eq!(1, results.len());
    assert!(results[0].is_empty());
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_chunking_is_equivalent_to_whole_segment() {
    let sink = CollectingSink::new();
    let segment = ts_segment();

    // Whole segment in one push.
    let mut whole = new_transmuxer(&sink, TransmuxerOptions::default());
    whole.configure(TransmuxConfig::default());
    let whole_result = whole
        .push(
            Bytes::from(segment.clone()),
            None,
            meta(),
            Some(segment_state(0.0)),
        )
        .await
        .unwrap();
    let whole_flush = whole.flush(meta()).await.unwrap();

    // Same segment in uneven chunks, delivered progressively.
    let options = TransmuxerOptions {
        progressive: true,
        ..Default::default()
    };
    let mut chunked = new_transmuxer(&sink, options);
    chunked.configure(TransmuxConfig::default());
    let mut chunked_samples = 0;
    let mut state = Some(segment_state(0.0));
    for chunk in segment.chunks(401) {
        let result = chunked
            .push(Bytes::copy_from_slice(chunk), None, meta(), state.take())
            .await
            .unwrap();
        if let Some(video) = &result.remux.video {
            chunked_samples += video.sample_count;
        }
    }
    for result in chunked.flush(meta()).await.unwrap() {
        if let Some(video) = &result.remux.video {
            chunked_samples += video.sample_count;
        }
    }

    let mut whole_samples = 0;
    if let Some(video) = &whole_result.remux.video {
        whole_samples += video.sample_count;
    }
    for result in &whole_flush {
        if let Some(video) = &result.remux.video {
            whole_samples += video.sample_count;
        }
    }

    assert_eq!(whole_samples, chunked_samples);
    assert!(whole_samples > 0);
}

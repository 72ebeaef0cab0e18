#![allow(clippy::unwrap_used)]

use crate::*;
use pretty_assertions::assert_eq;
use test_case::test_case;

#[test_case(
        Box::new(Ftyp{
            typ: TYPE_FTYP,
            major_brand: *b"iso5",
            minor_version: 1,
            compatible_brands: vec![
                CompatibleBrandElem(*b"isom"),
                CompatibleBrandElem(*b"iso5"),
            ],
        }),
        &[
            b'i', b's', b'o', b'5', // Major brand.
            0x00, 0x00, 0x00, 0x01, // Minor version.
            b'i', b's', b'o', b'm', // Compatible brand.
            b'i', b's', b'o', b'5', // Compatible brand.
        ]; "ftyp"
    )]
#[test_case(
        Box::new(Btrt{
            buffer_size_db: 0x1234_5678,
            max_bitrate: 0x3456_789a,
            avg_bitrate: 0x5678_9abc,
        }),
        &[
            0x12, 0x34, 0x56, 0x78, // buffer_size_db.
            0x34, 0x56, 0x78, 0x9a, // max_bitrate.
            0x56, 0x78, 0x9a, 0xbc, // avg_bitrate.
        ]; "btrt"
    )]
#[test_case(
        Box::new(Mdhd{
            timescale: 90000,
            ..Default::default()
        }),
        &[
            0,                // Version.
            0x00, 0x00, 0x00, // Flags.
            0x00, 0x00, 0x00, 0x00, // Creation time.
            0x00, 0x00, 0x00, 0x00, // Modification time.
            0x00, 0x01, 0x5f, 0x90, // Timescale.
            0x00, 0x00, 0x00, 0x00, // Duration.
            0x55, 0xc4, // Language "und".
            0x00, 0x00, // Predefined.
        ]; "mdhd"
    )]
#[test_case(
        Box::new(Smhd{
            full_box: FullBox::default(),
            balance: 0,
        }),
        &[
            0,                // Version.
            0x00, 0x00, 0x00, // Flags.
            0x00, 0x00, // Balance.
            0x00, 0x00, // Reserved.
        ]; "smhd"
    )]
#[test_case(
        Box::new(Mp4a{
            sample_entry: SampleEntry{
                reserved: [0; 6],
                data_reference_index: 1,
            },
            channel_count: 2,
            sample_size: 16,
            sample_rate: 44100 << 16,
        }),
        &[
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // Reserved.
            0x00, 0x01, // Data reference index.
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // Reserved.
            0x00, 0x02, // Channel count.
            0x00, 0x10, // Sample size.
            0x00, 0x00, 0x00, 0x00, // Predefined, reserved.
            0xac, 0x44, 0x00, 0x00, // Sample rate 44100.
        ]; "mp4a"
    )]
#[test_case(
        Box::new(Esds{
            full_box: FullBox::default(),
            es_id: 1,
            object_type: OBJECT_TYPE_AAC,
            decoder_config: vec![0x11, 0x90],
        }),
        &[
            0x00, 0x00, 0x00, 0x00, // FullBox.
            0x03, 0x19, // ES descriptor.
            0x00, 0x01, // ES id.
            0x00, // Stream priority.
            0x04, 0x11, // Decoder config descriptor.
            0x40, // Object type.
            0x15, // Stream type.
            0x00, 0x00, 0x00, // Buffer size.
            0x00, 0x00, 0x00, 0x00, // Max bitrate.
            0x00, 0x00, 0x00, 0x00, // Average bitrate.
            0x05, 0x02, // Decoder specific info.
            0x11, 0x90, // AudioSpecificConfig.
            0x06, 0x01, 0x02, // SL config descriptor.
        ]; "esds"
    )]
#[test_case(
        Box::new(Tfdt{
            flags: [0, 0, 0],
            base_media_decode_time: 0x0123_4567_89ab_cdef,
        }),
        &[
            1,                // Version.
            0x00, 0x00, 0x00, // Flags.
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, // Decode time.
        ]; "tfdt"
    )]
#[test_case(
        Box::new(Tfhd{
            full_box: FullBox{
                version: 0,
                flags: u32_to_flags(TFHD_DEFAULT_SAMPLE_DURATION_PRESENT),
            },
            track_id: 1,
            default_sample_duration: 1024,
            ..Default::default()
        }),
        &[
            0,                // Version.
            0x00, 0x00, 0x08, // Flags.
            0x00, 0x00, 0x00, 0x01, // Track id.
            0x00, 0x00, 0x04, 0x00, // Default sample duration.
        ]; "tfhd"
    )]
#[test_case(
        Box::new(Trun{
            full_box: FullBox{
                version: 1,
                flags: u32_to_flags(
                    TRUN_DATA_OFFSET_PRESENT
                        | TRUN_SAMPLE_DURATION_PRESENT
                        | TRUN_SAMPLE_SIZE_PRESENT
                        | TRUN_SAMPLE_FLAGS_PRESENT
                        | TRUN_SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT,
                ),
            },
            data_offset: 0x70,
            first_sample_flags: 0,
            entries: vec![TrunEntry{
                sample_duration: 3000,
                sample_size: 4,
                sample_flags: SAMPLE_IS_NON_SYNC,
                sample_composition_time_offset: -9000,
            }],
        }),
        &[
            1,                // Version.
            0x00, 0x0f, 0x01, // Flags.
            0x00, 0x00, 0x00, 0x01, // Sample count.
            0x00, 0x00, 0x00, 0x70, // Data offset.
            0x00, 0x00, 0x0b, 0xb8, // Sample duration.
            0x00, 0x00, 0x00, 0x04, // Sample size.
            0x00, 0x01, 0x00, 0x00, // Sample flags.
            0xff, 0xff, 0xdc, 0xd8, // Composition time offset.
        ]; "trun"
    )]
#[test_case(
        Box::new(Trex{
            full_box: FullBox::default(),
            track_id: 2,
            default_sample_description_index: 1,
            ..Default::default()
        }),
        &[
            0,                // Version.
            0x00, 0x00, 0x00, // Flags.
            0x00, 0x00, 0x00, 0x02, // Track id.
            0x00, 0x00, 0x00, 0x01, // Default sample description index.
            0x00, 0x00, 0x00, 0x00, // Default sample duration.
            0x00, 0x00, 0x00, 0x00, // Default sample size.
            0x00, 0x00, 0x00, 0x00, // Default sample flags.
        ]; "trex"
    )]
#[test_case(
        Box::new(Mdat(vec![b'a', b'b', b'c', b'd'])),
        &[b'a', b'b', b'c', b'd']; "mdat"
    )]
#[test_case(
        Box::new(RawBox{
            typ: TYPE_AVCC,
            data: vec![1, 0x64, 0, 0x16],
        }),
        &[1, 0x64, 0, 0x16]; "raw avcC"
    )]
fn test_box_types(src: Box<dyn ImmutableBox>, bin: &[u8]) {
    let size = src.size();

    let mut buf = Vec::<u8>::with_capacity(size);
    src.marshal(&mut buf).unwrap();

    assert_eq!({ size }, buf.len());
    assert_eq!(bin, buf);
}

#[test]
fn test_boxes_tree() {
    let moof = Boxes::new(Moof).with_child(Boxes::new(Mfhd {
        full_box: FullBox::default(),
        sequence_number: 1,
    }));

    let mut buf = Vec::with_capacity(moof.size());
    moof.marshal(&mut buf).unwrap();

    let want = vec![
        0, 0, 0, 0x18, b'm', b'o', b'o', b'f', //
        0, 0, 0, 0x10, b'm', b'f', b'h', b'd', //
        0, 0, 0, 0, // FullBox.
        0, 0, 0, 1, // Sequence number.
    ];
    assert_eq!(want, buf);
}

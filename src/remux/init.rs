use crate::{AUDIO_TRACK_ID, VIDEO_TRACK_ID};
use bytes::Bytes;
use common::time::MPEG_TS_TIMESCALE;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateInitError {
    #[error("{0}")]
    TryFromInt(#[from] std::num::TryFromIntError),

    #[error("{0}")]
    Mp4(#[from] fmp4::Mp4Error),
}

pub(crate) struct VideoInit<'a> {
    pub sps: &'a [u8],
    pub pps: &'a [u8],
    pub width: u16,
    pub height: u16,
}

pub(crate) struct AudioInit<'a> {
    /// MPEG-4 object type indication: AAC or MPEG audio.
    pub object_type: u8,

    /// AudioSpecificConfig, empty for MPEG audio.
    pub config: &'a [u8],

    pub sample_rate: u32,
    pub channels: u8,
}

pub(crate) fn generate_init(
    video: Option<&VideoInit<'_>>,
    audio: Option<&AudioInit<'_>>,
) -> Result<Bytes, GenerateInitError> {
    /*
       - ftyp
       - moov
         - mvhd
         - trak (video)
         - trak (audio)
         - mvex
           - trex (video)
           - trex (audio)
    */

    let ftyp = fmp4::Boxes::new(fmp4::Ftyp {
        typ: fmp4::TYPE_FTYP,
        major_brand: *b"mp42",
        minor_version: 1,
        compatible_brands: vec![
            fmp4::CompatibleBrandElem(*b"mp41"),
            fmp4::CompatibleBrandElem(*b"mp42"),
            fmp4::CompatibleBrandElem(*b"isom"),
            fmp4::CompatibleBrandElem(*b"hlsf"),
        ],
    });

    let mut next_track_id = 1;
    let mut moov = fmp4::Boxes::new(fmp4::Moov);
    let mut mvex = fmp4::Boxes::new(fmp4::Mvex);

    if let Some(video) = video {
        moov.children.push(generate_video_trak(video)?);
        mvex.children.push(fmp4::Boxes::new(fmp4::Trex {
            track_id: VIDEO_TRACK_ID,
            default_sample_description_index: 1,
            ..fmp4::Trex::default()
        }));
        next_track_id = VIDEO_TRACK_ID + 1;
    }
    if let Some(audio) = audio {
        moov.children.push(generate_audio_trak(audio)?);
        mvex.children.push(fmp4::Boxes::new(fmp4::Trex {
            track_id: AUDIO_TRACK_ID,
            default_sample_description_index: 1,
            ..fmp4::Trex::default()
        }));
        next_track_id = AUDIO_TRACK_ID + 1;
    }

    moov.children.insert(
        0,
        fmp4::Boxes::new(fmp4::Mvhd {
            timescale: 1000,
            rate: 65536,
            volume: 256,
            matrix: [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000],
            next_track_id,
            ..fmp4::Mvhd::default()
        }),
    );
    moov.children.push(mvex);

    let size = ftyp.size() + moov.size();
    let mut buf = Vec::with_capacity(size);

    ftyp.marshal(&mut buf)?;
    moov.marshal(&mut buf)?;

    Ok(Bytes::from(buf))
}

fn generate_video_trak(video: &VideoInit<'_>) -> Result<fmp4::Boxes, GenerateInitError> {
    /*
       trak
       - tkhd
       - mdia
         - mdhd
         - hdlr
         - minf
           - vmhd
           - dinf
             - dref
               - url
           - stbl
             - stsd
               - avc1
                 - avcC
                 - btrt
             - stts
             - stsc
             - stsz
             - stco
    */

    let stsd = fmp4::Boxes::new(fmp4::Stsd {
        full_box: fmp4::FullBox::default(),
        entry_count: 1,
    })
    .with_child(
        fmp4::Boxes::new(fmp4::Avc1 {
            sample_entry: fmp4::SampleEntry {
                reserved: [0; 6],
                data_reference_index: 1,
            },
            width: video.width,
            height: video.height,
            horiz_resolution: 4_718_592,
            vert_resolution: 4_718_592,
            frame_count: 1,
            depth: 24,
            pre_defined3: -1,
            ..fmp4::Avc1::default()
        })
        .with_children(vec![
            fmp4::Boxes::new(fmp4::RawBox {
                typ: fmp4::TYPE_AVCC,
                data: generate_avcc(video.sps, video.pps)?,
            }),
            fmp4::Boxes::new(fmp4::Btrt {
                buffer_size_db: 0,
                max_bitrate: 1_000_000,
                avg_bitrate: 1_000_000,
            }),
        ]),
    );

    let stbl = fmp4::Boxes::new(fmp4::Stbl).with_children(vec![
        stsd,
        fmp4::Boxes::new(fmp4::Stts::default()),
        fmp4::Boxes::new(fmp4::Stsc::default()),
        fmp4::Boxes::new(fmp4::Stsz::default()),
        fmp4::Boxes::new(fmp4::Stco::default()),
    ]);

    let minf = fmp4::Boxes::new(fmp4::Minf).with_children(vec![
        fmp4::Boxes::new(fmp4::Vmhd {
            full_box: fmp4::FullBox {
                version: 0,
                flags: [0, 0, 1],
            },
            graphics_mode: 0,
            opcolor: [0, 0, 0],
        }),
        generate_dinf(),
        stbl,
    ]);

    Ok(fmp4::Boxes::new(fmp4::Trak).with_children(vec![
        fmp4::Boxes::new(fmp4::Tkhd {
            full_box: fmp4::FullBox {
                version: 0,
                flags: [0, 0, 3],
            },
            track_id: VIDEO_TRACK_ID,
            width: u32::from(video.width) * 65536,
            height: u32::from(video.height) * 65536,
            matrix: [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000],
            ..fmp4::Tkhd::default()
        }),
        fmp4::Boxes::new(fmp4::Mdia).with_children(vec![
            fmp4::Boxes::new(fmp4::Mdhd {
                timescale: MPEG_TS_TIMESCALE,
                ..fmp4::Mdhd::default()
            }),
            fmp4::Boxes::new(fmp4::Hdlr {
                handler_type: *b"vide",
                name: "VideoHandler".to_owned(),
                ..fmp4::Hdlr::default()
            }),
            minf,
        ]),
    ]))
}

fn generate_audio_trak(audio: &AudioInit<'_>) -> Result<fmp4::Boxes, GenerateInitError> {
    /*
       trak
       - tkhd
       - mdia
         - mdhd
         - hdlr
         - minf
           - smhd
           - dinf
             - dref
               - url
           - stbl
             - stsd
               - mp4a
                 - esds
             - stts
             - stsc
             - stsz
             - stco
    */

    let stsd = fmp4::Boxes::new(fmp4::Stsd {
        full_box: fmp4::FullBox::default(),
        entry_count: 1,
    })
    .with_child(
        fmp4::Boxes::new(fmp4::Mp4a {
            sample_entry: fmp4::SampleEntry {
                reserved: [0; 6],
                data_reference_index: 1,
            },
            channel_count: u16::from(audio.channels),
            sample_size: 16,
            sample_rate: audio.sample_rate << 16,
        })
        .with_child(fmp4::Boxes::new(fmp4::Esds {
            full_box: fmp4::FullBox::default(),
            es_id: 1,
            object_type: audio.object_type,
            decoder_config: audio.config.to_vec(),
        })),
    );

    let stbl = fmp4::Boxes::new(fmp4::Stbl).with_children(vec![
        stsd,
        fmp4::Boxes::new(fmp4::Stts::default()),
        fmp4::Boxes::new(fmp4::Stsc::default()),
        fmp4::Boxes::new(fmp4::Stsz::default()),
        fmp4::Boxes::new(fmp4::Stco::default()),
    ]);

    let minf = fmp4::Boxes::new(fmp4::Minf).with_children(vec![
        fmp4::Boxes::new(fmp4::Smhd::default()),
        generate_dinf(),
        stbl,
    ]);

    Ok(fmp4::Boxes::new(fmp4::Trak).with_children(vec![
        fmp4::Boxes::new(fmp4::Tkhd {
            full_box: fmp4::FullBox {
                version: 0,
                flags: [0, 0, 3],
            },
            track_id: AUDIO_TRACK_ID,
            volume: 0x0100,
            matrix: [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000],
            ..fmp4::Tkhd::default()
        }),
        fmp4::Boxes::new(fmp4::Mdia).with_children(vec![
            fmp4::Boxes::new(fmp4::Mdhd {
                timescale: audio.sample_rate,
                ..fmp4::Mdhd::default()
            }),
            fmp4::Boxes::new(fmp4::Hdlr {
                handler_type: *b"soun",
                name: "SoundHandler".to_owned(),
                ..fmp4::Hdlr::default()
            }),
            minf,
        ]),
    ]))
}

fn generate_dinf() -> fmp4::Boxes {
    fmp4::Boxes::new(fmp4::Dinf).with_child(
        fmp4::Boxes::new(fmp4::Dref {
            full_box: fmp4::FullBox::default(),
            entry_count: 1,
        })
        .with_child(fmp4::Boxes::new(fmp4::Url {
            full_box: fmp4::FullBox {
                version: 0,
                flags: [0, 0, 1],
            },
            location: String::new(),
        })),
    )
}

// AVCDecoderConfigurationRecord with one parameter set of each kind.
fn generate_avcc(sps: &[u8], pps: &[u8]) -> Result<Vec<u8>, GenerateInitError> {
    let mut avcc = Vec::with_capacity(11 + sps.len() + pps.len());
    avcc.push(1); // Configuration version.
    avcc.push(sps.get(1).copied().unwrap_or_default()); // Profile.
    avcc.push(sps.get(2).copied().unwrap_or_default()); // Profile compatibility.
    avcc.push(sps.get(3).copied().unwrap_or_default()); // Level.
    avcc.push(0xfc | 3); // Reserved, NAL length size minus one.
    avcc.push(0xe0 | 1); // Reserved, one sequence parameter set.
    avcc.extend_from_slice(&u16::try_from(sps.len())?.to_be_bytes());
    avcc.extend_from_slice(sps);
    avcc.push(1); // One picture parameter set.
    avcc.extend_from_slice(&u16::try_from(pps.len())?.to_be_bytes());
    avcc.extend_from_slice(pps);
    Ok(avcc)
}

use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateFragmentError {
    #[error("from int: {0}")]
    TryFromInt(#[from] std::num::TryFromIntError),

    #[error("mp4: {0}")]
    Mp4(#[from] fmp4::Mp4Error),
}

pub(crate) struct FragmentSample {
    pub duration: u32,
    pub size: u32,
    pub flags: u32,
    pub composition_offset: i32,
}

// One moof+mdat pair for a single track.
pub(crate) fn generate_fragment(
    track_id: u32,
    sequence_number: u32,
    base_decode_time: u64,
    samples: &[FragmentSample],
    data: Vec<u8>,
) -> Result<Bytes, GenerateFragmentError> {
    /*
       moof
       - mfhd
       - traf
         - tfhd
         - tfdt
         - trun
       mdat
    */

    // The trun data offset points past the moof box into the mdat
    // payload: mfhd(16) + traf header(8) + tfhd(16) + tfdt(20)
    // + trun(20 + 16 per entry) + both box headers.
    let trun_size = 20 + samples.len() * 16;
    let moof_size = 8 + 16 + 8 + 16 + 20 + trun_size;
    let data_offset = i32::try_from(moof_size + 8)?;

    let mut trun_entries = Vec::with_capacity(samples.len());
    for sample in samples {
        trun_entries.push(fmp4::TrunEntry {
            sample_duration: sample.duration,
            sample_size: sample.size,
            sample_flags: sample.flags,
            sample_composition_time_offset: sample.composition_offset,
        });
    }

    let moof = fmp4::Boxes::new(fmp4::Moof).with_children(vec![
        fmp4::Boxes::new(fmp4::Mfhd {
            full_box: fmp4::FullBox::default(),
            sequence_number,
        }),
        fmp4::Boxes::new(fmp4::Traf).with_children(vec![
            fmp4::Boxes::new(fmp4::Tfhd {
                full_box: fmp4::FullBox {
                    version: 0,
                    // default-base-is-moof
                    flags: [2, 0, 0],
                },
                track_id,
                ..fmp4::Tfhd::default()
            }),
            fmp4::Boxes::new(fmp4::Tfdt {
                flags: [0, 0, 0],
                base_media_decode_time: base_decode_time,
            }),
            fmp4::Boxes::new(fmp4::Trun {
                full_box: fmp4::FullBox {
                    version: 1,
                    flags: fmp4::u32_to_flags(
                        fmp4::TRUN_DATA_OFFSET_PRESENT
                            | fmp4::TRUN_SAMPLE_DURATION_PRESENT
                            | fmp4::TRUN_SAMPLE_SIZE_PRESENT
                            | fmp4::TRUN_SAMPLE_FLAGS_PRESENT
                            | fmp4::TRUN_SAMPLE_COMPOSITION_TIME_OFFSET_PRESENT,
                    ),
                },
                data_offset,
                first_sample_flags: 0,
                entries: trun_entries,
            }),
        ]),
    ]);

    let mdat = fmp4::Boxes::new(fmp4::Mdat(data));

    let mut buf = Vec::with_capacity(moof.size() + mdat.size());
    moof.marshal(&mut buf)?;
    mdat.marshal(&mut buf)?;

    Ok(Bytes::from(buf))
}

use crate::avc;
use aes::Aes128;
use bytes::{BufMut, Bytes, BytesMut};
use cipher::{generic_array::GenericArray, BlockDecryptMut, KeyIvInit};
use common::{track::DemuxedTracks, KeyData};
use thiserror::Error;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

#[derive(Debug, Error)]
pub enum SampleAesError {
    #[error("sample-aes not supported for {0} streams")]
    Unsupported(&'static str),

    #[error("invalid key length: {0}")]
    InvalidKeyLength(usize),

    #[error("decrypt task stopped")]
    TaskJoin,
}

// Decrypts SAMPLE-AES encrypted samples in place. Audio frames carry a
// 16 byte clear lead, video NAL units a 32 byte lead with a 1-of-10
// encrypted block pattern.
pub(crate) fn decrypt_tracks(
    mut tracks: DemuxedTracks,
    key_data: &KeyData,
) -> Result<DemuxedTracks, SampleAesError> {
    let key: [u8; 16] = key_data.key[..]
        .try_into()
        .map_err(|_| SampleAesError::InvalidKeyLength(key_data.key.len()))?;
    let iv = key_data.iv;

    for sample in &mut tracks.audio.samples {
        sample.data = decrypt_audio_frame(&sample.data, &key, &iv);
    }
    for sample in &mut tracks.video.samples {
        sample.data = decrypt_video_sample(&sample.data, &key, &iv);
    }
    Ok(tracks)
}

fn cbc_decrypt(data: &mut [u8], key: &[u8; 16], iv: &[u8; 16]) {
    let mut decryptor = Aes128CbcDec::new(key.into(), iv.into());
    for block in data.chunks_exact_mut(16) {
        decryptor.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

fn decrypt_audio_frame(frame: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Bytes {
    if frame.len() <= 16 {
        return Bytes::copy_from_slice(frame);
    }
    let encrypted_len = (frame.len() - 16) & !15;

    let mut out = frame.to_vec();
    cbc_decrypt(&mut out[16..16 + encrypted_len], key, iv);
    Bytes::from(out)
}

// One 16 byte block out of every ten is encrypted, starting 32 bytes
// in. The blocks are chained together for decryption.
fn decrypt_video_unit(unit: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
    let mut out = avc::remove_emulation_prevention(unit);
    if out.len() <= 48 {
        return out;
    }

    let mut gathered = Vec::new();
    let mut offset = 32;
    while offset + 16 <= out.len() {
        gathered.extend_from_slice(&out[offset..offset + 16]);
        offset += 160;
    }
    cbc_decrypt(&mut gathered, key, iv);

    let mut offset = 32;
    for block in gathered.chunks_exact(16) {
        out[offset..offset + 16].copy_from_slice(block);
        offset += 160;
    }
    out
}

fn decrypt_video_sample(avcc: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Bytes {
    let mut out = BytesMut::with_capacity(avcc.len());
    let mut offset = 0;

    while offset + 4 <= avcc.len() {
        let len = usize::try_from(u32::from_be_bytes([
            avcc[offset],
            avcc[offset + 1],
            avcc[offset + 2],
            avcc[offset + 3],
        ]))
        .unwrap_or(0);
        let Some(unit) = avcc.get(offset + 4..offset + 4 + len) else {
            break;
        };
        offset += 4 + len;

        let unit_type = avc::nal_unit_type(unit);
        if (unit_type == 1 || unit_type == avc::NAL_IDR) && unit.len() > 48 {
            let decrypted = decrypt_video_unit(unit, key, iv);
            #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
            out.put_u32(decrypted.len() as u32);
            out.put_slice(&decrypted);
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
            out.put_u32(unit.len() as u32);
            out.put_slice(unit);
        }
    }
    out.freeze()
}

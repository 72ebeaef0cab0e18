// SPDX-License-Identifier: GPL-2.0-or-later

use aes::Aes128;
use bytes::{Bytes, BytesMut};
use cipher::{block_padding::Pkcs7, generic_array::GenericArray, BlockDecryptMut, KeyIvInit};
use thiserror::Error;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("invalid key length: {0}")]
    InvalidKeyLength(usize),

    #[error("invalid pkcs7 padding")]
    Padding,

    #[error("decrypt task stopped")]
    TaskJoin,
}

/// AES-128-CBC segment decrypter with two modes on one instance:
/// progressive in-thread decryption of whole blocks as they arrive,
/// and single-shot decryption of a full segment on the blocking pool.
#[derive(Default)]
pub(crate) struct Decrypter {
    cipher: Option<Aes128CbcDec>,

    // Ciphertext tail smaller than one block.
    remainder: BytesMut,

    // Progressive output is held back one call so the final block's
    // PKCS#7 padding can be stripped at flush, when it is known to be
    // the last one.
    current_result: Option<Bytes>,
}

impl Decrypter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // Returns the plaintext of the previous call, if any. `None` means
    // the bytes are retained until a whole block is decryptable.
    pub(crate) fn software_decrypt(
        &mut self,
        data: &[u8],
        key: &[u8],
        iv: [u8; 16],
    ) -> Result<Option<Bytes>, DecryptError> {
        let key: [u8; 16] = key
            .try_into()
            .map_err(|_| DecryptError::InvalidKeyLength(key.len()))?;

        self.remainder.extend_from_slice(data);
        let decryptable = self.remainder.len() & !15;
        if decryptable == 0 {
            return Ok(None);
        }

        let mut chunk = self.remainder.split_to(decryptable);
        let cipher = self
            .cipher
            .get_or_insert_with(|| Aes128CbcDec::new(&key.into(), &iv.into()));
        for block in chunk.chunks_exact_mut(16) {
            cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        Ok(self.current_result.replace(chunk.freeze()))
    }

    // Drains the held back plaintext at end of segment.
    pub(crate) fn flush(&mut self) -> Option<Bytes> {
        let result = self.current_result.take()?;
        self.reset();

        let result = remove_pkcs7_padding(result);
        if result.is_empty() {
            return None;
        }
        Some(result)
    }

    pub(crate) fn reset(&mut self) {
        self.cipher = None;
        self.remainder.clear();
        self.current_result = None;
    }

    // Whole segment decryption, offloaded since it is CPU-bound.
    pub(crate) async fn decrypt(
        &mut self,
        data: Bytes,
        key: &[u8],
        iv: [u8; 16],
    ) -> Result<Bytes, DecryptError> {
        let key: [u8; 16] = key
            .try_into()
            .map_err(|_| DecryptError::InvalidKeyLength(key.len()))?;

        tokio::task::spawn_blocking(move || {
            let mut buf = data.to_vec();
            let cipher = Aes128CbcDec::new(&key.into(), &iv.into());
            let len = cipher
                .decrypt_padded_mut::<Pkcs7>(&mut buf)
                .map_err(|_| DecryptError::Padding)?
                .len();
            buf.truncate(len);
            Ok(Bytes::from(buf))
        })
        .await
        .map_err(|_| DecryptError::TaskJoin)?
    }
}

fn remove_pkcs7_padding(data: Bytes) -> Bytes {
    let Some(&last) = data.last() else {
        return data;
    };
    let padding = usize::from(last);
    if padding > 0 && padding <= 16 && padding <= data.len() {
        return data.slice(..data.len() - padding);
    }
    data
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cipher::BlockEncryptMut;
    use pretty_assertions::assert_eq;

    type Aes128CbcEnc = cbc::Encryptor<Aes128>;

    const KEY: [u8; 16] = [0x42; 16];
    const IV: [u8; 16] = [0x24; 16];

    // PKCS#7 padded CBC ciphertext of `plaintext`.
    pub(crate) fn encrypt(plaintext: &[u8]) -> Vec<u8> {
        let padding = 16 - plaintext.len() % 16;
        let mut buf = plaintext.to_vec();
        buf.resize(plaintext.len() + padding, u8::try_from(padding).unwrap());

        let mut encryptor = Aes128CbcEnc::new(&KEY.into(), &IV.into());
        for block in buf.chunks_exact_mut(16) {
            encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        buf
    }

    #[test]
    fn test_software_decrypt_staggered() {
        let plaintext: Vec<u8> = (0u8..48).collect();
        let ciphertext = encrypt(&plaintext);
        assert_eq!(64, ciphertext.len());

        let mut decrypter = Decrypter::new();

        // Less than one block is retained.
        assert_eq!(
            None,
            decrypter
                .software_decrypt(&ciphertext[..8], &KEY, IV)
                .unwrap()
        );

        // The first decryptable chunk is held back.
        assert_eq!(
            None,
            decrypter
                .software_decrypt(&ciphertext[8..32], &KEY, IV)
                .unwrap()
        );

        // The rest releases the held chunk.
        let out = decrypter
            .software_decrypt(&ciphertext[32..], &KEY, IV)
            .unwrap()
            .unwrap();
        assert_eq!(&plaintext[..32], &out[..]);

        // Flush yields the remaining suffix without padding.
        let out = decrypter.flush().unwrap();
        assert_eq!(&plaintext[32..], &out[..]);

        assert_eq!(None, decrypter.flush());
    }

    #[test]
    fn test_software_decrypt_bad_key() {
        let mut decrypter = Decrypter::new();
        decrypter
            .software_decrypt(&[0; 16], &[1, 2, 3], IV)
            .unwrap_err();
    }

    #[tokio::test]
    async fn test_decrypt() {
        let plaintext = b"single shot payload";
        let ciphertext = encrypt(plaintext);

        let mut decrypter = Decrypter::new();
        let got = decrypter
            .decrypt(Bytes::from(ciphertext), &KEY, IV)
            .await
            .unwrap();
        assert_eq!(&plaintext[..], &got[..]);
    }
}

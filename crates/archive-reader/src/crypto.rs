//! Symmetric cipher for encrypted archive members.
//!
//! The capture device encrypts its text members with AES-128-CBC under a
//! fixed key and IV that ship with the device firmware. Both sides of the
//! cipher live here: `decrypt` is the production path, `encrypt` is its
//! inverse for fixture tooling.

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::ArchiveError;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

const KEY_LEN: usize = 16;
const IV_LEN: usize = 16;

/// AES-128-CBC codec with PKCS#7 padding.
#[derive(Clone)]
pub struct ArchiveCipher {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl ArchiveCipher {
    /// Build a cipher from raw key and IV bytes, validating their lengths.
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, ArchiveError> {
        let key: [u8; KEY_LEN] = key.try_into().map_err(|_| {
            ArchiveError::InvalidCipherConfig(format!(
                "key must be {} bytes, got {}",
                KEY_LEN,
                key.len()
            ))
        })?;
        let iv: [u8; IV_LEN] = iv.try_into().map_err(|_| {
            ArchiveError::InvalidCipherConfig(format!(
                "iv must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            ))
        })?;
        Ok(Self { key, iv })
    }

    /// Decrypt one member's ciphertext. A padding failure means the wrong
    /// key or corrupt bytes; either way the member is unreadable.
    pub fn decrypt(&self, member: &str, ciphertext: &[u8]) -> Result<Vec<u8>, ArchiveError> {
        Aes128CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| ArchiveError::Decryption {
                member: member.to_string(),
            })
    }

    /// Encrypt plaintext the way the device would. Used to build test
    /// archives.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes128CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8; 16] = b"0123456789abcdef";
    const IV: &[u8; 16] = b"fedcba9876543210";

    #[test]
    fn round_trip() {
        let cipher = ArchiveCipher::new(KEY, IV).unwrap();
        let plaintext = b"sid:A1\nmeasure_time:20240101100000\n";
        let ciphertext = cipher.encrypt(plaintext);
        assert_ne!(&ciphertext[..], &plaintext[..]);
        let recovered = cipher.decrypt("infos.txt", &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn decrypt_rejects_corrupt_ciphertext() {
        let cipher = ArchiveCipher::new(KEY, IV).unwrap();
        let mut ciphertext = cipher.encrypt(b"payload");
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xff;
        let err = cipher.decrypt("report.txt", &ciphertext).unwrap_err();
        assert!(matches!(err, ArchiveError::Decryption { ref member } if member == "report.txt"));
    }

    #[test]
    fn decrypt_rejects_non_block_input() {
        let cipher = ArchiveCipher::new(KEY, IV).unwrap();
        assert!(cipher.decrypt("ver.ini", b"short").is_err());
    }

    #[test]
    fn new_rejects_bad_lengths() {
        assert!(ArchiveCipher::new(b"short", IV).is_err());
        assert!(ArchiveCipher::new(KEY, b"short").is_err());
    }

    #[test]
    fn empty_plaintext_round_trips_as_one_padding_block() {
        let cipher = ArchiveCipher::new(KEY, IV).unwrap();
        let ciphertext = cipher.encrypt(b"");
        assert_eq!(ciphertext.len(), 16);
        assert_eq!(cipher.decrypt("ver.ini", &ciphertext).unwrap(), b"");
    }
}

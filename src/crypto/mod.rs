//! Cryptographic utilities for Deezer audio.
//!
//! # Encryption Scheme
//!
//! Deezer uses a stripe encryption scheme:
//! - Audio is divided into 2048-byte chunks
//! - Every 3rd chunk (0, 3, 6, 9...) is encrypted with Blowfish CBC
//! - Other chunks, and a short trailing chunk, are left unencrypted
//! - The encryption key is derived from the song ID
//!
//! The CDN location of a track is itself derived from the track's
//! identifiers with an MD5 + AES-ECB transform ([`derive_download_url`]).

use aes::Aes128;
use blowfish::Blowfish;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use md5::{Digest, Md5};
use tracing::debug;

use crate::error::{DeezerError, Result};
use crate::models::PrivateTrackInfo;
use crate::quality::QualityTier;

/// Deezer's secret key for Blowfish key derivation.
const SECRET_KEY: &[u8; 16] = b"g4el58wc0zvf9na1";

/// Key for the CDN path cipher.
const URL_KEY: &[u8; 16] = b"jo6aey6haid2Teih";

/// Separator byte between the URL cipher fields.
const URL_SEPARATOR: u8 = 0xA4;

/// Minimum length of the URL cipher plaintext.
const URL_PLAINTEXT_LEN: usize = 80;

/// Song server URL template.
const SONG_SERVER_URL: &str = "https://e-cdns-proxy-{n}.dzcdn.net/mobile/1/{hash}";

/// Blowfish initialization vector.
const BLOWFISH_IV: [u8; 8] = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];

/// Size of one stripe chunk.
pub const CHUNK_SIZE: usize = 2048;

/// Blowfish cipher block size.
const BF_BLOCK_SIZE: usize = 8;

/// Per-track Blowfish key.
pub type BlowfishKey = [u8; 16];

/// Compute MD5 hash of bytes and return as lowercase hex string.
pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Calculate the Blowfish decryption key for a given song ID.
///
/// The key is derived by XORing:
/// - First 16 chars of MD5(song_id)
/// - Second 16 chars of MD5(song_id)
/// - Deezer's secret key
pub fn calc_blowfish_key(song_id: &str) -> BlowfishKey {
    let hash = md5_hex(song_id.as_bytes());
    let hash_bytes = hash.as_bytes();

    let mut key = [0u8; 16];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = hash_bytes[i] ^ hash_bytes[i + 16] ^ SECRET_KEY[i];
    }
    key
}

/// Derive the encrypted CDN URL of a track.
///
/// `MD5_ORIGIN`, quality code, `SNG_ID` and `MEDIA_VERSION` are joined with
/// the 0xA4 byte, prefixed with their MD5, padded with spaces and encrypted
/// with AES-128-ECB. The first character of `MD5_ORIGIN` selects the proxy.
pub fn derive_download_url(
    md5_origin: &str,
    quality: QualityTier,
    sng_id: &str,
    media_version: &str,
) -> Result<String> {
    let proxy = md5_origin.chars().next().ok_or_else(|| {
        DeezerError::CryptoError(format!("track {} has no MD5_ORIGIN", sng_id))
    })?;

    let mut joined = Vec::with_capacity(64);
    for (i, field) in [md5_origin, quality.code(), sng_id, media_version]
        .iter()
        .enumerate()
    {
        if i > 0 {
            joined.push(URL_SEPARATOR);
        }
        joined.extend_from_slice(field.as_bytes());
    }

    let mut plain = md5_hex(&joined).into_bytes();
    plain.push(URL_SEPARATOR);
    plain.extend_from_slice(&joined);
    plain.push(URL_SEPARATOR);

    let padded_len = plain.len().max(URL_PLAINTEXT_LEN).div_ceil(16) * 16;
    plain.resize(padded_len, b' ');

    let cipher = Aes128::new(GenericArray::from_slice(URL_KEY));
    for block in plain.chunks_exact_mut(16) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }

    Ok(song_url(proxy, &hex::encode(plain)))
}

/// [`derive_download_url`] for resolved private track data.
pub fn download_url(info: &PrivateTrackInfo, quality: QualityTier) -> Result<String> {
    derive_download_url(&info.md5_origin, quality, &info.sng_id, &info.media_version)
}

/// Fill the song server template.
fn song_url(proxy: char, hash: &str) -> String {
    SONG_SERVER_URL
        .replace("{n}", &proxy.to_string())
        .replace("{hash}", hash)
}

fn blowfish(key: &BlowfishKey) -> Result<Blowfish<byteorder::BE>> {
    Blowfish::new_from_slice(key)
        .map_err(|e| DeezerError::CryptoError(format!("invalid Blowfish key: {}", e)))
}

/// CBC-decrypt `data` in place. A trailing partial block is left as is.
fn decrypt_cbc_in_place(cipher: &Blowfish<byteorder::BE>, data: &mut [u8]) {
    let mut prev = BLOWFISH_IV;

    for block in data.chunks_exact_mut(BF_BLOCK_SIZE) {
        let mut ciphertext = [0u8; BF_BLOCK_SIZE];
        ciphertext.copy_from_slice(block);

        cipher.decrypt_block(GenericArray::from_mut_slice(block));
        for (byte, p) in block.iter_mut().zip(prev.iter()) {
            *byte ^= p;
        }

        prev = ciphertext;
    }
}

/// Decrypt one chunk with Blowfish CBC and the fixed IV.
pub fn decrypt_chunk(chunk: &[u8], key: &BlowfishKey) -> Result<Vec<u8>> {
    let cipher = blowfish(key)?;
    let mut out = chunk.to_vec();
    decrypt_cbc_in_place(&cipher, &mut out);
    Ok(out)
}

/// Incremental stripe decryptor.
///
/// Bytes are fed in arbitrary pieces; complete 2048-byte chunks come out
/// decrypted when their absolute index is a multiple of three. The index
/// starts at `first_chunk`, so a resumed download continues the stripe
/// pattern of the bytes already on disk.
pub struct StripeDecryptor {
    cipher: Blowfish<byteorder::BE>,
    chunk_index: u64,
    pending: Vec<u8>,
}

impl StripeDecryptor {
    /// Create a decryptor whose next complete chunk has index `first_chunk`.
    pub fn new(key: &BlowfishKey, first_chunk: u64) -> Result<Self> {
        Ok(Self {
            cipher: blowfish(key)?,
            chunk_index: first_chunk,
            pending: Vec::with_capacity(CHUNK_SIZE),
        })
    }

    /// Absolute index of the next chunk.
    pub fn chunk_index(&self) -> u64 {
        self.chunk_index
    }

    /// Feed bytes, returning every chunk completed by them.
    pub fn update(&mut self, mut data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pending.len() + data.len());

        while !data.is_empty() {
            let take = (CHUNK_SIZE - self.pending.len()).min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.pending.len() == CHUNK_SIZE {
                if self.chunk_index % 3 == 0 {
                    decrypt_cbc_in_place(&self.cipher, &mut self.pending);
                }
                out.append(&mut self.pending);
                self.chunk_index += 1;
            }
        }

        out
    }

    /// Bytes of the incomplete trailing chunk, unmodified.
    pub fn take_pending(&mut self) -> Vec<u8> {
        if !self.pending.is_empty() {
            debug!(
                "Passing through short chunk {} of {} bytes",
                self.chunk_index,
                self.pending.len()
            );
        }
        std::mem::take(&mut self.pending)
    }
}

/// Stripe-encrypt a plaintext the way the CDN serves it.
#[cfg(test)]
pub(crate) fn stripe_encrypt(plain: &[u8], key: &BlowfishKey) -> Vec<u8> {
    let cipher = blowfish(key).unwrap();
    let mut out = plain.to_vec();

    for (index, chunk) in out.chunks_mut(CHUNK_SIZE).enumerate() {
        if index % 3 != 0 || chunk.len() < CHUNK_SIZE {
            continue;
        }
        let mut prev = BLOWFISH_IV;
        for block in chunk.chunks_exact_mut(BF_BLOCK_SIZE) {
            for (byte, p) in block.iter_mut().zip(prev.iter()) {
                *byte ^= p;
            }
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
            prev.copy_from_slice(block);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex(b"test"), "098f6bcd4621d373cade4e832627b4f6");
    }

    #[test]
    fn test_calc_blowfish_key() {
        let key = calc_blowfish_key("3135556");
        assert_eq!(hex::encode(key), "6c6c666b39662c37652575603c643439");
        assert_eq!(key, calc_blowfish_key("3135556"));
    }

    #[test]
    fn test_derive_download_url_known_answer() {
        let url = derive_download_url(
            "0123456789abcdef0123456789abcdef",
            QualityTier::Flac,
            "3135556",
            "4",
        )
        .unwrap();

        assert_eq!(
            url,
            "https://e-cdns-proxy-0.dzcdn.net/mobile/1/\
             5615ada6f45a937751289379ca0b9909f2019e82fe3bbb4cd15d22438e98fab9\
             fc55ebdaf19415c9fb377bbdc870fb8335805f758945ebcef0ad5316ab652a66\
             4081ac40049eb515ada01329fe824edf"
        );
    }

    #[test]
    fn test_derive_download_url_is_deterministic() {
        let a = derive_download_url("f00d", QualityTier::Mp3_320, "42", "1").unwrap();
        let b = derive_download_url("f00d", QualityTier::Mp3_320, "42", "1").unwrap();
        let c = derive_download_url("f00d", QualityTier::Mp3_128, "42", "1").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("https://e-cdns-proxy-f.dzcdn.net/mobile/1/"));
    }

    #[test]
    fn test_long_ids_pad_to_block_multiple() {
        let url = derive_download_url(
            "0123456789abcdef0123456789abcdef",
            QualityTier::Flac,
            "31355561234",
            "12",
        )
        .unwrap();
        let hash = url.rsplit('/').next().unwrap();
        assert_eq!(hash.len(), 96 * 2);
    }

    #[test]
    fn test_missing_origin_is_an_error() {
        assert!(derive_download_url("", QualityTier::Flac, "1", "1").is_err());
    }

    #[test]
    fn test_decrypt_chunk_known_answer() {
        let key = calc_blowfish_key("3135556");
        let ciphertext = hex::decode("55c7a4a67f9682d028b65e47df0f23e8").unwrap();
        assert_eq!(decrypt_chunk(&ciphertext, &key).unwrap(), b"Deezer stripe 16");
    }

    #[test]
    fn test_stripe_roundtrip_any_feed_size() {
        let key = calc_blowfish_key("916424");
        let plain = sample(CHUNK_SIZE * 7 + 1000);
        let encrypted = stripe_encrypt(&plain, &key);
        assert_ne!(encrypted, plain);

        for piece in [1, 100, 2048, 5000] {
            let mut dec = StripeDecryptor::new(&key, 0).unwrap();
            let mut out = Vec::new();
            for part in encrypted.chunks(piece) {
                out.extend(dec.update(part));
            }
            out.extend(dec.take_pending());
            assert_eq!(out, plain, "feed size {}", piece);
        }
    }

    #[test]
    fn test_only_full_chunks_divisible_by_three_are_touched() {
        let key = calc_blowfish_key("1");
        let data = sample(CHUNK_SIZE * 6 + 10);

        let mut dec = StripeDecryptor::new(&key, 0).unwrap();
        let mut out = dec.update(&data);
        out.extend(dec.take_pending());

        for (i, (a, b)) in out.chunks(CHUNK_SIZE).zip(data.chunks(CHUNK_SIZE)).enumerate() {
            let full = b.len() == CHUNK_SIZE;
            assert_eq!(a != b, full && i % 3 == 0, "chunk {}", i);
        }
    }

    #[test]
    fn test_start_index_continues_stripe() {
        let key = calc_blowfish_key("77");
        let plain = sample(CHUNK_SIZE * 5);
        let encrypted = stripe_encrypt(&plain, &key);

        let mut dec = StripeDecryptor::new(&key, 2).unwrap();
        let out = dec.update(&encrypted[CHUNK_SIZE * 2..]);
        assert_eq!(out, &plain[CHUNK_SIZE * 2..]);
        assert_eq!(dec.chunk_index(), 5);
    }
}

//! DES/3DES primitives, ISO 9797-1 padding and retail MAC, BAC key derivation.

use alloc::vec::Vec;
use cipher::{
    block_padding::NoPadding, Block, BlockDecrypt, BlockDecryptMut, BlockEncrypt,
    BlockEncryptMut, InvalidLength, KeyInit, KeyIvInit,
};
use core::iter;
use des::{Des, TdesEde3};
use sha1_checked::Sha1;
use tracing::error;

use crate::error::EmrtdError;

/// DES block size in bytes.
pub const BLOCK_SIZE: usize = 8;

/// All-zero IV used by BAC and 3DES secure messaging.
pub const ZERO_IV: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

/// Key derivation counter for encryption keys.
pub const KDF_ENC: u32 = 1;

/// Key derivation counter for MAC keys.
pub const KDF_MAC: u32 = 2;

fn wrong_key_or_iv(_: InvalidLength) -> EmrtdError {
    error!("Wrong key or IV size for DES");
    EmrtdError::CryptoPrimitiveFailure("Wrong key or IV size for DES")
}

fn check_block_aligned(data: &[u8]) -> Result<(), EmrtdError> {
    if data.len() % BLOCK_SIZE != 0 {
        error!(
            "Wrong data size for DES, expected a multiple of {BLOCK_SIZE}, found {}",
            data.len()
        );
        return Err(EmrtdError::CryptoPrimitiveFailure(
            "Wrong data size for DES",
        ));
    }
    Ok(())
}

/// Encrypts `data` with single DES in CBC mode.
///
/// # Errors
///
/// `EmrtdError::CryptoPrimitiveFailure` if `key` or `iv` is not 8 bytes or `data`
/// is not a multiple of the block size.
pub fn des_encrypt(key: &[u8], data: &[u8], iv: &[u8]) -> Result<Vec<u8>, EmrtdError> {
    check_block_aligned(data)?;
    let cipher = cbc::Encryptor::<Des>::new_from_slices(key, iv).map_err(wrong_key_or_iv)?;
    Ok(cipher.encrypt_padded_vec_mut::<NoPadding>(data))
}

/// Decrypts `data` with single DES in CBC mode.
///
/// # Errors
///
/// `EmrtdError::CryptoPrimitiveFailure` on invalid lengths.
pub fn des_decrypt(key: &[u8], data: &[u8], iv: &[u8]) -> Result<Vec<u8>, EmrtdError> {
    check_block_aligned(data)?;
    cbc::Decryptor::<Des>::new_from_slices(key, iv)
        .map_err(wrong_key_or_iv)?
        .decrypt_padded_vec_mut::<NoPadding>(data)
        .map_err(|_| EmrtdError::CryptoPrimitiveFailure("DES decryption failed"))
}

/// Expands a two-key 3DES key (16 bytes) to the three-key form `K1 ‖ K2 ‖ K1`.
fn tdes_key(key: &[u8]) -> Result<Vec<u8>, EmrtdError> {
    match key.len() {
        16 => Ok([key, &key[..8]].concat()),
        24 => Ok(key.to_vec()),
        len => {
            error!("3DES key must be 16 or 24 bytes long, found {len}");
            Err(EmrtdError::CryptoPrimitiveFailure(
                "3DES key must be 16 or 24 bytes long",
            ))
        }
    }
}

/// Encrypts `data` with 3DES (EDE) in CBC mode.
///
/// A 16-byte key is used as `K1 ‖ K2 ‖ K1`.
///
/// # Errors
///
/// `EmrtdError::CryptoPrimitiveFailure` on invalid lengths.
pub fn tdes_encrypt(key: &[u8], data: &[u8], iv: &[u8]) -> Result<Vec<u8>, EmrtdError> {
    check_block_aligned(data)?;
    let cipher = cbc::Encryptor::<TdesEde3>::new_from_slices(&tdes_key(key)?, iv)
        .map_err(wrong_key_or_iv)?;
    Ok(cipher.encrypt_padded_vec_mut::<NoPadding>(data))
}

/// Decrypts `data` with 3DES (EDE) in CBC mode.
///
/// # Errors
///
/// `EmrtdError::CryptoPrimitiveFailure` on invalid lengths.
pub fn tdes_decrypt(key: &[u8], data: &[u8], iv: &[u8]) -> Result<Vec<u8>, EmrtdError> {
    check_block_aligned(data)?;
    cbc::Decryptor::<TdesEde3>::new_from_slices(&tdes_key(key)?, iv)
        .map_err(wrong_key_or_iv)?
        .decrypt_padded_vec_mut::<NoPadding>(data)
        .map_err(|_| EmrtdError::CryptoPrimitiveFailure("3DES decryption failed"))
}

/// Pads the input data using ISO/IEC 9797-1 padding method 2 to a multiple of 8 bytes.
///
/// <https://en.wikipedia.org/wiki/ISO/IEC_9797-1#Padding_method_2>
///
/// # Example
///
/// ```
/// use emrtd_bac::crypto::pad;
/// assert_eq!(pad(&[0x01, 0x1E]), vec![0x01, 0x1E, 0x80, 0, 0, 0, 0, 0]);
/// assert_eq!(pad(&[0; 8]).len(), 16);
/// ```
#[must_use]
pub fn pad(data: &[u8]) -> Vec<u8> {
    let mut padded = data.to_vec();
    padded.push(0x80);
    let rem = padded.len() % BLOCK_SIZE;
    if rem != 0 {
        padded.extend(iter::repeat(0).take(BLOCK_SIZE - rem));
    }
    padded
}

/// Removes padding method 2 from the input data.
///
/// Trailing zero bytes are skipped; if the first non-zero byte is the `0x80`
/// marker the data before it is returned, otherwise the input is returned unchanged.
#[must_use]
pub fn unpad(data: &[u8]) -> &[u8] {
    match data.iter().rposition(|&b| b != 0x00) {
        Some(i) if data[i] == 0x80 => &data[..i],
        _ => data,
    }
}

/// XORs two byte slices of equal length.
///
/// # Errors
///
/// * `EmrtdError::InvalidArgument` if `a` and `b` have different lengths.
pub fn xor_slices(a: &[u8], b: &[u8]) -> Result<Vec<u8>, EmrtdError> {
    if a.len() != b.len() {
        error!(
            "XORed slices must have the same length, found {}, {}",
            a.len(),
            b.len()
        );
        return Err(EmrtdError::InvalidArgument(
            "XORed slices must have the same length",
        ));
    }
    Ok(a.iter().zip(b.iter()).map(|(&x, &y)| x ^ y).collect())
}

/// Computes the ISO/IEC 9797-1 MAC algorithm 3 (retail MAC) with DES.
///
/// `data` must already be padded. The blocks are CBC-chained under
/// `key[..8]`; the last block is then decrypted under `key[8..16]` and
/// encrypted again under `key[..8]`.
///
/// # Errors
///
/// * `EmrtdError::InvalidArgument` if the key is not 16 bytes or the data is not padded.
pub fn retail_mac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, EmrtdError> {
    if key.len() != 16 {
        error!("Can not compute MAC, MAC key length {} is invalid", key.len());
        return Err(EmrtdError::InvalidArgument("MAC key must be 16 bytes long"));
    }
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        error!(
            "Can not compute MAC, data length {} is not a multiple of 8",
            data.len()
        );
        return Err(EmrtdError::InvalidArgument(
            "MAC input must be a non-empty multiple of 8 bytes",
        ));
    }

    let (key1, key2) = key.split_at(8);
    let des1 = Des::new_from_slice(key1).map_err(wrong_key_or_iv)?;
    let des2 = Des::new_from_slice(key2).map_err(wrong_key_or_iv)?;

    let mut y = Block::<Des>::default();
    for block in data.chunks_exact(BLOCK_SIZE) {
        y.iter_mut().zip(block).for_each(|(acc, b)| *acc ^= b);
        des1.encrypt_block(&mut y);
    }
    des2.decrypt_block(&mut y);
    des1.encrypt_block(&mut y);
    Ok(y.to_vec())
}

/// Sets the low bit of every key byte so that each byte has odd parity.
#[must_use]
pub fn adjust_parity(mut key: Vec<u8>) -> Vec<u8> {
    for byte in &mut key {
        let high_bits_even = (*byte & 0xFE).count_ones() % 2 == 0;
        *byte = (*byte & 0xFE) | u8::from(high_bits_even);
    }
    key
}

/// SHA-1 with collision detection.
///
/// # Errors
///
/// `EmrtdError::CryptoPrimitiveFailure` if a collision attack is detected.
pub fn sha1(data: &[u8]) -> Result<Vec<u8>, EmrtdError> {
    let hash_result = Sha1::try_digest(data);
    if hash_result.has_collision() {
        error!("SHA1 hash calculation had collision");
        return Err(EmrtdError::CryptoPrimitiveFailure(
            "SHA1 hash calculation had collision",
        ));
    }
    Ok(hash_result.hash().as_slice().to_vec())
}

/// Derives a 2-key 3DES key from a key seed.
///
/// `SHA-1(seed ‖ counter)`, first 16 bytes, parity adjusted.
/// See ICAO Doc 9303-11 Section 9.7.1 and Appendix D.1.
///
/// # Errors
///
/// `EmrtdError::CryptoPrimitiveFailure` if hashing fails.
pub fn derive_key(seed: &[u8], counter: u32) -> Result<Vec<u8>, EmrtdError> {
    let d = [seed, &counter.to_be_bytes()[..]].concat();
    let hash = sha1(&d)?;
    Ok(adjust_parity(hash[..16].to_vec()))
}

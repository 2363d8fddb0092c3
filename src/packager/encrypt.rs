//! Encryption primitives for IntuneWin packages.
//!
//! Implements AES-256-CBC encryption with HMAC-SHA256 authentication in the
//! exact byte layout Intune consumes: `HMAC(32) || IV(16) || ciphertext`.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::models::detection::EncryptionInfo;
use crate::models::error::{PackageError, PackageResult};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Generate a random encryption key, MAC key, and IV.
pub fn generate_keys() -> PackageResult<([u8; 32], [u8; 32], [u8; 16])> {
    let mut rng = rand::thread_rng();

    let mut enc_key = [0u8; 32];
    let mut mac_key = [0u8; 32];
    let mut iv = [0u8; 16];

    rng.try_fill_bytes(&mut enc_key)
        .map_err(|e| PackageError::EncryptionError {
            reason: format!("Failed to generate encryption key: {}", e),
        })?;
    rng.try_fill_bytes(&mut mac_key)
        .map_err(|e| PackageError::EncryptionError {
            reason: format!("Failed to generate MAC key: {}", e),
        })?;
    rng.try_fill_bytes(&mut iv)
        .map_err(|e| PackageError::EncryptionError {
            reason: format!("Failed to generate IV: {}", e),
        })?;

    Ok((enc_key, mac_key, iv))
}

/// Append PKCS7 padding up to the given block size.
///
/// Always appends between 1 and `block_size` bytes; block-aligned input gets
/// a full extra block.
pub fn pkcs7_pad(data: &[u8], block_size: usize) -> Vec<u8> {
    let padding = block_size - (data.len() % block_size);
    let mut padded = Vec::with_capacity(data.len() + padding);
    padded.extend_from_slice(data);
    padded.resize(data.len() + padding, padding as u8);
    padded
}

/// Remove PKCS7 padding.
///
/// The stated padding length must be in 1..=16, must not exceed the data
/// length, and every padding byte must repeat it.
pub fn pkcs7_unpad(data: &[u8]) -> PackageResult<Vec<u8>> {
    if data.is_empty() {
        return Err(PackageError::InvalidPadding);
    }

    let padding = data[data.len() - 1] as usize;
    if padding == 0 || padding > data.len() || padding > BLOCK_SIZE {
        return Err(PackageError::InvalidPadding);
    }

    if data[data.len() - padding..].iter().any(|&b| b != padding as u8) {
        return Err(PackageError::InvalidPadding);
    }

    Ok(data[..data.len() - padding].to_vec())
}

/// Encrypt plaintext into the IntuneWin blob layout.
///
/// Returns `HMAC-SHA256(macKey, IV || ciphertext) || IV || ciphertext` where
/// the ciphertext is AES-256-CBC over the PKCS7-padded plaintext.
pub fn encrypt_content(
    plaintext: &[u8],
    enc_key: &[u8; 32],
    mac_key: &[u8; 32],
    iv: &[u8; 16],
) -> PackageResult<Vec<u8>> {
    let ciphertext = aes_encrypt(plaintext, enc_key, iv)?;

    let mut output = Vec::with_capacity(32 + 16 + ciphertext.len());
    output.extend_from_slice(&[0u8; 32]);
    output.extend_from_slice(iv);
    output.extend_from_slice(&ciphertext);

    let mac = compute_hmac(mac_key, &output[32..])?;
    output[..32].copy_from_slice(&mac);

    Ok(output)
}

/// Decrypt a blob in the IntuneWin layout, verifying the HMAC first.
pub fn decrypt_content(
    encrypted_data: &[u8],
    encryption_info: &EncryptionInfo,
) -> PackageResult<Vec<u8>> {
    // Minimum size: HMAC (32) + IV (16) + at least one block (16)
    if encrypted_data.len() < 64 {
        return Err(PackageError::DecryptionError {
            reason: "Encrypted data too short".to_string(),
        });
    }

    let stored_hmac = &encrypted_data[0..32];
    let iv = &encrypted_data[32..48];
    let ciphertext = &encrypted_data[48..];

    let computed_hmac = compute_hmac(&encryption_info.mac_key, &encrypted_data[32..])?;

    // Constant-time comparison to prevent timing attacks
    if !constant_time_compare(&computed_hmac, stored_hmac) {
        return Err(PackageError::HmacVerificationFailed);
    }

    let mut iv_array = [0u8; 16];
    iv_array.copy_from_slice(iv);

    aes_decrypt(ciphertext, &encryption_info.encryption_key, &iv_array)
}

/// Compute the SHA256 digest of the unencrypted content.
pub fn file_digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);

    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);

    output
}

/// Generate keys, encrypt the plaintext, and fill in an [`EncryptionInfo`].
///
/// Returns the populated info alongside the encrypted blob. The file digest
/// covers the plaintext, not the ciphertext.
pub fn create_encryption_info(plaintext: &[u8]) -> PackageResult<(EncryptionInfo, Vec<u8>)> {
    let (enc_key, mac_key, iv) = generate_keys()?;

    let encrypted = encrypt_content(plaintext, &enc_key, &mac_key, &iv)?;

    let mut info = EncryptionInfo::new();
    info.encryption_key = enc_key;
    info.mac_key = mac_key;
    info.iv = iv;
    info.mac.copy_from_slice(&encrypted[..32]);
    info.file_digest = file_digest(plaintext);

    Ok((info, encrypted))
}

/// Encrypt data with AES-256-CBC over an explicitly PKCS7-padded buffer.
fn aes_encrypt(plaintext: &[u8], key: &[u8; 32], iv: &[u8; 16]) -> PackageResult<Vec<u8>> {
    let mut buffer = pkcs7_pad(plaintext, BLOCK_SIZE);
    let len = buffer.len();

    let encryptor = Aes256CbcEnc::new(key.into(), iv.into());
    encryptor
        .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
        .map_err(|e| PackageError::EncryptionError {
            reason: format!("AES encryption failed: {}", e),
        })?;

    Ok(buffer)
}

/// Decrypt data with AES-256-CBC and remove PKCS7 padding.
fn aes_decrypt(ciphertext: &[u8], key: &[u8; 32], iv: &[u8; 16]) -> PackageResult<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(PackageError::DecryptionError {
            reason: "Invalid ciphertext length (must be multiple of 16)".to_string(),
        });
    }

    let mut buffer = ciphertext.to_vec();
    let decryptor = Aes256CbcDec::new(key.into(), iv.into());

    decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| PackageError::DecryptionError {
            reason: "AES decryption failed".to_string(),
        })?;

    pkcs7_unpad(&buffer)
}

/// Compute HMAC-SHA256.
fn compute_hmac(key: &[u8; 32], data: &[u8]) -> PackageResult<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| PackageError::EncryptionError {
        reason: format!("HMAC initialization failed: {}", e),
    })?;

    mac.update(data);

    let result = mac.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result.into_bytes());

    Ok(output)
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkcs7_pad_partial_block() {
        let padded = pkcs7_pad(b"Hello", BLOCK_SIZE);
        assert_eq!(padded.len(), 16);
        assert_eq!(&padded[..5], b"Hello");
        assert!(padded[5..].iter().all(|&b| b == 11));
    }

    #[test]
    fn test_pkcs7_pad_aligned_input_gets_full_block() {
        let padded = pkcs7_pad(&[0xAA; 16], BLOCK_SIZE);
        assert_eq!(padded.len(), 32);
        assert!(padded[16..].iter().all(|&b| b == 16));
    }

    #[test]
    fn test_pkcs7_pad_empty_input() {
        let padded = pkcs7_pad(b"", BLOCK_SIZE);
        assert_eq!(padded, vec![16u8; 16]);
    }

    #[test]
    fn test_pkcs7_roundtrip() {
        for len in 0..48 {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let padded = pkcs7_pad(&data, BLOCK_SIZE);
            assert_eq!(padded.len() % BLOCK_SIZE, 0);
            let pad_len = padded.len() - data.len();
            assert!((1..=BLOCK_SIZE).contains(&pad_len));
            assert_eq!(pkcs7_unpad(&padded).unwrap(), data);
        }
    }

    #[test]
    fn test_pkcs7_unpad_rejects_empty() {
        assert!(matches!(
            pkcs7_unpad(&[]),
            Err(PackageError::InvalidPadding)
        ));
    }

    #[test]
    fn test_pkcs7_unpad_rejects_zero_padding() {
        let mut data = vec![1u8; 16];
        data[15] = 0;
        assert!(matches!(
            pkcs7_unpad(&data),
            Err(PackageError::InvalidPadding)
        ));
    }

    #[test]
    fn test_pkcs7_unpad_rejects_padding_over_block_size() {
        // 32 bytes of 0x20: stated padding fits the length but not the block
        let data = vec![32u8; 32];
        assert!(matches!(
            pkcs7_unpad(&data),
            Err(PackageError::InvalidPadding)
        ));
    }

    #[test]
    fn test_pkcs7_unpad_rejects_padding_over_length() {
        let data = vec![9u8, 9, 12];
        assert!(matches!(
            pkcs7_unpad(&data),
            Err(PackageError::InvalidPadding)
        ));
    }

    #[test]
    fn test_pkcs7_unpad_rejects_inconsistent_bytes() {
        let mut data = pkcs7_pad(b"Hello", BLOCK_SIZE);
        data[8] ^= 0x01;
        assert!(matches!(
            pkcs7_unpad(&data),
            Err(PackageError::InvalidPadding)
        ));
    }

    #[test]
    fn test_generate_keys_unique() {
        let (enc1, mac1, iv1) = generate_keys().unwrap();
        let (enc2, mac2, iv2) = generate_keys().unwrap();

        assert_ne!(enc1, enc2);
        assert_ne!(mac1, mac2);
        assert_ne!(iv1, iv2);
    }

    #[test]
    fn test_encrypt_content_structure() {
        let (enc_key, mac_key, iv) = generate_keys().unwrap();
        let encrypted = encrypt_content(b"Hello, Intune!", &enc_key, &mac_key, &iv).unwrap();

        // HMAC (32) + IV (16) + one padded block (16)
        assert_eq!(encrypted.len(), 64);
        assert_eq!(&encrypted[32..48], &iv);
    }

    #[test]
    fn test_encrypt_content_blob_size_law() {
        let (enc_key, mac_key, iv) = generate_keys().unwrap();

        for len in [0usize, 1, 15, 16, 17, 31, 32, 1000] {
            let plaintext = vec![0x42u8; len];
            let encrypted = encrypt_content(&plaintext, &enc_key, &mac_key, &iv).unwrap();
            let expected = 48 + ((len + 1).div_ceil(16)) * 16;
            assert_eq!(encrypted.len(), expected, "blob size mismatch for len {len}");
        }
    }

    #[test]
    fn test_encrypt_one_block_pads_to_two() {
        let (enc_key, mac_key, iv) = generate_keys().unwrap();
        let encrypted = encrypt_content(&[0u8; 16], &enc_key, &mac_key, &iv).unwrap();

        // A block-aligned plaintext gains a full padding block
        assert_eq!(encrypted.len() - 48, 32);
    }

    #[test]
    fn test_create_encryption_info_matches_blob() {
        let plaintext = b"Test data for HMAC";
        let (info, encrypted) = create_encryption_info(plaintext).unwrap();

        assert_eq!(&encrypted[..32], &info.mac);
        assert_eq!(&encrypted[32..48], &info.iv);
        assert_eq!(info.file_digest, file_digest(plaintext));
        assert_eq!(info.profile_identifier, "ProfileVersion1");
        assert_eq!(info.file_digest_algorithm, "SHA256");
    }

    #[test]
    fn test_create_encryption_info_unique_keys() {
        let (info1, _) = create_encryption_info(b"Test data").unwrap();
        let (info2, _) = create_encryption_info(b"Test data").unwrap();

        assert_ne!(info1.encryption_key, info2.encryption_key);
        assert_ne!(info1.mac_key, info2.mac_key);
        assert_ne!(info1.iv, info2.iv);
    }

    #[test]
    fn test_decrypt_content_roundtrip() {
        let plaintext = b"Hello, Intune! This is a test message for encryption round-trip.";

        let (info, encrypted) = create_encryption_info(plaintext).unwrap();
        let decrypted = decrypt_content(&encrypted, &info).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_content_exact_block_size() {
        let plaintext = b"0123456789ABCDEF";

        let (info, encrypted) = create_encryption_info(plaintext).unwrap();
        let decrypted = decrypt_content(&encrypted, &info).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_content_large_data() {
        let plaintext: Vec<u8> = (0..1000).map(|i| (i % 256) as u8).collect();

        let (info, encrypted) = create_encryption_info(&plaintext).unwrap();
        let decrypted = decrypt_content(&encrypted, &info).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_content_tampered_mac() {
        let (info, mut encrypted) = create_encryption_info(b"Test data").unwrap();

        encrypted[0] ^= 0xFF;

        assert!(matches!(
            decrypt_content(&encrypted, &info),
            Err(PackageError::HmacVerificationFailed)
        ));
    }

    #[test]
    fn test_decrypt_content_tampered_iv() {
        let (info, mut encrypted) = create_encryption_info(b"Test data").unwrap();

        // Flipping bit 0 of the IV invalidates the MAC before decryption
        encrypted[32] ^= 0x01;

        assert!(matches!(
            decrypt_content(&encrypted, &info),
            Err(PackageError::HmacVerificationFailed)
        ));
    }

    #[test]
    fn test_decrypt_content_tampered_ciphertext() {
        let (info, mut encrypted) = create_encryption_info(b"Test data").unwrap();

        let last = encrypted.len() - 1;
        encrypted[last] ^= 0x80;

        assert!(matches!(
            decrypt_content(&encrypted, &info),
            Err(PackageError::HmacVerificationFailed)
        ));
    }

    #[test]
    fn test_decrypt_content_too_short() {
        let info = EncryptionInfo::new();
        let short_data = vec![0u8; 63];

        assert!(matches!(
            decrypt_content(&short_data, &info),
            Err(PackageError::DecryptionError { .. })
        ));
    }

    #[test]
    fn test_file_digest_known_value() {
        let hash = file_digest(b"test");

        // Known SHA256 hash of "test"
        let expected = [
            0x9f, 0x86, 0xd0, 0x81, 0x88, 0x4c, 0x7d, 0x65, 0x9a, 0x2f, 0xea, 0xa0, 0xc5, 0x5a,
            0xd0, 0x15, 0xa3, 0xbf, 0x4f, 0x1b, 0x2b, 0x0b, 0x82, 0x2c, 0xd1, 0x5d, 0x6c, 0x15,
            0xb0, 0xf0, 0x0a, 0x08,
        ];

        assert_eq!(hash, expected);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(&[1, 2, 3], &[1, 2, 3]));
        assert!(!constant_time_compare(&[1, 2, 3], &[1, 2, 4]));
        assert!(!constant_time_compare(&[1, 2, 3], &[1, 2, 3, 4]));
    }
}

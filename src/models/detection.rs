//! Detection metadata models for IntuneWin packages.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

use crate::models::msi::MsiInfo;
use crate::models::package::application_name;

/// Encryption information for the package.
#[derive(Debug, Clone)]
pub struct EncryptionInfo {
    /// AES-256 encryption key (32 bytes)
    pub encryption_key: [u8; 32],
    /// HMAC-SHA256 key (32 bytes)
    pub mac_key: [u8; 32],
    /// AES initialization vector (16 bytes)
    pub iv: [u8; 16],
    /// HMAC-SHA256 of (IV || ciphertext)
    pub mac: [u8; 32],
    /// SHA256 hash of the unencrypted content
    pub file_digest: [u8; 32],
    /// Profile identifier (always "ProfileVersion1")
    pub profile_identifier: String,
    /// Digest algorithm name (always "SHA256")
    pub file_digest_algorithm: String,
}

impl Default for EncryptionInfo {
    fn default() -> Self {
        Self {
            encryption_key: [0u8; 32],
            mac_key: [0u8; 32],
            iv: [0u8; 16],
            mac: [0u8; 32],
            file_digest: [0u8; 32],
            profile_identifier: "ProfileVersion1".to_string(),
            file_digest_algorithm: "SHA256".to_string(),
        }
    }
}

impl EncryptionInfo {
    /// Create new encryption info with default profile settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get Base64-encoded encryption key.
    pub fn encryption_key_base64(&self) -> String {
        BASE64.encode(self.encryption_key)
    }

    /// Get Base64-encoded MAC key.
    pub fn mac_key_base64(&self) -> String {
        BASE64.encode(self.mac_key)
    }

    /// Get Base64-encoded IV.
    pub fn iv_base64(&self) -> String {
        BASE64.encode(self.iv)
    }

    /// Get Base64-encoded MAC.
    pub fn mac_base64(&self) -> String {
        BASE64.encode(self.mac)
    }

    /// Get Base64-encoded file digest.
    pub fn file_digest_base64(&self) -> String {
        BASE64.encode(self.file_digest)
    }

    /// Set encryption key from Base64 string.
    pub fn set_encryption_key_from_base64(&mut self, b64: &str) -> Result<(), String> {
        self.encryption_key = decode_fixed("encryption key", b64)?;
        Ok(())
    }

    /// Set MAC key from Base64 string.
    pub fn set_mac_key_from_base64(&mut self, b64: &str) -> Result<(), String> {
        self.mac_key = decode_fixed("MAC key", b64)?;
        Ok(())
    }

    /// Set IV from Base64 string.
    pub fn set_iv_from_base64(&mut self, b64: &str) -> Result<(), String> {
        self.iv = decode_fixed("IV", b64)?;
        Ok(())
    }

    /// Set MAC from Base64 string.
    pub fn set_mac_from_base64(&mut self, b64: &str) -> Result<(), String> {
        self.mac = decode_fixed("MAC", b64)?;
        Ok(())
    }

    /// Set file digest from Base64 string.
    pub fn set_file_digest_from_base64(&mut self, b64: &str) -> Result<(), String> {
        self.file_digest = decode_fixed("file digest", b64)?;
        Ok(())
    }
}

/// Decode Base64 into a fixed-length byte array.
fn decode_fixed<const N: usize>(label: &str, b64: &str) -> Result<[u8; N], String> {
    let decoded = BASE64
        .decode(b64)
        .map_err(|e| format!("Invalid Base64 for {}: {}", label, e))?;
    let len = decoded.len();
    decoded
        .try_into()
        .map_err(|_| format!("{} must be {} bytes, got {}", label, N, len))
}

/// Metadata written to Detection.xml.
#[derive(Debug, Clone)]
pub struct DetectionMetadata {
    /// Display name of the application (MSI product name when available,
    /// otherwise the setup file name without its .msi/.exe extension)
    pub name: String,
    /// Original uncompressed content size in bytes
    pub unencrypted_content_size: u64,
    /// Encrypted file name (always "IntunePackage.intunewin")
    pub file_name: String,
    /// Setup file name
    pub setup_file: String,
    /// Encryption parameters
    pub encryption_info: EncryptionInfo,
    /// MSI metadata, present only for .msi setup files
    pub msi_info: Option<MsiInfo>,
}

impl DetectionMetadata {
    /// Create new detection metadata.
    pub fn new(setup_file: String, unencrypted_content_size: u64, msi_info: Option<MsiInfo>) -> Self {
        let name = msi_info
            .as_ref()
            .filter(|m| !m.product_name.is_empty())
            .map(|m| m.product_name.clone())
            .unwrap_or_else(|| application_name(&setup_file));

        Self {
            name,
            unencrypted_content_size,
            file_name: "IntunePackage.intunewin".to_string(),
            setup_file,
            encryption_info: EncryptionInfo::new(),
            msi_info,
        }
    }
}

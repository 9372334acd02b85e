use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::TokenError;

/// Hash algorithms this tool can produce and recognise.
///
/// `Sha1` and `Sha256` double as repository object formats; the wider set
/// appears in message imprints and ESSCertIDv2 identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Hash the given data using this algorithm
    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// Digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub fn from_oid(oid: &str) -> Result<Self, TokenError> {
        match oid {
            "1.3.14.3.2.26" => Ok(HashAlgorithm::Sha1),
            "2.16.840.1.101.3.4.2.1" => Ok(HashAlgorithm::Sha256),
            "2.16.840.1.101.3.4.2.2" => Ok(HashAlgorithm::Sha384),
            "2.16.840.1.101.3.4.2.3" => Ok(HashAlgorithm::Sha512),
            other => Err(TokenError::UnsupportedHashAlgorithm(other.to_string())),
        }
    }

    /// Raw OID content octets, for hand-assembled DER structures
    pub fn oid_der(&self) -> &'static [u8] {
        match self {
            HashAlgorithm::Sha1 => &[0x2B, 0x0E, 0x03, 0x02, 0x1A],
            HashAlgorithm::Sha256 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01],
            HashAlgorithm::Sha384 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02],
            HashAlgorithm::Sha512 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03],
        }
    }

    /// Name as written in the `Hash-Algorithm:` trailer and git object formats
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, TokenError> {
        match name {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(TokenError::UnsupportedHashAlgorithm(other.to_string())),
        }
    }
}

/// Lowercase hex, the only hex spelling used anywhere in this crate
pub fn hex_lower(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Trust-store filename key for a certificate subject.
///
/// SHA-1 over the DER subject name, first four bytes as a little-endian
/// integer, printed as eight hex digits. The store is written and read only
/// by this tool and anchors are matched bitwise, so the key needs local
/// consistency, not interoperability with other stores.
pub fn subject_name_hash(subject_der: &[u8]) -> String {
    let digest = Sha1::digest(subject_der);
    let word = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    format!("{:08x}", word)
}

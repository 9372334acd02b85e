use ecdsa::signature::Verifier;
use p256::ecdsa::{Signature as P256Signature, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{Signature as P384Signature, VerifyingKey as P384VerifyingKey};
use rsa::pkcs1v15::{Signature as RsaSignature, VerifyingKey as RsaVerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use x509_parser::prelude::*;

use crate::crypto::hash::HashAlgorithm;
use crate::error::SignatureError;

#[derive(Debug, Clone)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    P256(P256VerifyingKey),
    P384(P384VerifyingKey),
}

impl PublicKey {
    pub fn from_certificate(cert: &X509Certificate) -> Result<Self, SignatureError> {
        let spki = cert.public_key();
        let algorithm_oid = &spki.algorithm.algorithm;

        match algorithm_oid.to_id_string().as_str() {
            // id-ecPublicKey: the curve is specified in the parameters
            "1.2.840.10045.2.1" => {
                let params = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .ok_or_else(|| {
                        SignatureError::UnsupportedAlgorithm(
                            "EC key without curve parameters".to_string(),
                        )
                    })?;
                let curve_oid = params
                    .as_oid()
                    .map_err(|e| SignatureError::PublicKeyParse(e.to_string()))?;
                let key_bytes = &spki.subject_public_key.data;
                match curve_oid.to_id_string().as_str() {
                    // secp256r1 (P-256)
                    "1.2.840.10045.3.1.7" => {
                        let verifying_key = P256VerifyingKey::from_sec1_bytes(key_bytes)
                            .map_err(|e| SignatureError::PublicKeyParse(e.to_string()))?;
                        Ok(PublicKey::P256(verifying_key))
                    }
                    // secp384r1 (P-384)
                    "1.3.132.0.34" => {
                        let verifying_key = P384VerifyingKey::from_sec1_bytes(key_bytes)
                            .map_err(|e| SignatureError::PublicKeyParse(e.to_string()))?;
                        Ok(PublicKey::P384(verifying_key))
                    }
                    oid => Err(SignatureError::UnsupportedAlgorithm(format!(
                        "EC curve: {}",
                        oid
                    ))),
                }
            }
            // rsaEncryption
            "1.2.840.113549.1.1.1" => {
                let key = RsaPublicKey::from_public_key_der(spki.raw)
                    .map_err(|e| SignatureError::PublicKeyParse(e.to_string()))?;
                Ok(PublicKey::Rsa(key))
            }
            oid => Err(SignatureError::UnsupportedAlgorithm(oid.to_string())),
        }
    }

    /// Verify `signature` over the raw (unhashed) `message`.
    ///
    /// `digest` selects the hash for RSA-PKCS#1v1.5; the ECDSA keys hash
    /// with their curve's companion digest, so any other pairing is
    /// rejected rather than silently mis-verified.
    pub fn verify(
        &self,
        message: &[u8],
        signature: &[u8],
        digest: HashAlgorithm,
    ) -> Result<(), SignatureError> {
        match self {
            PublicKey::Rsa(key) => {
                let sig = RsaSignature::try_from(signature)
                    .map_err(|e| SignatureError::InvalidFormat(e.to_string()))?;
                match digest {
                    HashAlgorithm::Sha1 => RsaVerifyingKey::<Sha1>::new(key.clone())
                        .verify(message, &sig)
                        .map_err(|_| SignatureError::InvalidSignature),
                    HashAlgorithm::Sha256 => RsaVerifyingKey::<Sha256>::new(key.clone())
                        .verify(message, &sig)
                        .map_err(|_| SignatureError::InvalidSignature),
                    HashAlgorithm::Sha384 => RsaVerifyingKey::<Sha384>::new(key.clone())
                        .verify(message, &sig)
                        .map_err(|_| SignatureError::InvalidSignature),
                    HashAlgorithm::Sha512 => RsaVerifyingKey::<Sha512>::new(key.clone())
                        .verify(message, &sig)
                        .map_err(|_| SignatureError::InvalidSignature),
                }
            }
            PublicKey::P256(key) => {
                if digest != HashAlgorithm::Sha256 {
                    return Err(SignatureError::UnsupportedAlgorithm(format!(
                        "P-256 with {}",
                        digest.name()
                    )));
                }
                let sig = P256Signature::from_der(signature)
                    .map_err(|e| SignatureError::InvalidFormat(e.to_string()))?;
                key.verify(message, &sig)
                    .map_err(|_| SignatureError::InvalidSignature)
            }
            PublicKey::P384(key) => {
                if digest != HashAlgorithm::Sha384 {
                    return Err(SignatureError::UnsupportedAlgorithm(format!(
                        "P-384 with {}",
                        digest.name()
                    )));
                }
                let sig = P384Signature::from_der(signature)
                    .map_err(|e| SignatureError::InvalidFormat(e.to_string()))?;
                key.verify(message, &sig)
                    .map_err(|_| SignatureError::InvalidSignature)
            }
        }
    }
}

/// Map a signature-algorithm OID to the digest it pairs with
pub fn digest_for_signature_oid(oid: &str) -> Result<HashAlgorithm, SignatureError> {
    match oid {
        // sha*WithRSAEncryption
        "1.2.840.113549.1.1.5" => Ok(HashAlgorithm::Sha1),
        "1.2.840.113549.1.1.11" => Ok(HashAlgorithm::Sha256),
        "1.2.840.113549.1.1.12" => Ok(HashAlgorithm::Sha384),
        "1.2.840.113549.1.1.13" => Ok(HashAlgorithm::Sha512),
        // ecdsa-with-SHA*
        "1.2.840.10045.4.3.2" => Ok(HashAlgorithm::Sha256),
        "1.2.840.10045.4.3.3" => Ok(HashAlgorithm::Sha384),
        "1.2.840.10045.4.3.4" => Ok(HashAlgorithm::Sha512),
        other => Err(SignatureError::UnsupportedAlgorithm(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_oid_mapping() {
        assert_eq!(
            digest_for_signature_oid("1.2.840.113549.1.1.11").unwrap(),
            HashAlgorithm::Sha256
        );
        assert_eq!(
            digest_for_signature_oid("1.2.840.10045.4.3.3").unwrap(),
            HashAlgorithm::Sha384
        );
        assert!(digest_for_signature_oid("1.2.3.4").is_err());
    }
}

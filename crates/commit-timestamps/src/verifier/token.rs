//! Token verification: CMS signature over the signed attributes, digest
//! binding, signer-certificate identity, chain and revocation state at
//! the token's own genTime.

use chrono::{DateTime, Utc};

use crate::chain::build_chain;
use crate::crypto::hash::hex_lower;
use crate::crypto::signature::{digest_for_signature_oid, PublicKey};
use crate::error::{TimestampError, TokenError};
use crate::fetcher::{download_crls, HttpClient};
use crate::ltv::LtvStore;
use crate::parser::certificate::parse_der_certificate;
use crate::parser::crl::CrlBundle;
use crate::parser::rfc3161::TimestampToken;
use crate::truststore::TrustStore;
use crate::types::chain::CertificateChain;
use crate::verifier::certificate::{
    check_chain_revocation, verify_chain_at, verify_timestamping_eku, RevocationPolicy,
};

/// rsaEncryption: the digest is named separately in the SignerInfo
const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
/// id-ecPublicKey, same situation for some ECDSA TSAs
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";

/// Verify the CMS signature of a token against the chain's signer.
///
/// RFC 3161 tokens always sign a set of authenticated attributes (the
/// ESS signing-certificate id lives there), so the signature input is
/// the DER `SET OF` re-encoding of those attributes, and the
/// messageDigest attribute must hash-match the encapsulated TSTInfo.
pub fn verify_token_signature(
    token: &TimestampToken,
    chain: &CertificateChain,
) -> Result<(), TokenError> {
    if !token.signer_id.matches(chain.signer()) {
        return Err(TokenError::SignerIdMismatch);
    }

    if token.digest_algorithm.hash(&token.econtent) != token.message_digest_attr {
        return Err(TokenError::MessageDigestMismatch);
    }

    let signer = parse_der_certificate(chain.signer())
        .map_err(|e| TokenError::Parse(e.to_string()))?;
    let key = PublicKey::from_certificate(&signer)
        .map_err(|e| TokenError::Parse(e.to_string()))?;

    let digest = match token.signature_algorithm_oid.as_str() {
        OID_RSA_ENCRYPTION | OID_EC_PUBLIC_KEY => token.digest_algorithm,
        oid => digest_for_signature_oid(oid).map_err(|e| TokenError::Parse(e.to_string()))?,
    };

    key.verify(&token.signed_attrs_der, &token.signature, digest)
        .map_err(|_| TokenError::SignatureInvalid)
}

/// Full check of a token at a reference time, usually its own genTime:
/// digest binding, CMS signature, timestamping EKU, chain validity
/// against the trust store, and strict revocation from `crls`.
pub fn verify_token_at(
    token: &TimestampToken,
    expected_digest: &[u8],
    chain: &CertificateChain,
    trust_store: &TrustStore,
    crls: &CrlBundle,
    at: DateTime<Utc>,
) -> Result<(), TimestampError> {
    if token.tst_info.message_imprint.digest != expected_digest {
        return Err(TokenError::DigestMismatch {
            expected: hex_lower(expected_digest),
            actual: hex_lower(&token.tst_info.message_imprint.digest),
        }
        .into());
    }

    verify_token_signature(token, chain)?;

    let signer = parse_der_certificate(chain.signer())?;
    verify_timestamping_eku(&signer)?;

    verify_chain_at(chain, trust_store, at)?;
    check_chain_revocation(chain, crls, at, RevocationPolicy::Strict)?;
    Ok(())
}

/// Acquisition-side validation: resolve the chain (LTV store first, then
/// a fresh build against the TSA), refresh CRLs into the store, then run
/// the full check at the token's genTime. The files written here are what
/// the fixed-point loop stages into the timestamped tree.
pub fn verify_token_with_ltv(
    http: &HttpClient,
    ltv: &LtvStore,
    trust_store: &TrustStore,
    token: &TimestampToken,
    expected_digest: &[u8],
    tsa_url: &str,
) -> Result<CertificateChain, TimestampError> {
    let iid = token.signer_id.issuer_id();

    let chain = match ltv.read_chain(&iid)? {
        Some(chain) if token.signer_id.matches(chain.signer()) => chain,
        _ => {
            let chain = build_chain(http, tsa_url, token, trust_store)?;
            ltv.write_chain(&iid, &chain)?;
            chain
        }
    };

    let crls = download_crls(http, &chain)?;
    ltv.write_crl_bundle(&iid, &crls.to_pem())?;

    verify_token_at(
        token,
        expected_digest,
        &chain,
        trust_store,
        &crls,
        token.tst_info.gen_time,
    )?;
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::HashAlgorithm;
    use crate::parser::rfc3161::{MessageImprint, SignerId, TstInfo};

    fn fake_token(signer_der: &[u8]) -> TimestampToken {
        let econtent = b"tstinfo bytes".to_vec();
        TimestampToken {
            der: Vec::new(),
            tst_info: TstInfo {
                policy: "1.2.3".to_string(),
                serial: vec![1],
                gen_time: Utc::now(),
                message_imprint: MessageImprint {
                    algorithm: HashAlgorithm::Sha256,
                    digest: vec![0xAA; 32],
                },
                nonce: None,
            },
            certificates: Vec::new(),
            signer_id: SignerId {
                algorithm: HashAlgorithm::Sha256,
                hash: HashAlgorithm::Sha256.hash(signer_der),
            },
            econtent: econtent.clone(),
            message_digest_attr: HashAlgorithm::Sha256.hash(&econtent),
            signed_attrs_der: vec![0x31, 0x00],
            signature: vec![0x00],
            digest_algorithm: HashAlgorithm::Sha256,
            signature_algorithm_oid: OID_RSA_ENCRYPTION.to_string(),
        }
    }

    #[test]
    fn signer_id_mismatch_is_detected() {
        let token = fake_token(b"the real signer");
        let chain = CertificateChain::new(vec![b"a different cert".to_vec()]).unwrap();
        assert!(matches!(
            verify_token_signature(&token, &chain),
            Err(TokenError::SignerIdMismatch)
        ));
    }

    #[test]
    fn message_digest_attr_mismatch_is_detected() {
        let signer = b"the real signer".to_vec();
        let mut token = fake_token(&signer);
        token.message_digest_attr = vec![0; 32];
        let chain = CertificateChain::new(vec![signer]).unwrap();
        assert!(matches!(
            verify_token_signature(&token, &chain),
            Err(TokenError::MessageDigestMismatch)
        ));
    }

    #[test]
    fn imprint_mismatch_fails_before_any_crypto() {
        let signer = b"the real signer".to_vec();
        let token = fake_token(&signer);
        let chain = CertificateChain::new(vec![signer]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::open(dir.path()).unwrap();
        let crls = CrlBundle::default();

        let wrong = vec![0xBB; 32];
        match verify_token_at(&token, &wrong, &chain, &store, &crls, Utc::now()) {
            Err(TimestampError::Token(TokenError::DigestMismatch { .. })) => {}
            other => panic!("expected DigestMismatch, got {:?}", other),
        }
    }
}

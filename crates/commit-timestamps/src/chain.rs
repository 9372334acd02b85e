//! Chain building: from a token's signer id to a self-signed root.
//!
//! Commit tokens are requested without certificates to keep commits
//! small, so the builder asks the same TSA for throwaway tokens *with*
//! certificates and mines those, extending through trust anchors and AIA
//! fetches when the TSA ships a partial set.

use x509_parser::prelude::X509Certificate;

use crate::error::{ChainError, TimestampError};
use crate::fetcher::{request_token, HttpClient};
use crate::parser::certificate::{
    ca_issuers_uri, decode_certificates, is_issuer_of, is_self_signed, parse_der_certificate,
    subject_str, verify_signed_by,
};
use crate::parser::rfc3161::TimestampToken;
use crate::truststore::TrustStore;
use crate::types::chain::CertificateChain;

/// TSAs rotate signing keys; bound the hunt for a set containing ours
pub const MAX_SIGNER_HUNT: u32 = 10;
/// Sanity bound; real TSA chains are three or four certificates
const MAX_CHAIN_LEN: usize = 10;

/// Assemble the chain for `token`'s signer, without judging trust.
///
/// The `trust_store` only contributes candidate issuers here; whether the
/// resulting root is trusted is `build_chain`'s concern (the installer
/// deliberately assembles chains for roots it does not trust yet).
pub fn assemble_chain(
    http: &HttpClient,
    tsa_url: &str,
    token: &TimestampToken,
    trust_store: &TrustStore,
) -> Result<CertificateChain, TimestampError> {
    let imprint = &token.tst_info.message_imprint;

    // Prefer certificates already embedded in this token
    let mut pool = token.certificates.clone();
    let mut signer = pool.iter().find(|c| token.signer_id.matches(c)).cloned();

    let mut attempts = 0;
    while signer.is_none() && attempts < MAX_SIGNER_HUNT {
        attempts += 1;
        let dummy = request_token(http, tsa_url, &imprint.digest, imprint.algorithm, true)?;
        signer = dummy
            .certificates
            .iter()
            .find(|c| token.signer_id.matches(c))
            .cloned();
        pool = dummy.certificates;
    }
    let signer = signer.ok_or(ChainError::SignerCertNotFound {
        attempts: MAX_SIGNER_HUNT,
    })?;

    let mut chain: Vec<Vec<u8>> = vec![signer];
    loop {
        if chain.len() > MAX_CHAIN_LEN {
            let top = parse_der_certificate(chain.last().expect("chain is non-empty"))?;
            return Err(ChainError::Incomplete(format!(
                "issuer loop while extending past {}",
                subject_str(&top)
            ))
            .into());
        }

        let top_der = chain.last().expect("chain is non-empty").clone();
        let top = parse_der_certificate(&top_der)?;
        if is_self_signed(&top) {
            break;
        }

        if let Some(issuer) = find_verified_issuer(&pool, &top, &top_der) {
            chain.push(issuer);
            continue;
        }
        if let Some(anchor) = trust_store.find_issuer_of(&top) {
            if verify_signed_by(&top, &parse_der_certificate(&anchor)?).is_ok() {
                chain.push(anchor);
                // Anchors are self-signed; the next round terminates
                continue;
            }
        }

        match ca_issuers_uri(&top) {
            Some(uri) => {
                let body = http.get(&uri)?;
                let candidates = decode_certificates(&body)?;
                match find_verified_issuer(&candidates, &top, &top_der) {
                    Some(issuer) => chain.push(issuer),
                    None => {
                        return Err(ChainError::Incomplete(format!(
                            "{} does not provide an issuer for {}",
                            uri,
                            subject_str(&top)
                        ))
                        .into())
                    }
                }
            }
            None => {
                return Err(ChainError::Incomplete(format!(
                    "no CA Issuers URI on {}",
                    subject_str(&top)
                ))
                .into())
            }
        }
    }

    Ok(CertificateChain::new(chain)?)
}

/// Assemble and require the root to be a trust anchor
pub fn build_chain(
    http: &HttpClient,
    tsa_url: &str,
    token: &TimestampToken,
    trust_store: &TrustStore,
) -> Result<CertificateChain, TimestampError> {
    let chain = assemble_chain(http, tsa_url, token, trust_store)?;
    if !trust_store.contains(chain.root()) {
        let root = parse_der_certificate(chain.root())?;
        return Err(ChainError::UntrustedRoot(subject_str(&root)).into());
    }
    Ok(chain)
}

fn find_verified_issuer(
    pool: &[Vec<u8>],
    top: &X509Certificate,
    top_der: &[u8],
) -> Option<Vec<u8>> {
    for candidate_der in pool {
        if candidate_der.as_slice() == top_der {
            continue;
        }
        let candidate = match parse_der_certificate(candidate_der) {
            Ok(cert) => cert,
            Err(_) => continue,
        };
        if is_issuer_of(top, &candidate) && verify_signed_by(top, &candidate).is_ok() {
            return Some(candidate_der.clone());
        }
    }
    None
}

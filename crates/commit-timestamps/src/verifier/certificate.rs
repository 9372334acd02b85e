//! Chain and revocation validation, always relative to an explicit point
//! in time. Tokens are judged at the moment they claim to exist, never
//! implicitly "now".

use ::asn1_rs::{FromDer, Oid, Sequence};
use chrono::{DateTime, Utc};
use x509_parser::prelude::*;

use crate::error::{ChainError, CrlError, TimestampError};
use crate::parser::certificate::{
    is_self_signed, parse_der_certificate, subject_str, verify_signed_by,
};
use crate::parser::crl::{CrlBundle, RevocationStatus};
use crate::truststore::TrustStore;
use crate::types::chain::CertificateChain;

/// id-kp-timeStamping
const OID_EKU_TIME_STAMPING: &str = "1.3.6.1.5.5.7.3.8";

/// How revocations are judged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationPolicy {
    /// Any revocation effective at the reference time invalidates the chain
    Strict,
    /// RFC 3161 §4: some revocation reasons leave issued tokens intact
    AllowBenign,
}

/// Verify the full chain structure at `at`: every link signed by its
/// successor, every certificate inside its validity window, the root
/// self-signed and bitwise-present in the trust store.
pub fn verify_chain_at(
    chain: &CertificateChain,
    trust_store: &TrustStore,
    at: DateTime<Utc>,
) -> Result<(), ChainError> {
    let certs = chain.certs();
    for (index, der) in certs.iter().enumerate() {
        let cert = parse_der_certificate(der)?;

        let validity = cert.validity();
        let t = at.timestamp();
        if t < validity.not_before.timestamp() || t > validity.not_after.timestamp() {
            return Err(ChainError::Expired {
                subject: subject_str(&cert),
                at,
            });
        }

        match certs.get(index + 1) {
            Some(issuer_der) => {
                let issuer = parse_der_certificate(issuer_der)?;
                verify_signed_by(&cert, &issuer)?;
            }
            None => {
                if !is_self_signed(&cert) {
                    return Err(ChainError::Incomplete(subject_str(&cert)));
                }
                verify_signed_by(&cert, &cert)?;
            }
        }
    }

    if !trust_store.contains(chain.root()) {
        let root = parse_der_certificate(chain.root())?;
        return Err(ChainError::UntrustedRoot(subject_str(&root)));
    }
    Ok(())
}

/// Look up every non-root certificate in the CRL bundle as of `at`.
///
/// Under `Strict` any effective revocation fails; under `AllowBenign`
/// only disallowed reasons (or a revoked entry with no reasonCode) fail.
pub fn check_chain_revocation(
    chain: &CertificateChain,
    crls: &CrlBundle,
    at: DateTime<Utc>,
    policy: RevocationPolicy,
) -> Result<(), TimestampError> {
    for der in chain.non_root() {
        let cert = parse_der_certificate(der)?;
        let status = crls.status_of(&cert, at).map_err(|e| match e {
            CrlError::NotCovered { issuer } => {
                TimestampError::LtvMissing(format!("no CRL for certificates issued by {}", issuer))
            }
            other => other.into(),
        })?;
        if let RevocationStatus::Revoked { reason_text, .. } = &status {
            if policy == RevocationPolicy::AllowBenign && status.is_benign() {
                continue;
            }
            return Err(ChainError::Revoked {
                subject: subject_str(&cert),
                reason: reason_text.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// Per RFC 3161 §2.3 the signer certificate must carry a critical
/// Extended Key Usage containing exactly id-kp-timeStamping.
pub fn verify_timestamping_eku(cert: &X509Certificate) -> Result<(), ChainError> {
    let eku_ext = cert
        .extensions()
        .iter()
        .find(|ext| ext.oid == x509_parser::oid_registry::OID_X509_EXT_EXTENDED_KEY_USAGE)
        .ok_or_else(|| {
            ChainError::BadTimestampingEku("missing Extended Key Usage extension".to_string())
        })?;

    if !eku_ext.critical {
        return Err(ChainError::BadTimestampingEku(
            "Extended Key Usage extension is not critical".to_string(),
        ));
    }

    // Walk the raw OID list: exactly one purpose, and it is timeStamping
    let (_, oid_seq) = Sequence::from_der(eku_ext.value)
        .map_err(|e| ChainError::BadTimestampingEku(format!("failed to parse EKU: {}", e)))?;
    let mut oids = Vec::new();
    let mut remaining = oid_seq.content.as_ref();
    while !remaining.is_empty() {
        let (rem, oid) = Oid::from_der(remaining)
            .map_err(|e| ChainError::BadTimestampingEku(format!("failed to parse OID: {}", e)))?;
        oids.push(oid.to_id_string());
        remaining = rem;
    }

    if !oids.iter().any(|oid| oid == OID_EKU_TIME_STAMPING) {
        return Err(ChainError::BadTimestampingEku(format!(
            "EKU does not include timeStamping ({})",
            OID_EKU_TIME_STAMPING
        )));
    }
    if oids.len() > 1 {
        return Err(ChainError::BadTimestampingEku(
            "EKU must contain only timeStamping".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::certificate::parse_pem_certificates;

    // Self-signed P-256 CA, CN=Window Test CA, valid 2026-2030, no EKU
    const SELF_SIGNED_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBrDCCAVGgAwIBAgIUX12ZK4lBMW/45o+hwMgE8fq0ybowCgYIKoZIzj0EAwIw\nKzEXMBUGA1UEAwwOV2luZG93IFRlc3QgQ0ExEDAOBgNVBAcMB05vd2hlcmUwHhcN\nMjYwODAxMDk0OTE5WhcNMzAwODAxMDk0OTE5WjArMRcwFQYDVQQDDA5XaW5kb3cg\nVGVzdCBDQTEQMA4GA1UEBwwHTm93aGVyZTBZMBMGByqGSM49AgEGCCqGSM49AwEH\nA0IABCOlfdJK/GJ1tL9ytAbhQYql3ZXEHKRkyGXF4H9FFXzfBTx7r775xHbWCdOx\nUvSRu9+pIdvJ0P/ACxltBfPz8bWjUzBRMB0GA1UdDgQWBBQpM8H5FdOrtB/bF+pi\ntTMV7MARtDAfBgNVHSMEGDAWgBQpM8H5FdOrtB/bF+pitTMV7MARtDAPBgNVHRMB\nAf8EBTADAQH/MAoGCCqGSM49BAMCA0kAMEYCIQCwlltHEL37UDhcyLiFvQF63Y7V\nwEIthTrdO8wcpYH1XQIhALlS4vTy/x0IfXfgQy/QrKZ9zVW4bMG+XlsVb4Sz2LcH\n-----END CERTIFICATE-----";

    #[test]
    fn validity_window_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::open(dir.path()).unwrap();
        let certs = parse_pem_certificates(SELF_SIGNED_PEM.as_bytes()).unwrap();
        let chain = CertificateChain::new(certs).unwrap();

        // Way before notBefore
        let at = chrono::TimeZone::with_ymd_and_hms(&Utc, 1999, 1, 1, 0, 0, 0).unwrap();
        match verify_chain_at(&chain, &store, at) {
            Err(ChainError::Expired { .. }) => {}
            other => panic!("expected Expired, got {:?}", other),
        }
    }

    #[test]
    fn plain_ca_cert_fails_timestamping_eku() {
        let certs = parse_pem_certificates(SELF_SIGNED_PEM.as_bytes()).unwrap();
        let cert = parse_der_certificate(&certs[0]).unwrap();
        assert!(matches!(
            verify_timestamping_eku(&cert),
            Err(ChainError::BadTimestampingEku(_))
        ));
    }
}

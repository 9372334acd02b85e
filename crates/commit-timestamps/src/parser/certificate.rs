use x509_parser::prelude::*;

use crate::crypto::hash::subject_name_hash;
use crate::crypto::signature::{digest_for_signature_oid, PublicKey};
use crate::error::ChainError;

/// Access method OID for AIA "CA Issuers" (1.3.6.1.5.5.7.48.2)
const OID_AD_CA_ISSUERS: &str = "1.3.6.1.5.5.7.48.2";

pub fn parse_der_certificate(der: &[u8]) -> Result<X509Certificate, ChainError> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|e| ChainError::Parse(e.to_string()))?;
    Ok(cert)
}

/// Extract the DER contents of every CERTIFICATE block in a PEM bundle.
///
/// Non-PEM preamble text (the `subject=` / `issuer=` lines this tool writes
/// in front of each block) is skipped.
pub fn parse_pem_certificates(text: &[u8]) -> Result<Vec<Vec<u8>>, ChainError> {
    let blocks = ::pem::parse_many(text).map_err(|e| ChainError::Parse(e.to_string()))?;
    let certs: Vec<Vec<u8>> = blocks
        .into_iter()
        .filter(|b| b.tag() == "CERTIFICATE")
        .map(|b| b.into_contents())
        .collect();
    if certs.is_empty() {
        return Err(ChainError::Parse("no CERTIFICATE blocks found".to_string()));
    }
    Ok(certs)
}

/// Decode an HTTP body that is either PEM or a single DER certificate
/// (AIA endpoints serve both; accept whichever parses).
pub fn decode_certificates(body: &[u8]) -> Result<Vec<Vec<u8>>, ChainError> {
    if body.windows(10).any(|w| w == b"-----BEGIN") {
        return parse_pem_certificates(body);
    }
    parse_der_certificate(body)?;
    Ok(vec![body.to_vec()])
}

pub fn subject_str(cert: &X509Certificate) -> String {
    cert.subject().to_string()
}

pub fn issuer_str(cert: &X509Certificate) -> String {
    cert.issuer().to_string()
}

pub fn is_self_signed(cert: &X509Certificate) -> bool {
    cert.subject().as_raw() == cert.issuer().as_raw()
}

/// True when `candidate` carries the subject name `cert` names as issuer
pub fn is_issuer_of(cert: &X509Certificate, candidate: &X509Certificate) -> bool {
    candidate.subject().as_raw() == cert.issuer().as_raw()
}

/// Verify that `issuer` signed `cert`
pub fn verify_signed_by(
    cert: &X509Certificate,
    issuer: &X509Certificate,
) -> Result<(), ChainError> {
    let public_key = PublicKey::from_certificate(issuer).map_err(|e| {
        ChainError::SignatureInvalid {
            subject: format!("{} ({})", subject_str(cert), e),
        }
    })?;
    let digest = digest_for_signature_oid(&cert.signature_algorithm.algorithm.to_id_string())
        .map_err(|e| ChainError::SignatureInvalid {
            subject: format!("{} ({})", subject_str(cert), e),
        })?;

    public_key
        .verify(
            cert.tbs_certificate.as_ref(),
            &cert.signature_value.data,
            digest,
        )
        .map_err(|_| ChainError::SignatureInvalid {
            subject: subject_str(cert),
        })
}

/// First AIA "CA Issuers" URI, if the certificate carries one
pub fn ca_issuers_uri(cert: &X509Certificate) -> Option<String> {
    for ext in cert.extensions() {
        if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
            for desc in &aia.accessdescs {
                if desc.access_method.to_id_string() == OID_AD_CA_ISSUERS {
                    if let GeneralName::URI(uri) = &desc.access_location {
                        return Some((*uri).to_string());
                    }
                }
            }
        }
    }
    None
}

/// First CRL distribution point URI, if the certificate carries one
pub fn crl_distribution_uri(cert: &X509Certificate) -> Option<String> {
    for ext in cert.extensions() {
        if let ParsedExtension::CRLDistributionPoints(dps) = ext.parsed_extension() {
            for point in &dps.points {
                if let Some(DistributionPointName::FullName(names)) = &point.distribution_point {
                    for name in names {
                        if let GeneralName::URI(uri) = name {
                            return Some((*uri).to_string());
                        }
                    }
                }
            }
        }
    }
    None
}

/// Trust-store filename stem for this certificate's subject
pub fn trust_store_key(der: &[u8]) -> Result<String, ChainError> {
    let cert = parse_der_certificate(der)?;
    Ok(subject_name_hash(cert.subject().as_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Self-signed P-256 CA, CN=Parser Test CA, valid 2026-2030
    const SELF_SIGNED_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBrjCCAVOgAwIBAgIUYYWb+Uf3Yb7EyuIfc5f4n3o1ddYwCgYIKoZIzj0EAwIw\nLDEXMBUGA1UEAwwOUGFyc2VyIFRlc3QgQ0ExETAPBgNVBAoMCEZpeHR1cmVzMB4X\nDTI2MDgwMTA5NDkxOVoXDTMwMDgwMTA5NDkxOVowLDEXMBUGA1UEAwwOUGFyc2Vy\nIFRlc3QgQ0ExETAPBgNVBAoMCEZpeHR1cmVzMFkwEwYHKoZIzj0CAQYIKoZIzj0D\nAQcDQgAErQ8mMvcSG/+iIHWIRLcEVd5dPVNgK1osQGFYqBOE0VDXXlyux9UKW9/c\nri8xYvJXQd7PJrUUHkq7OuFElPZxpqNTMFEwHQYDVR0OBBYEFC6qWOIjYrXFSaLI\nWoVsIqcZeaC2MB8GA1UdIwQYMBaAFC6qWOIjYrXFSaLIWoVsIqcZeaC2MA8GA1Ud\nEwEB/wQFMAMBAf8wCgYIKoZIzj0EAwIDSQAwRgIhALJ/t4i0bYtKhl8v0mtJoavN\nUlagwLrB0KVHhCJNL0c0AiEAhESZJRBJq3IRcG85U86Hyx4oocvpdroD1MB2mj+H\nrpw=\n-----END CERTIFICATE-----";

    #[test]
    fn parse_pem_bundle_skips_preamble() {
        let bundle = format!(
            "subject=CN=Parser Test CA, O=Fixtures\nissuer=CN=Parser Test CA, O=Fixtures\n{}\n",
            SELF_SIGNED_PEM
        );
        let certs = parse_pem_certificates(bundle.as_bytes()).unwrap();
        assert_eq!(certs.len(), 1);
    }

    #[test]
    fn self_signed_detection() {
        let certs = parse_pem_certificates(SELF_SIGNED_PEM.as_bytes()).unwrap();
        let cert = parse_der_certificate(&certs[0]).unwrap();
        assert!(is_self_signed(&cert));
        assert!(is_issuer_of(&cert, &cert));
    }

    #[test]
    fn decode_auto_detects_der() {
        let certs = parse_pem_certificates(SELF_SIGNED_PEM.as_bytes()).unwrap();
        let redetected = decode_certificates(&certs[0]).unwrap();
        assert_eq!(redetected, certs);
    }
}

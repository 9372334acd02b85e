//! CRL acquisition for every revocable certificate in a chain.

use x509_parser::prelude::FromDer;
use x509_parser::revocation_list::CertificateRevocationList;

use crate::error::{CrlError, TimestampError};
use crate::fetcher::HttpClient;
use crate::parser::certificate::{crl_distribution_uri, parse_der_certificate, subject_str};
use crate::parser::crl::CrlBundle;
use crate::types::chain::CertificateChain;

/// Download a CRL for each non-root certificate in chain order.
///
/// A certificate without a distribution point, an unreachable endpoint,
/// or an unparseable body all surface as `CrlFetchFailed`; whether that
/// is fatal depends on the caller (mandatory acquisition vs. ancestor
/// resealing).
pub fn download_crls(
    http: &HttpClient,
    chain: &CertificateChain,
) -> Result<CrlBundle, TimestampError> {
    let mut ders: Vec<Vec<u8>> = Vec::new();
    for cert_der in chain.non_root() {
        let cert = parse_der_certificate(cert_der)?;
        let uri = crl_distribution_uri(&cert).ok_or_else(|| CrlError::FetchFailed(format!(
            "no CRL distribution point in {}",
            subject_str(&cert)
        )))?;
        let body = http
            .get(&uri)
            .map_err(|e| CrlError::FetchFailed(format!("{}: {}", uri, e)))?;
        ders.extend(decode_crls(&body).map_err(|e| CrlError::FetchFailed(format!(
            "{}: {}",
            uri, e
        )))?);
    }
    Ok(CrlBundle::new(ders))
}

/// Accept a PEM bundle or a single DER CRL, normalizing to DER
fn decode_crls(body: &[u8]) -> Result<Vec<Vec<u8>>, CrlError> {
    if body.windows(10).any(|w| w == b"-----BEGIN") {
        let bundle = CrlBundle::from_pem(body)?;
        return Ok(bundle.ders().to_vec());
    }
    CertificateRevocationList::from_der(body).map_err(|e| CrlError::Parse(e.to_string()))?;
    Ok(vec![body.to_vec()])
}

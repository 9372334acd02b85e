use crate::error::ChainError;
use crate::parser::certificate::{
    issuer_str, parse_der_certificate, parse_pem_certificates, subject_str,
};

/// An ordered certificate chain: signer first, self-signed root last.
///
/// This is the unit stored in `certs/<iid>.cer` and handed to every
/// verification step; constructors only guarantee non-emptiness, link
/// verification is the verifier's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    certs: Vec<Vec<u8>>,
}

impl CertificateChain {
    pub fn new(certs: Vec<Vec<u8>>) -> Result<Self, ChainError> {
        if certs.is_empty() {
            return Err(ChainError::Parse("empty certificate chain".to_string()));
        }
        Ok(CertificateChain { certs })
    }

    /// The TSA signing certificate
    pub fn signer(&self) -> &[u8] {
        &self.certs[0]
    }

    /// The self-signed root
    pub fn root(&self) -> &[u8] {
        self.certs.last().expect("chain is never empty")
    }

    /// Every certificate that needs CRL coverage, in chain order
    pub fn non_root(&self) -> &[Vec<u8>] {
        &self.certs[..self.certs.len() - 1]
    }

    pub fn certs(&self) -> &[Vec<u8>] {
        &self.certs
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Serialize for `certs/<iid>.cer`: a human-readable `subject=` /
    /// `issuer=` preamble before each PEM block, signer … root order.
    pub fn to_pem_bundle(&self) -> Result<String, ChainError> {
        let mut out = String::new();
        for der in &self.certs {
            let cert = parse_der_certificate(der)?;
            out.push_str(&format!("subject={}\n", subject_str(&cert)));
            out.push_str(&format!("issuer={}\n", issuer_str(&cert)));
            out.push_str(&::pem::encode(&::pem::Pem::new(
                "CERTIFICATE".to_string(),
                der.clone(),
            )));
        }
        Ok(out)
    }

    pub fn from_pem_bundle(text: &[u8]) -> Result<Self, ChainError> {
        CertificateChain::new(parse_pem_certificates(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Self-signed P-256 CA, CN=Chain Bundle CA, valid 2026-2030
    const SELF_SIGNED_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIByDCCAW+gAwIBAgIURMrDGyMFFpBxaEjuNaehnzZxzXAwCgYIKoZIzj0EAwIw\nOjEYMBYGA1UEAwwPQ2hhaW4gQnVuZGxlIENBMREwDwYDVQQKDAhGaXh0dXJlczEL\nMAkGA1UEBhMCREUwHhcNMjYwODAxMDk0OTE5WhcNMzAwODAxMDk0OTE5WjA6MRgw\nFgYDVQQDDA9DaGFpbiBCdW5kbGUgQ0ExETAPBgNVBAoMCEZpeHR1cmVzMQswCQYD\nVQQGEwJERTBZMBMGByqGSM49AgEGCCqGSM49AwEHA0IABHq8ksVPUHfUtWnEsfw8\ncQycsLXFLTuYYiwBR7xgPKiASmBRLF1C0LaIKgsWRkB5Okm1UYXnlTKzOB8P7skd\ng4ajUzBRMB0GA1UdDgQWBBQkkgV9iOLtmXPpBcBotBttDMe2jjAfBgNVHSMEGDAW\ngBQkkgV9iOLtmXPpBcBotBttDMe2jjAPBgNVHRMBAf8EBTADAQH/MAoGCCqGSM49\nBAMCA0cAMEQCIAmrkJcYNIMlnniVWVDnRXfFUeEsfqTLgtaZwnyvxPQOAiAkaluR\npbJmh/idaIHkzw3ojLn+5Smrtj3+7jDSErJm0A==\n-----END CERTIFICATE-----";

    #[test]
    fn rejects_empty_chain() {
        assert!(CertificateChain::new(Vec::new()).is_err());
    }

    #[test]
    fn pem_bundle_round_trip() {
        let certs = parse_pem_certificates(SELF_SIGNED_PEM.as_bytes()).unwrap();
        let chain = CertificateChain::new(certs).unwrap();
        let bundle = chain.to_pem_bundle().unwrap();
        assert!(bundle.starts_with("subject="));
        assert!(bundle.contains("issuer="));

        let reparsed = CertificateChain::from_pem_bundle(bundle.as_bytes()).unwrap();
        assert_eq!(reparsed, chain);
        assert_eq!(reparsed.signer(), reparsed.root());
        assert!(reparsed.non_root().is_empty());
    }
}

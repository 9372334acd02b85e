use chrono::{DateTime, Utc};
use x509_parser::prelude::*;
use x509_parser::revocation_list::CertificateRevocationList;

use crate::error::CrlError;

/// Revocation reasons RFC 3161 §4 treats as harmless for an already-issued
/// token: unspecified, affiliationChanged, superseded, cessationOfOperation.
const BENIGN_REASONS: [u8; 4] = [0, 3, 4, 5];

/// Outcome of looking a certificate up in a CRL bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationStatus {
    Clear,
    Revoked {
        /// reasonCode CRL entry extension value, absent when the entry has none
        reason: Option<u8>,
        reason_text: String,
    },
}

impl RevocationStatus {
    /// True for revocations that do not invalidate previously issued tokens
    pub fn is_benign(&self) -> bool {
        match self {
            RevocationStatus::Clear => true,
            RevocationStatus::Revoked { reason, .. } => {
                matches!(reason, Some(code) if BENIGN_REASONS.contains(code))
            }
        }
    }
}

/// A set of DER-encoded CRLs, as stored in one `crls/<iid>.crl` file
#[derive(Debug, Clone, Default)]
pub struct CrlBundle {
    crls: Vec<Vec<u8>>,
}

impl CrlBundle {
    pub fn new(crls: Vec<Vec<u8>>) -> Self {
        CrlBundle { crls }
    }

    /// Parse a concatenation of PEM CRL blocks
    pub fn from_pem(text: &[u8]) -> Result<Self, CrlError> {
        let blocks = ::pem::parse_many(text).map_err(|e| CrlError::Parse(e.to_string()))?;
        let crls: Vec<Vec<u8>> = blocks
            .into_iter()
            .filter(|b| b.tag() == "X509 CRL" || b.tag() == "CRL")
            .map(|b| b.into_contents())
            .collect();
        if crls.is_empty() {
            return Err(CrlError::Parse("no CRL blocks found".to_string()));
        }
        // Every block must at least parse
        for der in &crls {
            CertificateRevocationList::from_der(der)
                .map_err(|e| CrlError::Parse(e.to_string()))?;
        }
        Ok(CrlBundle { crls })
    }

    pub fn to_pem(&self) -> String {
        self.crls
            .iter()
            .map(|der| ::pem::encode(&::pem::Pem::new("X509 CRL".to_string(), der.clone())))
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn is_empty(&self) -> bool {
        self.crls.is_empty()
    }

    pub fn ders(&self) -> &[Vec<u8>] {
        &self.crls
    }

    pub fn len(&self) -> usize {
        self.crls.len()
    }

    /// Earliest `thisUpdate` across the bundle, used by sealing freshness tests
    pub fn oldest_this_update(&self) -> Option<i64> {
        self.crls
            .iter()
            .filter_map(|der| {
                CertificateRevocationList::from_der(der)
                    .ok()
                    .map(|(_, crl)| crl.last_update().timestamp())
            })
            .min()
    }

    /// Look `cert` up in the CRLs issued by its issuer, as of `at`.
    ///
    /// A revocation entry dated after `at` does not count: the certificate
    /// was still good when the artifact under scrutiny came into existence.
    /// `CrlError::NotCovered` means no CRL in the bundle speaks for the
    /// certificate's issuer at all.
    pub fn status_of(
        &self,
        cert: &X509Certificate,
        at: DateTime<Utc>,
    ) -> Result<RevocationStatus, CrlError> {
        let mut covered = false;
        for der in &self.crls {
            let (_, crl) = CertificateRevocationList::from_der(der)
                .map_err(|e| CrlError::Parse(e.to_string()))?;
            if crl.issuer().as_raw() != cert.issuer().as_raw() {
                continue;
            }
            // An expired CRL no longer vouches for the certificate
            if let Some(next) = crl.next_update() {
                if next.timestamp() < at.timestamp() {
                    continue;
                }
            }
            covered = true;
            for revoked in crl.iter_revoked_certificates() {
                if revoked.raw_serial() != cert.tbs_certificate.raw_serial() {
                    continue;
                }
                if revoked.revocation_date.timestamp() > at.timestamp() {
                    continue;
                }
                let reason = revoked.reason_code().map(|(_, code)| code.0);
                let reason_text = reason
                    .map(reason_name)
                    .unwrap_or("no reasonCode")
                    .to_string();
                return Ok(RevocationStatus::Revoked {
                    reason,
                    reason_text,
                });
            }
        }
        if !covered {
            return Err(CrlError::NotCovered {
                issuer: cert.issuer().to_string(),
            });
        }
        Ok(RevocationStatus::Clear)
    }
}

fn reason_name(code: u8) -> &'static str {
    match code {
        0 => "unspecified",
        1 => "keyCompromise",
        2 => "cACompromise",
        3 => "affiliationChanged",
        4 => "superseded",
        5 => "cessationOfOperation",
        6 => "certificateHold",
        8 => "removeFromCRL",
        9 => "privilegeWithdrawn",
        10 => "aACompromise",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_reason_partition() {
        for code in BENIGN_REASONS {
            let status = RevocationStatus::Revoked {
                reason: Some(code),
                reason_text: reason_name(code).to_string(),
            };
            assert!(status.is_benign(), "reason {} should be benign", code);
        }
        for code in [1u8, 2, 6, 9, 10] {
            let status = RevocationStatus::Revoked {
                reason: Some(code),
                reason_text: reason_name(code).to_string(),
            };
            assert!(!status.is_benign(), "reason {} should reject", code);
        }
        // A revoked entry without a reasonCode is never benign
        let status = RevocationStatus::Revoked {
            reason: None,
            reason_text: "no reasonCode".to_string(),
        };
        assert!(!status.is_benign());
    }

    #[test]
    fn empty_pem_is_an_error() {
        assert!(CrlBundle::from_pem(b"not pem at all").is_err());
    }

    #[test]
    fn pem_round_trip_of_raw_der() {
        // Structurally invalid CRLs are rejected at parse
        let bogus = ::pem::encode(&::pem::Pem::new(
            "X509 CRL".to_string(),
            vec![0x30, 0x03, 0x02, 0x01, 0x00],
        ));
        assert!(CrlBundle::from_pem(bogus.as_bytes()).is_err());
    }
}

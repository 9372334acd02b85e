use asn1_rs::{Any, Class, FromDer, Integer, OctetString, Oid, Sequence, Tag};
use chrono::{DateTime, TimeZone, Utc};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use der::{Decode, Encode};

use crate::crypto::hash::{hex_lower, HashAlgorithm};
use crate::error::TokenError;

/// id-signedData
const OID_SIGNED_DATA: &str = "1.2.840.113549.1.7.2";
/// PKCS#9 messageDigest attribute
const OID_ATTR_MESSAGE_DIGEST: &str = "1.2.840.113549.1.9.4";
/// RFC 2634 signingCertificate attribute (ESSCertID, SHA-1)
const OID_ATTR_SIGNING_CERT: &str = "1.2.840.113549.1.9.16.2.12";
/// RFC 5035 signingCertificateV2 attribute (ESSCertIDv2)
const OID_ATTR_SIGNING_CERT_V2: &str = "1.2.840.113549.1.9.16.2.47";

/// Message imprint from TSTInfo
#[derive(Debug, Clone, PartialEq)]
pub struct MessageImprint {
    pub algorithm: HashAlgorithm,
    pub digest: Vec<u8>,
}

/// The fields of TSTInfo this tool acts on
#[derive(Debug, Clone)]
pub struct TstInfo {
    pub policy: String,
    pub serial: Vec<u8>,
    pub gen_time: DateTime<Utc>,
    pub message_imprint: MessageImprint,
    pub nonce: Option<Vec<u8>>,
}

/// ESSCertID / ESSCertIDv2 signing-certificate identifier.
///
/// The hex of `hash` is the issuer id (`iid`) that keys every LTV file.
#[derive(Debug, Clone, PartialEq)]
pub struct SignerId {
    pub algorithm: HashAlgorithm,
    pub hash: Vec<u8>,
}

impl SignerId {
    pub fn issuer_id(&self) -> String {
        hex_lower(&self.hash)
    }

    /// Whether `cert_der` is the certificate this id commits to
    pub fn matches(&self, cert_der: &[u8]) -> bool {
        self.algorithm.hash(cert_der) == self.hash
    }
}

/// Parsed RFC 3161 TimeStampToken with the raw material verification needs
#[derive(Debug, Clone)]
pub struct TimestampToken {
    /// Original ContentInfo DER, exactly as received or stored
    pub der: Vec<u8>,
    pub tst_info: TstInfo,
    /// DER certificates embedded in the SignedData, possibly empty
    pub certificates: Vec<Vec<u8>>,
    pub signer_id: SignerId,
    /// Encapsulated TSTInfo DER (the signed content)
    pub econtent: Vec<u8>,
    /// Complete DER `SET OF` signed attributes, the actual signature input
    pub signed_attrs_der: Vec<u8>,
    /// Value of the messageDigest signed attribute
    pub message_digest_attr: Vec<u8>,
    pub signature: Vec<u8>,
    pub digest_algorithm: HashAlgorithm,
    pub signature_algorithm_oid: String,
}

/// Parse an RFC 3161 timestamp token from DER-encoded bytes.
///
/// Unwraps ContentInfo → SignedData with the `cms` crate, then walks the
/// encapsulated TSTInfo and the ESS signing-certificate attribute manually.
pub fn parse_timestamp_token(der: &[u8]) -> Result<TimestampToken, TokenError> {
    let content_info = ContentInfo::from_der(der)
        .map_err(|e| TokenError::Parse(format!("failed to parse ContentInfo: {}", e)))?;
    if content_info.content_type.to_string() != OID_SIGNED_DATA {
        return Err(TokenError::Parse(format!(
            "not a SignedData content type: {}",
            content_info.content_type
        )));
    }

    let signed_data_bytes = content_info
        .content
        .to_der()
        .map_err(|e| TokenError::Parse(format!("failed to encode SignedData: {}", e)))?;
    let signed_data = SignedData::from_der(&signed_data_bytes)
        .map_err(|e| TokenError::Parse(format!("failed to parse SignedData: {}", e)))?;

    let econtent = signed_data
        .encap_content_info
        .econtent
        .as_ref()
        .ok_or_else(|| TokenError::Parse("no encapsulated content in SignedData".to_string()))?
        .value()
        .to_vec();
    let tst_info = parse_tst_info(&econtent)?;

    let certificates = extract_certificates(&signed_data);

    let signer_info = signed_data
        .signer_infos
        .0
        .iter()
        .next()
        .ok_or_else(|| TokenError::Parse("no SignerInfo in SignedData".to_string()))?;

    let digest_algorithm = HashAlgorithm::from_oid(&signer_info.digest_alg.oid.to_string())?;
    let signature_algorithm_oid = signer_info.signature_algorithm.oid.to_string();
    let signature = signer_info.signature.as_bytes().to_vec();

    let signed_attrs = signer_info
        .signed_attrs
        .as_ref()
        .ok_or(TokenError::MissingSignerId)?;
    let signed_attrs_der = signed_attrs
        .to_der()
        .map_err(|e| TokenError::Parse(format!("failed to encode signed attributes: {}", e)))?;

    let mut message_digest_attr = None;
    let mut signer_id = None;
    for attr in signed_attrs.iter() {
        let oid = attr.oid.to_string();
        let value = match attr.values.iter().next() {
            Some(v) => v,
            None => continue,
        };
        match oid.as_str() {
            OID_ATTR_MESSAGE_DIGEST => {
                message_digest_attr = Some(value.value().to_vec());
            }
            OID_ATTR_SIGNING_CERT | OID_ATTR_SIGNING_CERT_V2 => {
                let value_der = value.to_der().map_err(|e| {
                    TokenError::Parse(format!("failed to encode signing-certificate attr: {}", e))
                })?;
                signer_id = Some(parse_signing_certificate(
                    &value_der,
                    oid == OID_ATTR_SIGNING_CERT_V2,
                )?);
            }
            _ => {}
        }
    }

    let message_digest_attr = message_digest_attr
        .ok_or_else(|| TokenError::Parse("no messageDigest signed attribute".to_string()))?;
    let signer_id = signer_id.ok_or(TokenError::MissingSignerId)?;

    Ok(TimestampToken {
        der: der.to_vec(),
        tst_info,
        certificates,
        signer_id,
        econtent,
        signed_attrs_der,
        message_digest_attr,
        signature,
        digest_algorithm,
        signature_algorithm_oid,
    })
}

/// Parse TSTInfo ASN.1 structure
///
/// TSTInfo ::= SEQUENCE {
///   version INTEGER,
///   policy TSAPolicyId,
///   messageImprint MessageImprint,
///   serialNumber INTEGER,
///   genTime GeneralizedTime,
///   accuracy / ordering / nonce / tsa / extensions OPTIONAL
/// }
fn parse_tst_info(der: &[u8]) -> Result<TstInfo, TokenError> {
    let (_, seq) = Sequence::from_der(der)
        .map_err(|e| TokenError::Parse(format!("failed to parse TSTInfo sequence: {}", e)))?;
    let content = seq.content.as_ref();

    let (rem, _version) = Integer::from_der(content)
        .map_err(|e| TokenError::Parse(format!("failed to parse version: {}", e)))?;

    let (rem, policy) = Oid::from_der(rem)
        .map_err(|e| TokenError::Parse(format!("failed to parse policy: {}", e)))?;

    let (rem, imprint_seq) = Sequence::from_der(rem)
        .map_err(|e| TokenError::Parse(format!("failed to parse messageImprint: {}", e)))?;
    let message_imprint = parse_message_imprint(&imprint_seq)?;

    let (rem, serial_any) = Any::from_der(rem)
        .map_err(|e| TokenError::Parse(format!("failed to parse serialNumber: {}", e)))?;
    if serial_any.tag() != Tag::Integer {
        return Err(TokenError::Parse("serialNumber is not an INTEGER".to_string()));
    }
    let serial = serial_any.as_bytes().to_vec();

    let (rem, gen_any) = Any::from_der(rem)
        .map_err(|e| TokenError::Parse(format!("failed to parse genTime: {}", e)))?;
    if gen_any.tag() != Tag::GeneralizedTime {
        return Err(TokenError::Parse("genTime is not a GeneralizedTime".to_string()));
    }
    let gen_time = parse_generalized_time(gen_any.as_bytes())?;

    // Remaining fields are optional; the nonce is the only one acted on,
    // and it is the only universal INTEGER that can appear here.
    let mut nonce = None;
    let mut rem = rem;
    while !rem.is_empty() {
        let (next, any) = Any::from_der(rem)
            .map_err(|e| TokenError::Parse(format!("failed to parse TSTInfo field: {}", e)))?;
        if any.class() == Class::Universal && any.tag() == Tag::Integer {
            nonce = Some(any.as_bytes().to_vec());
        }
        rem = next;
    }

    Ok(TstInfo {
        policy: policy.to_id_string(),
        serial,
        gen_time,
        message_imprint,
        nonce,
    })
}

fn parse_message_imprint(seq: &Sequence) -> Result<MessageImprint, TokenError> {
    let content = seq.content.as_ref();

    let (rem, alg_seq) = Sequence::from_der(content)
        .map_err(|e| TokenError::Parse(format!("failed to parse hashAlgorithm: {}", e)))?;
    let (_, oid) = Oid::from_der(alg_seq.content.as_ref())
        .map_err(|e| TokenError::Parse(format!("failed to parse hash algorithm OID: {}", e)))?;
    let algorithm = HashAlgorithm::from_oid(&oid.to_id_string())?;

    let (_, digest_octets) = OctetString::from_der(rem)
        .map_err(|e| TokenError::Parse(format!("failed to parse hashedMessage: {}", e)))?;

    Ok(MessageImprint {
        algorithm,
        digest: digest_octets.as_cow().to_vec(),
    })
}

/// Parse GeneralizedTime content octets: YYYYMMDDHHMMSS[.fff]Z
fn parse_generalized_time(ascii: &[u8]) -> Result<DateTime<Utc>, TokenError> {
    let text = std::str::from_utf8(ascii)
        .map_err(|e| TokenError::Parse(format!("genTime is not ASCII: {}", e)))?;
    let trimmed = text.trim_end_matches('Z');
    let (date_time_part, _frac) = match trimmed.find('.') {
        Some(pos) => trimmed.split_at(pos),
        None => (trimmed, ""),
    };
    if date_time_part.len() < 14 {
        return Err(TokenError::Parse(format!(
            "invalid GeneralizedTime: {}",
            text
        )));
    }

    let field = |range: std::ops::Range<usize>| -> Result<u32, TokenError> {
        date_time_part[range]
            .parse()
            .map_err(|e| TokenError::Parse(format!("invalid GeneralizedTime {}: {}", text, e)))
    };
    let year = field(0..4)? as i32;
    let month = field(4..6)?;
    let day = field(6..8)?;
    let hour = field(8..10)?;
    let minute = field(10..12)?;
    let second = field(12..14)?;

    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .ok_or_else(|| TokenError::Parse(format!("invalid date/time values: {}", text)))
}

/// SigningCertificate ::= SEQUENCE { certs SEQUENCE OF ESSCertID, ... }
/// ESSCertID   ::= SEQUENCE { certHash OCTET STRING, issuerSerial OPTIONAL }
/// ESSCertIDv2 ::= SEQUENCE { hashAlgorithm DEFAULT sha256, certHash OCTET STRING, ... }
fn parse_signing_certificate(der: &[u8], v2: bool) -> Result<SignerId, TokenError> {
    let (_, sc) = Sequence::from_der(der)
        .map_err(|e| TokenError::Parse(format!("failed to parse SigningCertificate: {}", e)))?;
    let (_, certs_seq) = Sequence::from_der(sc.content.as_ref())
        .map_err(|e| TokenError::Parse(format!("failed to parse ESSCertID list: {}", e)))?;
    let (_, first) = Sequence::from_der(certs_seq.content.as_ref())
        .map_err(|e| TokenError::Parse(format!("failed to parse ESSCertID: {}", e)))?;
    let content = first.content.as_ref();

    if !v2 {
        let (_, hash) = OctetString::from_der(content)
            .map_err(|e| TokenError::Parse(format!("failed to parse certHash: {}", e)))?;
        return Ok(SignerId {
            algorithm: HashAlgorithm::Sha1,
            hash: hash.as_cow().to_vec(),
        });
    }

    // The AlgorithmIdentifier is DEFAULT sha256 and therefore absent unless
    // the TSA chose something else; disambiguate on the leading tag.
    if content.first() == Some(&0x30) {
        let (rem, alg_seq) = Sequence::from_der(content)
            .map_err(|e| TokenError::Parse(format!("failed to parse id hashAlgorithm: {}", e)))?;
        let (_, oid) = Oid::from_der(alg_seq.content.as_ref())
            .map_err(|e| TokenError::Parse(format!("failed to parse id hash OID: {}", e)))?;
        let algorithm = HashAlgorithm::from_oid(&oid.to_id_string())?;
        let (_, hash) = OctetString::from_der(rem)
            .map_err(|e| TokenError::Parse(format!("failed to parse certHash: {}", e)))?;
        Ok(SignerId {
            algorithm,
            hash: hash.as_cow().to_vec(),
        })
    } else {
        let (_, hash) = OctetString::from_der(content)
            .map_err(|e| TokenError::Parse(format!("failed to parse certHash: {}", e)))?;
        Ok(SignerId {
            algorithm: HashAlgorithm::Sha256,
            hash: hash.as_cow().to_vec(),
        })
    }
}

/// DER certificates embedded in the SignedData, in declaration order
fn extract_certificates(signed_data: &SignedData) -> Vec<Vec<u8>> {
    signed_data
        .certificates
        .as_ref()
        .map(|cert_set| {
            cert_set
                .0
                .iter()
                .filter_map(|choice| match choice {
                    CertificateChoices::Certificate(cert) => cert.to_der().ok(),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// DER INTEGER equality modulo leading sign-padding zeros
pub fn integers_equal(a: &[u8], b: &[u8]) -> bool {
    fn strip(bytes: &[u8]) -> &[u8] {
        let mut s = bytes;
        while s.len() > 1 && s[0] == 0 {
            s = &s[1..];
        }
        s
    }
    strip(a) == strip(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generalized_time_parses() {
        let t = parse_generalized_time(b"20240102030405Z").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());

        let frac = parse_generalized_time(b"20240102030405.123Z").unwrap();
        assert_eq!(frac, t);

        assert!(parse_generalized_time(b"2024").is_err());
        assert!(parse_generalized_time(b"20241402030405Z").is_err());
    }

    #[test]
    fn signer_id_matches_cert_hash() {
        let cert = b"fake certificate der";
        let id = SignerId {
            algorithm: HashAlgorithm::Sha256,
            hash: HashAlgorithm::Sha256.hash(cert),
        };
        assert!(id.matches(cert));
        assert!(!id.matches(b"some other der"));
        assert_eq!(id.issuer_id(), hex_lower(&id.hash));
    }

    #[test]
    fn ess_cert_id_v1_defaults_to_sha1() {
        // SigningCertificate: SEQ { SEQ { SEQ { OCTET STRING 0xAB 0xCD } } }
        let der = [
            0x30, 0x0a, 0x30, 0x08, 0x30, 0x06, 0x04, 0x04, 0xab, 0xcd, 0xef, 0x01,
        ];
        let id = parse_signing_certificate(&der, false).unwrap();
        assert_eq!(id.algorithm, HashAlgorithm::Sha1);
        assert_eq!(id.hash, vec![0xab, 0xcd, 0xef, 0x01]);
    }

    #[test]
    fn ess_cert_id_v2_defaults_to_sha256() {
        let der = [
            0x30, 0x0a, 0x30, 0x08, 0x30, 0x06, 0x04, 0x04, 0xab, 0xcd, 0xef, 0x01,
        ];
        let id = parse_signing_certificate(&der, true).unwrap();
        assert_eq!(id.algorithm, HashAlgorithm::Sha256);
    }

    #[test]
    fn ess_cert_id_v2_explicit_algorithm() {
        // ESSCertIDv2 with explicit AlgorithmIdentifier for SHA-384
        let der = [
            0x30, 0x17, 0x30, 0x15, 0x30, 0x13, // SigningCertificateV2 / certs / ESSCertIDv2
            0x30, 0x0b, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
            0x02, // AlgorithmIdentifier(sha384)
            0x04, 0x04, 0xab, 0xcd, 0xef, 0x01, // certHash
        ];
        let id = parse_signing_certificate(&der, true).unwrap();
        assert_eq!(id.algorithm, HashAlgorithm::Sha384);
    }

    #[test]
    fn integer_comparison_ignores_sign_padding() {
        assert!(integers_equal(&[0x00, 0x8f, 0x01], &[0x8f, 0x01]));
        assert!(integers_equal(&[0x01], &[0x01]));
        assert!(!integers_equal(&[0x01], &[0x02]));
        assert!(integers_equal(&[0x00], &[0x00]));
    }

    #[test]
    fn garbage_is_not_a_token() {
        assert!(parse_timestamp_token(b"definitely not der").is_err());
        assert!(parse_timestamp_token(&[0x30, 0x03, 0x02, 0x01, 0x00]).is_err());
    }
}

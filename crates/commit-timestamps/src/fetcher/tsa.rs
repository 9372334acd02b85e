//! RFC 3161 TSA client: build a TimeStampReq, POST it, unwrap the
//! TimeStampResp into a token, and enforce the nonce round trip.

use asn1_rs::{Any, Class, FromDer, Sequence, Tag};
use rand::Rng;

use crate::crypto::hash::HashAlgorithm;
use crate::error::{TimestampError, TokenError};
use crate::fetcher::HttpClient;
use crate::parser::rfc3161::{integers_equal, parse_timestamp_token, TimestampToken};

/// Request a token binding `digest` from the TSA at `tsa_url`.
///
/// `cert_req` asks the TSA to embed its certificate set; normal commits
/// request without certificates to keep tokens small, chain building
/// requests with them.
pub fn request_token(
    http: &HttpClient,
    tsa_url: &str,
    digest: &[u8],
    algorithm: HashAlgorithm,
    cert_req: bool,
) -> Result<TimestampToken, TimestampError> {
    // Fresh 64-bit nonce per request, checked in the reply; the only
    // defense against replay of an earlier response.
    let nonce: u64 = rand::thread_rng().gen();
    let request = build_request(algorithm, digest, nonce, cert_req);

    let body = http.post_timestamp_query(tsa_url, request)?;
    let token_der = parse_response(&body)?;
    let token = parse_timestamp_token(&token_der)?;

    let sent = minimal_integer(nonce);
    match &token.tst_info.nonce {
        Some(got) if integers_equal(got, &sent) => {}
        _ => return Err(TokenError::NonceMismatch.into()),
    }

    Ok(token)
}

/// TimeStampReq ::= SEQUENCE {
///    version        INTEGER { v1(1) },
///    messageImprint MessageImprint,
///    nonce          INTEGER OPTIONAL,
///    certReq        BOOLEAN DEFAULT FALSE }
fn build_request(algorithm: HashAlgorithm, digest: &[u8], nonce: u64, cert_req: bool) -> Vec<u8> {
    let mut content = Vec::new();
    content.extend(der_integer(&[1]));
    content.extend(der_message_imprint(algorithm, digest));
    content.extend(der_integer(&minimal_integer(nonce)));
    // DEFAULT FALSE: encoded only when true
    if cert_req {
        content.extend(der_boolean(true));
    }
    der_tlv(0x30, &content)
}

fn der_message_imprint(algorithm: HashAlgorithm, digest: &[u8]) -> Vec<u8> {
    let mut alg_id = der_tlv(0x06, algorithm.oid_der());
    alg_id.extend_from_slice(&[0x05, 0x00]); // NULL parameters
    let mut content = der_tlv(0x30, &alg_id);
    content.extend(der_tlv(0x04, digest));
    der_tlv(0x30, &content)
}

/// TimeStampResp ::= SEQUENCE { status PKIStatusInfo, timeStampToken OPTIONAL }
///
/// PKIStatus 0 (granted) and 1 (grantedWithMods) carry a token; anything
/// else is a rejection surfaced with its status string when present.
fn parse_response(body: &[u8]) -> Result<Vec<u8>, TokenError> {
    let (_, resp) = Sequence::from_der(body)
        .map_err(|e| TokenError::Parse(format!("failed to parse TimeStampResp: {}", e)))?;
    let content = resp.content.as_ref();

    let (token_part, status_info) = Sequence::from_der(content)
        .map_err(|e| TokenError::Parse(format!("failed to parse PKIStatusInfo: {}", e)))?;

    let (status_rest, status) = u32::from_der(status_info.content.as_ref())
        .map_err(|e| TokenError::Parse(format!("failed to parse PKIStatus: {}", e)))?;

    if status > 1 {
        return Err(TokenError::TsaRejected {
            status,
            detail: status_text(status_rest).unwrap_or_else(|| "no status text".to_string()),
        });
    }

    if token_part.is_empty() {
        return Err(TokenError::Parse(
            "granted response without a TimeStampToken".to_string(),
        ));
    }
    Ok(token_part.to_vec())
}

/// PKIFreeText ::= SEQUENCE OF UTF8String, optional after the status
fn status_text(rest: &[u8]) -> Option<String> {
    let (_, seq) = Sequence::from_der(rest).ok()?;
    let mut texts = Vec::new();
    let mut rem = seq.content.as_ref();
    while !rem.is_empty() {
        let (next, any) = Any::from_der(rem).ok()?;
        if any.class() == Class::Universal && any.tag() == Tag::Utf8String {
            texts.push(String::from_utf8_lossy(any.as_bytes()).into_owned());
        }
        rem = next;
    }
    if texts.is_empty() {
        None
    } else {
        Some(texts.join("; "))
    }
}

/// Minimal unsigned DER INTEGER content for a u64
fn minimal_integer(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(7);
    let mut out = bytes[start..].to_vec();
    if out[0] & 0x80 != 0 {
        out.insert(0, 0x00);
    }
    out
}

// DER assembly helpers for the one structure this tool ever emits

fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len < 0x100 {
        out.push(0x81);
        out.push(len as u8);
    } else {
        out.push(0x82);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    }
    out.extend_from_slice(content);
    out
}

fn der_integer(content: &[u8]) -> Vec<u8> {
    der_tlv(0x02, content)
}

fn der_boolean(value: bool) -> Vec<u8> {
    der_tlv(0x01, &[if value { 0xFF } else { 0x00 }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use asn1_rs::{Integer, OctetString, Oid};

    #[test]
    fn request_structure_parses_back() {
        let digest = HashAlgorithm::Sha256.hash(b"payload");
        let request = build_request(HashAlgorithm::Sha256, &digest, 0xDEADBEEF, true);

        let (rem, seq) = Sequence::from_der(&request).unwrap();
        assert!(rem.is_empty());
        let content = seq.content.as_ref();

        let (rem, version) = Integer::from_der(content).unwrap();
        assert_eq!(version.as_u32().unwrap(), 1);

        let (rem, imprint) = Sequence::from_der(rem).unwrap();
        let (digest_part, alg_seq) = Sequence::from_der(imprint.content.as_ref()).unwrap();
        let (_, oid) = Oid::from_der(alg_seq.content.as_ref()).unwrap();
        assert_eq!(oid.to_id_string(), "2.16.840.1.101.3.4.2.1");
        let (_, hashed) = OctetString::from_der(digest_part).unwrap();
        assert_eq!(hashed.as_cow().as_ref(), digest.as_slice());

        let (rem, nonce) = Integer::from_der(rem).unwrap();
        assert_eq!(nonce.as_u64().unwrap(), 0xDEADBEEF);

        // certReq BOOLEAN TRUE
        assert_eq!(rem, [0x01, 0x01, 0xFF]);
    }

    #[test]
    fn cert_req_false_is_omitted() {
        let digest = vec![0u8; 32];
        let with = build_request(HashAlgorithm::Sha256, &digest, 7, true);
        let without = build_request(HashAlgorithm::Sha256, &digest, 7, false);
        assert_eq!(with.len(), without.len() + 3);
    }

    #[test]
    fn minimal_integer_is_sign_safe() {
        assert_eq!(minimal_integer(0), vec![0x00]);
        assert_eq!(minimal_integer(0x7F), vec![0x7F]);
        assert_eq!(minimal_integer(0x80), vec![0x00, 0x80]);
        assert_eq!(minimal_integer(0x1234), vec![0x12, 0x34]);
    }

    #[test]
    fn rejection_status_is_surfaced() {
        // TimeStampResp { PKIStatusInfo { status: 2 } }
        let body = [0x30, 0x05, 0x30, 0x03, 0x02, 0x01, 0x02];
        match parse_response(&body) {
            Err(TokenError::TsaRejected { status: 2, .. }) => {}
            other => panic!("expected TsaRejected, got {:?}", other),
        }
    }

    #[test]
    fn granted_without_token_is_malformed() {
        let body = [0x30, 0x05, 0x30, 0x03, 0x02, 0x01, 0x00];
        assert!(matches!(
            parse_response(&body),
            Err(TokenError::Parse(_))
        ));
    }

    #[test]
    fn long_form_lengths_encode_correctly() {
        let content = vec![0xAA; 300];
        let tlv = der_tlv(0x04, &content);
        assert_eq!(&tlv[..4], &[0x04, 0x82, 0x01, 0x2C]);
        let (_, parsed) = OctetString::from_der(&tlv).unwrap();
        assert_eq!(parsed.as_cow().len(), 300);
    }
}

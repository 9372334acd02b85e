use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::crypto::hash::{hex_lower, HashAlgorithm};
use crate::error::MessageError;
use crate::parser::rfc3161::TimestampToken;

/// First line of every timestamp commit; the post-commit recursion guard
/// keys on this prefix.
pub const SUBJECT_MARKER: &str = "Trusted Timestamp";

pub const TRAILER_VERSION: &str = "Timestamp-Version:";
pub const TRAILER_HASH_ALGO: &str = "Hash-Algorithm:";
pub const TRAILER_PREIMAGE: &str = "Preimage:";
pub const TRAILER_DIGEST: &str = "Digest:";
pub const TRAILER_TOKEN: &str = "Timestamp:";

pub const TOKEN_PEM_BEGIN: &str = "-----BEGIN RFC3161 TOKEN-----";
pub const TOKEN_PEM_END: &str = "-----END RFC3161 TOKEN-----";

/// Info line carried above every token; ships with each token under the
/// project license and must survive rewrites of the trailer.
pub const TOKEN_NOTICE: &str = "Timestamped by git-timestamps; this notice must be retained.";

/// Version emitted for new timestamp commits
pub const CURRENT_VERSION: u32 = 1;

/// One `Timestamp:` trailer: the TSA URL plus its continuation lines,
/// stored verbatim (unindented) so re-emission is byte-exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTrailer {
    pub tsa_url: String,
    pub body_lines: Vec<String>,
}

impl TokenTrailer {
    /// Build the trailer for a freshly acquired token
    pub fn compose(tsa_url: &str, token: &TimestampToken) -> TokenTrailer {
        let mut body_lines = vec![
            TOKEN_NOTICE.to_string(),
            format!("Serial: {}", hex_lower(&token.tst_info.serial)),
            format!("Time: {}", token.tst_info.gen_time.to_rfc3339()),
            TOKEN_PEM_BEGIN.to_string(),
        ];
        let b64 = BASE64.encode(&token.der);
        for chunk in b64.as_bytes().chunks(64) {
            // chunks of an ASCII string are valid UTF-8
            body_lines.push(String::from_utf8_lossy(chunk).into_owned());
        }
        body_lines.push(TOKEN_PEM_END.to_string());
        TokenTrailer {
            tsa_url: tsa_url.to_string(),
            body_lines,
        }
    }

    /// Decode the PEM-wrapped token bytes, `None` when the trailer carries
    /// no decodable token (such trailers are skipped, not failed)
    pub fn token_der(&self) -> Option<Vec<u8>> {
        let begin = self.body_lines.iter().position(|l| l == TOKEN_PEM_BEGIN)?;
        let end = self.body_lines.iter().position(|l| l == TOKEN_PEM_END)?;
        if end <= begin {
            return None;
        }
        let b64: String = self.body_lines[begin + 1..end].concat();
        BASE64.decode(b64.trim()).ok()
    }
}

/// Parsed timestamp commit message
#[derive(Debug, Clone)]
pub struct TimestampMessage {
    pub version: u32,
    pub algorithm: Option<HashAlgorithm>,
    pub preimage: Option<String>,
    pub digest_hex: Option<String>,
    pub tokens: Vec<TokenTrailer>,
}

/// Recursion guard: does this commit message mark a timestamp commit?
pub fn is_timestamp_subject(message: &str) -> bool {
    message
        .lines()
        .next()
        .map(|line| line.starts_with(SUBJECT_MARKER))
        .unwrap_or(false)
}

/// Parse a timestamp commit message.
///
/// Header trailers may appear in any order before the `Timestamp:`
/// trailers; unknown trailers and their continuation lines are tolerated
/// and ignored. Continuation lines carry exactly one leading space.
pub fn parse_message(message: &str) -> Result<TimestampMessage, MessageError> {
    if !is_timestamp_subject(message) {
        return Err(MessageError::NotTimestamp);
    }

    let mut version = None;
    let mut algorithm = None;
    let mut preimage = None;
    let mut digest_hex = None;
    let mut tokens: Vec<TokenTrailer> = Vec::new();
    // Continuations attach to the current Timestamp: trailer only;
    // everything else is single-line.
    let mut in_token = false;

    for line in message.lines().skip(1) {
        if let Some(continuation) = line.strip_prefix(' ') {
            if in_token {
                if let Some(current) = tokens.last_mut() {
                    current.body_lines.push(continuation.to_string());
                }
            }
            continue;
        }
        in_token = false;
        if line.is_empty() {
            continue;
        }

        if let Some(value) = line.strip_prefix(TRAILER_VERSION) {
            version = Some(value.trim().parse::<u32>().map_err(|e| {
                MessageError::Malformed(format!("bad version trailer: {}", e))
            })?);
        } else if let Some(value) = line.strip_prefix(TRAILER_HASH_ALGO) {
            algorithm = Some(
                HashAlgorithm::from_name(value.trim())
                    .map_err(|e| MessageError::Malformed(e.to_string()))?,
            );
        } else if let Some(value) = line.strip_prefix(TRAILER_PREIMAGE) {
            preimage = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix(TRAILER_DIGEST) {
            digest_hex = Some(value.trim().to_lowercase());
        } else if let Some(value) = line.strip_prefix(TRAILER_TOKEN) {
            tokens.push(TokenTrailer {
                tsa_url: value.trim().to_string(),
                body_lines: Vec::new(),
            });
            in_token = true;
        }
        // Unknown trailer: ignored
    }

    let version = version.unwrap_or(0);
    if version > CURRENT_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }
    if version >= 1 {
        if preimage.is_none() {
            return Err(MessageError::Malformed(
                "version 1 message without a preimage trailer".to_string(),
            ));
        }
        if digest_hex.is_none() {
            return Err(MessageError::Malformed(
                "version 1 message without a digest trailer".to_string(),
            ));
        }
    }
    if tokens.is_empty() {
        return Err(MessageError::Malformed(
            "timestamp message without any Timestamp: trailer".to_string(),
        ));
    }

    Ok(TimestampMessage {
        version,
        algorithm,
        preimage,
        digest_hex,
        tokens,
    })
}

/// Assemble a version-1 timestamp commit message
pub fn compose_message(
    algorithm: HashAlgorithm,
    preimage: &str,
    digest_hex: &str,
    tokens: &[TokenTrailer],
) -> String {
    let mut out = String::new();
    out.push_str(SUBJECT_MARKER);
    out.push_str("\n\n");
    out.push_str(&format!("{} {}\n", TRAILER_VERSION, CURRENT_VERSION));
    out.push_str(&format!("{} {}\n", TRAILER_HASH_ALGO, algorithm.name()));
    out.push_str(&format!("{} {}\n", TRAILER_PREIMAGE, preimage));
    out.push_str(&format!("{} {}\n", TRAILER_DIGEST, digest_hex));
    for token in tokens {
        out.push_str(&format!("{} {}\n", TRAILER_TOKEN, token.tsa_url));
        for line in &token.body_lines {
            out.push(' ');
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trailer() -> TokenTrailer {
        TokenTrailer {
            tsa_url: "https://freetsa.org/tsr".to_string(),
            body_lines: vec![
                TOKEN_NOTICE.to_string(),
                "Serial: 0bad".to_string(),
                TOKEN_PEM_BEGIN.to_string(),
                BASE64.encode(b"pretend token"),
                TOKEN_PEM_END.to_string(),
            ],
        }
    }

    #[test]
    fn subject_guard() {
        assert!(is_timestamp_subject("Trusted Timestamp\n\nbody"));
        assert!(!is_timestamp_subject("fix: everything"));
        assert!(!is_timestamp_subject(""));
    }

    #[test]
    fn round_trip_preserves_tokens_byte_exactly() {
        let trailer = sample_trailer();
        let digest = "ab".repeat(32);
        let preimage = format!("parent:{},tree:{}", "11".repeat(20), "22".repeat(20));
        let message = compose_message(
            HashAlgorithm::Sha256,
            &preimage,
            &digest,
            std::slice::from_ref(&trailer),
        );

        let parsed = parse_message(&message).unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.algorithm, Some(HashAlgorithm::Sha256));
        assert_eq!(parsed.preimage.as_deref(), Some(preimage.as_str()));
        assert_eq!(parsed.digest_hex.as_deref(), Some(digest.as_str()));
        assert_eq!(parsed.tokens, vec![trailer.clone()]);
        assert_eq!(
            parsed.tokens[0].token_der().unwrap(),
            b"pretend token".to_vec()
        );

        let recomposed = compose_message(
            HashAlgorithm::Sha256,
            parsed.preimage.as_deref().unwrap(),
            parsed.digest_hex.as_deref().unwrap(),
            &parsed.tokens,
        );
        assert_eq!(recomposed, message);
    }

    #[test]
    fn unknown_trailers_are_tolerated() {
        let trailer = sample_trailer();
        let mut message = compose_message(
            HashAlgorithm::Sha256,
            "parent:aa,tree:bb",
            "cafe",
            std::slice::from_ref(&trailer),
        );
        message.insert_str(
            message.find(TRAILER_VERSION).unwrap(),
            "Reviewed-by: nobody\n with a continuation\n",
        );
        let parsed = parse_message(&message).unwrap();
        assert_eq!(parsed.tokens.len(), 1);
        assert_eq!(parsed.tokens[0], trailer);
    }

    #[test]
    fn trailer_without_pem_markers_yields_no_token() {
        let trailer = TokenTrailer {
            tsa_url: "https://tsa.example".to_string(),
            body_lines: vec!["just text".to_string()],
        };
        assert_eq!(trailer.token_der(), None);
    }

    #[test]
    fn decoy_base64_still_decodes() {
        // Decoding succeeding while token parsing later fails is the
        // "skipped, not invalid" path for decoy trailers.
        let trailer = TokenTrailer {
            tsa_url: "https://tsa.example".to_string(),
            body_lines: vec![
                TOKEN_PEM_BEGIN.to_string(),
                BASE64.encode(b"not a token"),
                TOKEN_PEM_END.to_string(),
            ],
        };
        assert_eq!(trailer.token_der().unwrap(), b"not a token".to_vec());
    }

    #[test]
    fn version_one_requires_preimage_and_digest() {
        let message = format!(
            "{}\n\n{} 1\n{} https://tsa.example\n {}\n",
            SUBJECT_MARKER, TRAILER_VERSION, TRAILER_TOKEN, TOKEN_NOTICE
        );
        assert!(matches!(
            parse_message(&message),
            Err(MessageError::Malformed(_))
        ));
    }

    #[test]
    fn version_zero_message_parses_without_preimage() {
        let message = format!(
            "{}\n\n{} https://tsa.example\n {}\n",
            SUBJECT_MARKER, TRAILER_TOKEN, TOKEN_PEM_BEGIN
        );
        let parsed = parse_message(&message).unwrap();
        assert_eq!(parsed.version, 0);
        assert!(parsed.preimage.is_none());
    }

    #[test]
    fn future_versions_are_rejected() {
        let message = format!(
            "{}\n\n{} 7\nPreimage: x\nDigest: y\n{} https://tsa.example\n",
            SUBJECT_MARKER, TRAILER_VERSION, TRAILER_TOKEN
        );
        assert!(matches!(
            parse_message(&message),
            Err(MessageError::UnsupportedVersion(7))
        ));
    }
}

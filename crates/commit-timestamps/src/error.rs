use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("certificate chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("CRL error: {0}")]
    Crl(#[from] CrlError),

    #[error("commit message error: {0}")]
    Message(#[from] MessageError),

    #[error("git command failed: {0}")]
    Vcs(String),

    #[error("required LTV artifact missing: {0}")]
    LtvMissing(String),

    #[error("LTV fixed point did not converge after {rounds} token rounds")]
    FixedPointDiverged { rounds: u32 },

    #[error("repository integrity check failed: {0}")]
    RepositoryCorrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("TSA rejected the request: PKIStatus {status} ({detail})")]
    TsaRejected { status: u32, detail: String },

    #[error("response nonce does not match request nonce")]
    NonceMismatch,

    #[error("failed to parse timestamp token: {0}")]
    Parse(String),

    #[error("token signature verification failed")]
    SignatureInvalid,

    #[error("message digest attribute does not match timestamped content")]
    MessageDigestMismatch,

    #[error("token digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("token does not identify its signing certificate")]
    MissingSignerId,

    #[error("signing certificate does not match the token's issuer id")]
    SignerIdMismatch,

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("failed to parse certificate: {0}")]
    Parse(String),

    #[error("cannot complete chain to a self-signed root: {0}")]
    Incomplete(String),

    #[error("chain root is not in the trust store: {0}")]
    UntrustedRoot(String),

    #[error("certificate not valid at {at}: {subject}")]
    Expired { subject: String, at: DateTime<Utc> },

    #[error("certificate signature verification failed: {subject}")]
    SignatureInvalid { subject: String },

    #[error("certificate revoked ({reason}): {subject}")]
    Revoked { subject: String, reason: String },

    #[error("no returned certificate matches the token's issuer id after {attempts} attempts")]
    SignerCertNotFound { attempts: u32 },

    #[error("signer certificate unfit for timestamping: {0}")]
    BadTimestampingEku(String),
}

#[derive(Debug, Error)]
pub enum CrlError {
    #[error("failed to fetch CRL: {0}")]
    FetchFailed(String),

    #[error("failed to parse CRL: {0}")]
    Parse(String),

    #[error("no CRL covers certificates issued by {issuer}")]
    NotCovered { issuer: String },
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("not a timestamp commit message")]
    NotTimestamp,

    #[error("malformed timestamp message: {0}")]
    Malformed(String),

    #[error("unsupported timestamp message version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid signature format: {0}")]
    InvalidFormat(String),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("failed to parse public key: {0}")]
    PublicKeyParse(String),
}

//! RFC 3161 trusted timestamps for git commit ancestry.
//!
//! After every ordinary commit a timestamp commit is appended whose
//! message binds the digest of `parent:<parent>,tree:<tree>` with one
//! token per configured TSA, and whose tree seals certificate chains and
//! CRLs under `.timestampltv/` for long-term validation. Because commits
//! form a Merkle DAG, each new timestamp commit cryptographically seals
//! all prior ones.
//!
//! [`orchestrator::Orchestrator`] implements the post-commit write path;
//! [`walker::Validator`] replays the ancestry and judges every timestamp
//! commit; everything else is the machinery they share.

pub mod chain;
pub mod config;
pub mod crypto;
pub mod digest;
pub mod error;
pub mod fetcher;
pub mod ltv;
pub mod orchestrator;
pub mod parser;
pub mod repo;
pub mod truststore;
pub mod types;
pub mod verifier;
pub mod walker;

pub use config::Config;
pub use error::TimestampError;
pub use orchestrator::{HookOutcome, HookReport, Orchestrator};
pub use repo::Repository;
pub use truststore::TrustStore;
pub use types::verdict::{CommitVerdict, TokenStatus, ValidationReport};
pub use walker::Validator;

//! Post-commit orchestration: ancestor CRL resealing, the LTV fixed-point
//! loop, and finalization of the timestamp commit.
//!
//! Staged LTV material changes the tree, the tree changes the digest, and
//! the digest is what gets timestamped, so tokens are always requested
//! *after* staging and re-requested until the tree digest stabilizes.

use std::collections::HashSet;

use crate::chain::build_chain;
use crate::config::{Config, TsaEndpoint};
use crate::crypto::hash::{hex_lower, HashAlgorithm};
use crate::digest;
use crate::error::TimestampError;
use crate::fetcher::{download_crls, request_token, HttpClient};
use crate::ltv::{cert_repo_path, LtvStore, LTV_DIR};
use crate::parser::message::{compose_message, is_timestamp_subject, parse_message, TokenTrailer};
use crate::parser::rfc3161::{parse_timestamp_token, TimestampToken};
use crate::repo::{CommitInfo, Repository};
use crate::truststore::TrustStore;
use crate::types::chain::CertificateChain;
use crate::verifier::token::verify_token_with_ltv;

/// Fixed-point bound in token-request rounds. One round suffices once LTV
/// for every configured TSA exists; two when a never-seen signer shows up.
pub const MAX_TOKEN_ROUNDS: u32 = 4;

#[derive(Debug)]
pub enum HookOutcome {
    /// HEAD is itself a timestamp commit; the hook must not recurse
    AlreadyTimestamped,
    /// No `timestamping.tsa0.url` configured; ordinary commit untouched
    NotConfigured,
    Committed {
        commit: String,
        digest: String,
        tokens: usize,
    },
}

#[derive(Debug)]
pub struct HookReport {
    pub outcome: HookOutcome,
    pub warnings: Vec<String>,
}

pub struct Orchestrator<'a> {
    repo: &'a Repository,
    ltv: LtvStore,
    trust: TrustStore,
}

impl<'a> Orchestrator<'a> {
    pub fn new(repo: &'a Repository) -> Result<Self, TimestampError> {
        let ltv = LtvStore::new(repo.workdir());
        let trust = TrustStore::open(&repo.trust_store_dir())?;
        Ok(Orchestrator { repo, ltv, trust })
    }

    /// The post-commit hook body. Once past the recursion guard, any
    /// fatal error discards the freshly created inner commit with a soft
    /// rewind, leaving the working copy logically unchanged.
    pub fn run_post_commit(&self) -> Result<HookReport, TimestampError> {
        let head = self.repo.head()?;
        let parent = self.repo.commit_info(&head)?;

        if is_timestamp_subject(&parent.message) {
            return Ok(HookReport {
                outcome: HookOutcome::AlreadyTimestamped,
                warnings: Vec::new(),
            });
        }

        match self.post_commit_inner(&parent) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn post_commit_inner(&self, parent: &CommitInfo) -> Result<HookReport, TimestampError> {
        let config = Config::load(self.repo)?;
        if !config.is_configured() {
            return Ok(HookReport {
                outcome: HookOutcome::NotConfigured,
                warnings: Vec::new(),
            });
        }

        let http = HttpClient::new(config.http_timeout)?;
        let algorithm = self.repo.object_format()?;
        let mut warnings = Vec::new();
        let outcome =
            self.append_timestamp_commit(&config, &http, parent, algorithm, &mut warnings)?;
        Ok(HookReport { outcome, warnings })
    }

    fn append_timestamp_commit(
        &self,
        config: &Config,
        http: &HttpClient,
        parent: &CommitInfo,
        algorithm: HashAlgorithm,
        warnings: &mut Vec<String>,
    ) -> Result<HookOutcome, TimestampError> {
        self.seal_ancestors(http, parent, warnings)?;

        let mut prev_digest: Option<Vec<u8>> = None;
        let mut tokens: Vec<(String, TimestampToken)> = Vec::new();
        let mut rounds = 0u32;

        let (tree, digest_bytes) = loop {
            if self.repo.workdir().join(LTV_DIR).is_dir() {
                self.repo.stage(LTV_DIR)?;
            }
            let tree = self.repo.write_tree()?;
            let d = digest::digest(algorithm, &tree, &parent.id);

            if prev_digest.as_deref() == Some(d.as_slice()) {
                // Validation added no LTV; the tokens in hand bind this tree
                break (tree, d);
            }

            rounds += 1;
            if rounds > MAX_TOKEN_ROUNDS {
                return Err(TimestampError::FixedPointDiverged {
                    rounds: MAX_TOKEN_ROUNDS,
                });
            }

            tokens.clear();
            for tsa in &config.tsas {
                match self.acquire_token(http, tsa, &d, algorithm) {
                    Ok(token) => tokens.push((tsa.url.clone(), token)),
                    Err(e) if tsa.optional => {
                        warnings.push(format!("optional TSA {} failed: {}", tsa.url, e));
                    }
                    Err(e) => return Err(e),
                }
            }
            if tokens.is_empty() {
                return Err(TimestampError::Config(
                    "every configured TSA failed to produce a token".to_string(),
                ));
            }
            prev_digest = Some(d);
        };

        let preimage = digest::preimage(&tree, &parent.id);
        let digest_hex = hex_lower(&digest_bytes);
        let trailers: Vec<TokenTrailer> = tokens
            .iter()
            .map(|(url, token)| TokenTrailer::compose(url, token))
            .collect();
        let message = compose_message(algorithm, &preimage, &digest_hex, &trailers);

        let commit = self.repo.commit(&message)?;
        Ok(HookOutcome::Committed {
            commit,
            digest: digest_hex,
            tokens: tokens.len(),
        })
    }

    fn acquire_token(
        &self,
        http: &HttpClient,
        tsa: &TsaEndpoint,
        digest: &[u8],
        algorithm: HashAlgorithm,
    ) -> Result<TimestampToken, TimestampError> {
        let token = request_token(http, &tsa.url, digest, algorithm, false)?;
        verify_token_with_ltv(http, &self.ltv, &self.trust, &token, digest, &tsa.url)?;
        Ok(token)
    }

    /// Refresh the CRLs of the nearest ancestor timestamp commit on each
    /// branch into the staging LTV area. The new commit's tree will seal
    /// them, extending those timestamps' verifiable lifetime.
    ///
    /// Exactly one refresh per nearest ancestor per branch: the walk
    /// stops descending a branch at the first timestamp commit found.
    fn seal_ancestors(
        &self,
        http: &HttpClient,
        parent: &CommitInfo,
        warnings: &mut Vec<String>,
    ) -> Result<(), TimestampError> {
        let mut stack = parent.parents.clone();
        let mut visited: HashSet<String> = HashSet::new();
        let mut nearest: Vec<CommitInfo> = Vec::new();

        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let info = self.repo.commit_info(&id)?;
            if is_timestamp_subject(&info.message) {
                nearest.push(info);
            } else {
                stack.extend(info.parents.iter().cloned());
            }
        }

        for ts_commit in nearest {
            let parsed = match parse_message(&ts_commit.message) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warnings.push(format!(
                        "cannot parse ancestor timestamp commit {}: {}",
                        short(&ts_commit.id),
                        e
                    ));
                    continue;
                }
            };
            for trailer in &parsed.tokens {
                let der = match trailer.token_der() {
                    Some(der) => der,
                    None => continue,
                };
                let token = match parse_timestamp_token(&der) {
                    Ok(token) => token,
                    Err(_) => continue,
                };
                let iid = token.signer_id.issuer_id();

                let chain =
                    match self.recover_chain(http, &iid, &ts_commit.id, &trailer.tsa_url, &token) {
                        Ok(chain) => chain,
                        Err(e) => {
                            warnings.push(format!(
                                "cannot recover chain {} from ancestor {}: {}",
                                iid,
                                short(&ts_commit.id),
                                e
                            ));
                            continue;
                        }
                    };
                if !self.ltv.has_chain(&iid) {
                    self.ltv.write_chain(&iid, &chain)?;
                }
                match download_crls(http, &chain) {
                    Ok(bundle) => self.ltv.write_crl_bundle(&iid, &bundle.to_pem())?,
                    Err(e) => {
                        warnings.push(format!("CRL refresh for {} failed: {}", iid, e));
                    }
                }
            }
        }
        Ok(())
    }

    /// Live working tree first, then the ancestor commit's own tree,
    /// then a fresh build against the TSA.
    fn recover_chain(
        &self,
        http: &HttpClient,
        iid: &str,
        commit_id: &str,
        tsa_url: &str,
        token: &TimestampToken,
    ) -> Result<CertificateChain, TimestampError> {
        if let Some(chain) = self.ltv.read_chain(iid)? {
            return Ok(chain);
        }
        if let Some(bytes) = self.repo.show_blob(commit_id, &cert_repo_path(iid))? {
            return Ok(CertificateChain::from_pem_bundle(&bytes)?);
        }
        build_chain(http, tsa_url, token, &self.trust)
    }

    fn rollback(&self) {
        let _ = self.repo.soft_rewind();
        self.repo.unstage(LTV_DIR);
    }
}

fn short(id: &str) -> &str {
    &id[..id.len().min(12)]
}

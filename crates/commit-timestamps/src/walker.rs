//! Historical validation: walk the ancestry DAG and judge every
//! timestamp commit by its own evidence.
//!
//! Each token passes three gates: signature and chain at its genTime,
//! certificate state at genTime from the *historic* CRL sealed in that
//! commit's tree, and present-day revocation state from fresh CRLs (or
//! the newest sealed bundle when offline), where RFC 3161's benign
//! revocation reasons are forgiven.

use std::collections::HashSet;

use chrono::Utc;

use crate::chain::build_chain;
use crate::config::Config;
use crate::crypto::hash::HashAlgorithm;
use crate::digest;
use crate::error::TimestampError;
use crate::fetcher::{download_crls, HttpClient};
use crate::ltv::{cert_repo_path, crl_repo_path, LtvStore};
use crate::parser::crl::CrlBundle;
use crate::parser::message::{is_timestamp_subject, parse_message, TimestampMessage, TokenTrailer};
use crate::parser::rfc3161::{parse_timestamp_token, TimestampToken};
use crate::repo::{CommitInfo, Repository};
use crate::truststore::TrustStore;
use crate::types::chain::CertificateChain;
use crate::types::verdict::{CommitVerdict, TokenStatus, TokenVerdict, ValidationReport};
use crate::verifier::certificate::{check_chain_revocation, RevocationPolicy};
use crate::verifier::token::verify_token_at;

pub struct Validator<'a> {
    repo: &'a Repository,
    http: HttpClient,
    trust: TrustStore,
    ltv: LtvStore,
    algorithm: HashAlgorithm,
}

impl<'a> Validator<'a> {
    pub fn new(repo: &'a Repository) -> Result<Self, TimestampError> {
        let config = Config::load(repo)?;
        let http = HttpClient::new(config.http_timeout)?;
        let trust = TrustStore::open(&repo.trust_store_dir())?;
        let ltv = LtvStore::new(repo.workdir());
        let algorithm = repo.object_format()?;
        Ok(Validator {
            repo,
            http,
            trust,
            ltv,
            algorithm,
        })
    }

    /// Walk every ancestor of `start_ref`. The report is OK iff every
    /// timestamp commit reached carries at least one valid token.
    pub fn validate(&self, start_ref: &str) -> Result<ValidationReport, TimestampError> {
        self.repo.fsck()?;
        let start = self.repo.rev_parse(start_ref)?;

        let mut stack = vec![start.clone()];
        let mut visited: HashSet<String> = HashSet::new();
        let mut commits = Vec::new();

        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let info = self.repo.commit_info(&id)?;
            if is_timestamp_subject(&info.message) {
                commits.push(self.validate_timestamp_commit(&info));
            }
            stack.extend(info.parents.iter().cloned());
        }

        let ok = commits.iter().all(|c| c.ok);
        Ok(ValidationReport { start, commits, ok })
    }

    fn validate_timestamp_commit(&self, info: &CommitInfo) -> CommitVerdict {
        let timestamps_commit = info.first_parent().map(str::to_string);

        let parsed = match parse_message(&info.message) {
            Ok(parsed) => parsed,
            Err(e) => return failed_verdict(info, timestamps_commit, e.to_string()),
        };
        let expected = match self.expected_digest(info, &parsed) {
            Ok(digest) => digest,
            Err(e) => return failed_verdict(info, timestamps_commit, e.to_string()),
        };

        let tokens: Vec<TokenVerdict> = parsed
            .tokens
            .iter()
            .map(|trailer| self.check_token(info, trailer, &expected))
            .collect();

        let effective_time = tokens
            .iter()
            .filter(|t| t.status == TokenStatus::Valid)
            .filter_map(|t| t.gen_time)
            .min();
        let ok = tokens.iter().any(|t| t.status == TokenStatus::Valid);

        CommitVerdict {
            commit: info.id.clone(),
            timestamps_commit,
            tokens,
            effective_time,
            ok,
            detail: None,
        }
    }

    /// What the tokens of this commit must have timestamped: the parent
    /// commit id itself for legacy V=0, the bound (tree, parent) digest
    /// for V≥1. Recomputed from the commit, never taken from a trailer.
    fn expected_digest(
        &self,
        info: &CommitInfo,
        parsed: &TimestampMessage,
    ) -> Result<Vec<u8>, TimestampError> {
        let parent = info.first_parent().ok_or_else(|| {
            TimestampError::Vcs(format!("timestamp commit {} has no parent", info.id))
        })?;
        if parsed.version == 0 {
            return hex::decode(parent)
                .map_err(|e| TimestampError::Vcs(format!("unparseable parent id: {}", e)));
        }
        let algorithm = parsed.algorithm.unwrap_or(self.algorithm);
        Ok(digest::digest(algorithm, &info.tree, parent))
    }

    fn check_token(
        &self,
        commit: &CommitInfo,
        trailer: &TokenTrailer,
        expected: &[u8],
    ) -> TokenVerdict {
        let der = match trailer.token_der() {
            Some(der) => der,
            None => {
                return TokenVerdict::skipped(
                    &trailer.tsa_url,
                    "trailer carries no decodable token".to_string(),
                )
            }
        };
        let token = match parse_timestamp_token(&der) {
            Ok(token) => token,
            Err(e) => {
                return TokenVerdict::skipped(
                    &trailer.tsa_url,
                    format!("not a timestamp token: {}", e),
                )
            }
        };
        let iid = token.signer_id.issuer_id();
        let gen_time = token.tst_info.gen_time;

        let chain = match self.resolve_chain(&commit.id, &trailer.tsa_url, &token) {
            Ok(chain) => chain,
            Err(e) => {
                return TokenVerdict::invalid(
                    &trailer.tsa_url,
                    Some(iid),
                    Some(gen_time),
                    e.to_string(),
                )
            }
        };

        // Historic state: the CRLs sealed into this very commit's tree
        let historic = match self.historic_crls(&commit.id, &iid, &chain) {
            Ok(bundle) => bundle,
            Err(e) => {
                return TokenVerdict::invalid(
                    &trailer.tsa_url,
                    Some(iid),
                    Some(gen_time),
                    e.to_string(),
                )
            }
        };
        if let Err(e) = verify_token_at(&token, expected, &chain, &self.trust, &historic, gen_time)
        {
            return TokenVerdict::invalid(&trailer.tsa_url, Some(iid), Some(gen_time), e.to_string());
        }

        // Present-day state: fresh CRLs, else the newest sealed bundle
        let current = match self.current_crls(&iid, &chain) {
            Ok(bundle) => bundle,
            Err(e) => {
                return TokenVerdict::invalid(
                    &trailer.tsa_url,
                    Some(iid),
                    Some(gen_time),
                    e.to_string(),
                )
            }
        };
        if let Err(e) =
            check_chain_revocation(&chain, &current, Utc::now(), RevocationPolicy::AllowBenign)
        {
            return TokenVerdict::invalid(&trailer.tsa_url, Some(iid), Some(gen_time), e.to_string());
        }

        TokenVerdict::valid(&trailer.tsa_url, iid, gen_time)
    }

    fn historic_crls(
        &self,
        commit_id: &str,
        iid: &str,
        chain: &CertificateChain,
    ) -> Result<CrlBundle, TimestampError> {
        if chain.non_root().is_empty() {
            return Ok(CrlBundle::default());
        }
        match self.repo.show_blob(commit_id, &crl_repo_path(iid))? {
            Some(bytes) => Ok(CrlBundle::from_pem(&bytes)?),
            None => Err(TimestampError::LtvMissing(format!(
                "{} absent from commit {}",
                crl_repo_path(iid),
                commit_id
            ))),
        }
    }

    fn current_crls(
        &self,
        iid: &str,
        chain: &CertificateChain,
    ) -> Result<CrlBundle, TimestampError> {
        if chain.non_root().is_empty() {
            return Ok(CrlBundle::default());
        }
        match download_crls(&self.http, chain) {
            Ok(bundle) => Ok(bundle),
            Err(_) => match self.repo.show_blob("HEAD", &crl_repo_path(iid))? {
                Some(bytes) => Ok(CrlBundle::from_pem(&bytes)?),
                None => Err(TimestampError::LtvMissing(format!(
                    "no current CRL reachable and {} absent from HEAD",
                    crl_repo_path(iid)
                ))),
            },
        }
    }

    /// Working-tree LTV first, then this commit's sealed copy, then a
    /// fresh build against the TSA named in the trailer.
    fn resolve_chain(
        &self,
        commit_id: &str,
        tsa_url: &str,
        token: &TimestampToken,
    ) -> Result<CertificateChain, TimestampError> {
        let iid = token.signer_id.issuer_id();
        if let Some(chain) = self.ltv.read_chain(&iid)? {
            if token.signer_id.matches(chain.signer()) {
                return Ok(chain);
            }
        }
        if let Some(bytes) = self.repo.show_blob(commit_id, &cert_repo_path(&iid))? {
            return Ok(CertificateChain::from_pem_bundle(&bytes)?);
        }
        build_chain(&self.http, tsa_url, token, &self.trust)
    }
}

fn failed_verdict(
    info: &CommitInfo,
    timestamps_commit: Option<String>,
    detail: String,
) -> CommitVerdict {
    CommitVerdict {
        commit: info.id.clone(),
        timestamps_commit,
        tokens: Vec::new(),
        effective_time: None,
        ok: false,
        detail: Some(detail),
    }
}

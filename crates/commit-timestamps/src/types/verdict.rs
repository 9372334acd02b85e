use chrono::{DateTime, Utc};
use serde::Serialize;

/// Fate of a single `Timestamp:` trailer during validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    /// Token verified end to end
    Valid,
    /// Trailer did not contain a parseable token; ignored, not fatal
    Skipped,
    /// Token present but failed verification
    Invalid,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenVerdict {
    pub tsa_url: String,
    pub issuer_id: Option<String>,
    pub status: TokenStatus,
    pub gen_time: Option<DateTime<Utc>>,
    /// Failure or skip reason, absent for valid tokens
    pub detail: Option<String>,
}

impl TokenVerdict {
    pub fn valid(tsa_url: &str, issuer_id: String, gen_time: DateTime<Utc>) -> Self {
        TokenVerdict {
            tsa_url: tsa_url.to_string(),
            issuer_id: Some(issuer_id),
            status: TokenStatus::Valid,
            gen_time: Some(gen_time),
            detail: None,
        }
    }

    pub fn skipped(tsa_url: &str, detail: String) -> Self {
        TokenVerdict {
            tsa_url: tsa_url.to_string(),
            issuer_id: None,
            status: TokenStatus::Skipped,
            gen_time: None,
            detail: Some(detail),
        }
    }

    pub fn invalid(
        tsa_url: &str,
        issuer_id: Option<String>,
        gen_time: Option<DateTime<Utc>>,
        detail: String,
    ) -> Self {
        TokenVerdict {
            tsa_url: tsa_url.to_string(),
            issuer_id,
            status: TokenStatus::Invalid,
            gen_time,
            detail: Some(detail),
        }
    }
}

/// Per-commit validation result; only timestamp commits produce one
#[derive(Debug, Clone, Serialize)]
pub struct CommitVerdict {
    pub commit: String,
    /// The commit this timestamp commit seals (its first parent)
    pub timestamps_commit: Option<String>,
    pub tokens: Vec<TokenVerdict>,
    /// Earliest genTime among valid tokens
    pub effective_time: Option<DateTime<Utc>>,
    pub ok: bool,
    /// Commit-level failure reason when no token was even checkable
    pub detail: Option<String>,
}

impl CommitVerdict {
    pub fn valid_count(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| t.status == TokenStatus::Valid)
            .count()
    }
}

/// Result of walking a commit's whole ancestry
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub start: String,
    pub commits: Vec<CommitVerdict>,
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_count_ignores_skips() {
        let verdict = CommitVerdict {
            commit: "c".into(),
            timestamps_commit: Some("p".into()),
            tokens: vec![
                TokenVerdict::valid("https://a", "iid".into(), Utc::now()),
                TokenVerdict::skipped("https://b", "decoy".into()),
                TokenVerdict::invalid("https://c", None, None, "bad".into()),
            ],
            effective_time: None,
            ok: true,
            detail: None,
        };
        assert_eq!(verdict.valid_count(), 1);
    }
}

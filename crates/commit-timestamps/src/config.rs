//! Hook configuration, read from VCS-local config.
//!
//! `timestamping.tsaN.url` entries are scanned from N = 0 upward; the
//! first missing index stops the scan. With no `tsa0.url` the hook is a
//! no-op and ordinary commits proceed untouched.

use std::time::Duration;

use crate::error::TimestampError;
use crate::repo::Repository;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsaEndpoint {
    pub index: u32,
    pub url: String,
    /// Optional TSAs degrade failures to warnings instead of aborting
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub tsas: Vec<TsaEndpoint>,
    pub http_timeout: Duration,
}

impl Config {
    pub fn load(repo: &Repository) -> Result<Self, TimestampError> {
        let mut tsas = Vec::new();
        let mut index = 0u32;
        loop {
            let url = match repo.config_get(&format!("timestamping.tsa{}.url", index))? {
                Some(url) if !url.is_empty() => url,
                _ => break,
            };
            let optional = repo
                .config_get(&format!("timestamping.tsa{}.optional", index))?
                .map(|v| parse_bool(&v))
                .transpose()?
                .unwrap_or(false);
            tsas.push(TsaEndpoint {
                index,
                url,
                optional,
            });
            index += 1;
        }

        let http_timeout = match repo.config_get("timestamping.httptimeout")? {
            Some(value) => {
                let secs: u64 = value.parse().map_err(|_| {
                    TimestampError::Config(format!(
                        "timestamping.httpTimeout is not a number of seconds: {}",
                        value
                    ))
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        Ok(Config { tsas, http_timeout })
    }

    /// With no TSA configured the post-commit hook does nothing
    pub fn is_configured(&self) -> bool {
        !self.tsas.is_empty()
    }
}

fn parse_bool(value: &str) -> Result<bool, TimestampError> {
    // The spellings git itself accepts for boolean config values
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" | "" => Ok(false),
        other => Err(TimestampError::Config(format!(
            "not a boolean config value: {}",
            other
        ))),
    }
}

//! Network access for the three things this tool ever fetches: TSA
//! responses, AIA issuer certificates, and CRLs. Everything is blocking
//! with one configurable per-request timeout; callers decide which
//! failures are fatal.

pub mod crl;
pub mod tsa;

pub use crl::*;
pub use tsa::*;

use std::time::Duration;

use crate::error::TimestampError;

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::blocking::Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, TimestampError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TimestampError::Network(e.to_string()))?;
        Ok(HttpClient { client })
    }

    pub fn get(&self, url: &str) -> Result<Vec<u8>, TimestampError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| TimestampError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TimestampError::Network(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|e| TimestampError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// RFC 3161 over HTTP: POST the DER query, expect the DER reply
    pub fn post_timestamp_query(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, TimestampError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/timestamp-query")
            .header("Accept", "application/timestamp-reply")
            .body(body)
            .send()
            .map_err(|e| TimestampError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TimestampError::Network(format!(
                "POST {} returned {}",
                url,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|e| TimestampError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

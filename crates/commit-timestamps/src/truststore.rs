//! Process-local trust anchors for timestamp validation.
//!
//! A directory of PEM self-signed roots named `<subject_hash>.0`, kept
//! under the repository's hooks directory. Trust granted here covers
//! timestamp-token validation only; matching against chain roots is
//! bitwise on the DER, the filename hash is just a key.

use std::fs;
use std::path::{Path, PathBuf};

use x509_parser::prelude::X509Certificate;

use crate::error::{ChainError, TimestampError};
use crate::parser::certificate::{
    is_issuer_of, is_self_signed, parse_der_certificate, parse_pem_certificates, trust_store_key,
};

#[derive(Debug, Clone)]
pub struct TrustStore {
    dir: PathBuf,
    anchors: Vec<Vec<u8>>,
}

impl TrustStore {
    /// Load every parseable PEM certificate from `dir`; a missing
    /// directory is an empty store, not an error.
    pub fn open(dir: &Path) -> Result<Self, TimestampError> {
        let mut anchors = Vec::new();
        if dir.is_dir() {
            let mut entries: Vec<_> = fs::read_dir(dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            entries.sort();
            for path in entries {
                let bytes = fs::read(&path)?;
                if let Ok(certs) = parse_pem_certificates(&bytes) {
                    anchors.extend(certs);
                }
            }
        }
        Ok(TrustStore {
            dir: dir.to_path_buf(),
            anchors,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn anchors(&self) -> &[Vec<u8>] {
        &self.anchors
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Bitwise membership test for a chain root
    pub fn contains(&self, der: &[u8]) -> bool {
        self.anchors.iter().any(|a| a == der)
    }

    /// An anchor whose subject matches `cert`'s issuer, if any
    pub fn find_issuer_of(&self, cert: &X509Certificate) -> Option<Vec<u8>> {
        for anchor_der in &self.anchors {
            if let Ok(anchor) = parse_der_certificate(anchor_der) {
                if is_issuer_of(cert, &anchor) {
                    return Some(anchor_der.clone());
                }
            }
        }
        None
    }

    /// Install a self-signed root as `<subject_hash>.0`
    pub fn install(&mut self, root_der: &[u8]) -> Result<PathBuf, TimestampError> {
        let cert = parse_der_certificate(root_der)?;
        if !is_self_signed(&cert) {
            return Err(ChainError::Incomplete(
                "refusing to install a non-self-signed trust anchor".to_string(),
            )
            .into());
        }
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.0", trust_store_key(root_der)?));
        let pem = ::pem::encode(&::pem::Pem::new("CERTIFICATE".to_string(), root_der.to_vec()));
        fs::write(&path, pem)?;
        if !self.contains(root_der) {
            self.anchors.push(root_der.to_vec());
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Self-signed P-256 root, CN=Anchor Test Root, valid 2026-2030
    const SELF_SIGNED_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBqTCCAVGgAwIBAgIUQQP8fiA8uXC5/8UzU83RDQs1nh8wCgYIKoZIzj0EAwIw\nKzEZMBcGA1UEAwwQQW5jaG9yIFRlc3QgUm9vdDEOMAwGA1UECwwFU3RvcmUwHhcN\nMjYwODAxMDk0OTE5WhcNMzAwODAxMDk0OTE5WjArMRkwFwYDVQQDDBBBbmNob3Ig\nVGVzdCBSb290MQ4wDAYDVQQLDAVTdG9yZTBZMBMGByqGSM49AgEGCCqGSM49AwEH\nA0IABNPJSfH15DhIacU09rmDI9uh0ix+ERCwQmzXFwsds+UIwnQ++lzQmx1rw+Pd\n+dxSsVYz5AY7QvYQJTM/obPZsOSjUzBRMB0GA1UdDgQWBBRnQNpI2LWafeIJg8KJ\nat6DWXdwAzAfBgNVHSMEGDAWgBRnQNpI2LWafeIJg8KJat6DWXdwAzAPBgNVHRMB\nAf8EBTADAQH/MAoGCCqGSM49BAMCA0YAMEMCIGG8DrihLzRDnfsEV27Gs+oGKlgn\nA/BFe+1FuStedLj1Ah9fyZ1MPRWgeskj45muSYb6z37282Th47/WWHtA8aE4\n-----END CERTIFICATE-----";

    #[test]
    fn missing_dir_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::open(&dir.path().join("nope")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn install_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let root = parse_pem_certificates(SELF_SIGNED_PEM.as_bytes())
            .unwrap()
            .remove(0);

        let mut store = TrustStore::open(dir.path()).unwrap();
        let path = store.install(&root).unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().ends_with(".0"));
        assert!(store.contains(&root));

        let reloaded = TrustStore::open(dir.path()).unwrap();
        assert!(reloaded.contains(&root));
        assert_eq!(reloaded.anchors().len(), 1);
    }
}

//! Long-term validation store: certificate chains and CRL bundles as
//! regular versioned files, so every future timestamp commit seals them.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::TimestampError;
use crate::types::chain::CertificateChain;

/// Reserved directory below the repository root
pub const LTV_DIR: &str = ".timestampltv";
pub const CERTS_SUBDIR: &str = "certs";
pub const CRLS_SUBDIR: &str = "crls";

/// Repo-relative path of a chain file, as used with `git show`
pub fn cert_repo_path(iid: &str) -> String {
    format!("{}/{}/{}.cer", LTV_DIR, CERTS_SUBDIR, iid)
}

/// Repo-relative path of a CRL bundle, as used with `git show`
pub fn crl_repo_path(iid: &str) -> String {
    format!("{}/{}/{}.crl", LTV_DIR, CRLS_SUBDIR, iid)
}

/// Filesystem view of the LTV layout rooted at the working tree
#[derive(Debug, Clone)]
pub struct LtvStore {
    root: PathBuf,
}

impl LtvStore {
    pub fn new(worktree_root: &Path) -> Self {
        LtvStore {
            root: worktree_root.to_path_buf(),
        }
    }

    pub fn cert_path(&self, iid: &str) -> PathBuf {
        self.root.join(cert_repo_path(iid))
    }

    pub fn crl_path(&self, iid: &str) -> PathBuf {
        self.root.join(crl_repo_path(iid))
    }

    pub fn has_chain(&self, iid: &str) -> bool {
        self.cert_path(iid).is_file()
    }

    pub fn has_crls(&self, iid: &str) -> bool {
        self.crl_path(iid).is_file()
    }

    pub fn write_chain(&self, iid: &str, chain: &CertificateChain) -> Result<(), TimestampError> {
        let path = self.cert_path(iid);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, chain.to_pem_bundle()?)?;
        Ok(())
    }

    pub fn write_crl_bundle(&self, iid: &str, pem: &str) -> Result<(), TimestampError> {
        let path = self.crl_path(iid);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, pem)?;
        Ok(())
    }

    pub fn read_chain(&self, iid: &str) -> Result<Option<CertificateChain>, TimestampError> {
        let path = self.cert_path(iid);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(CertificateChain::from_pem_bundle(&bytes)?))
    }

    pub fn read_crl_bundle(&self, iid: &str) -> Result<Option<Vec<u8>>, TimestampError> {
        let path = self.crl_path(iid);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }
}

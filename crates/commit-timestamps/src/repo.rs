//! Thin wrapper over git plumbing. The VCS stays an external collaborator:
//! every read and write goes through the `git` binary, mirroring what the
//! post-commit hook environment guarantees.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::crypto::hash::HashAlgorithm;
use crate::error::TimestampError;

/// The commit fields this tool acts on
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: String,
    pub tree: String,
    pub parents: Vec<String>,
    pub message: String,
}

impl CommitInfo {
    /// First parent, the commit a timestamp commit seals
    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct Repository {
    workdir: PathBuf,
    git_dir: PathBuf,
}

impl Repository {
    /// Locate the repository containing the current working directory
    pub fn discover() -> Result<Self, TimestampError> {
        Self::open(Path::new("."))
    }

    pub fn open(path: &Path) -> Result<Self, TimestampError> {
        let workdir = run_git(path, &["rev-parse", "--show-toplevel"])?;
        let git_dir = run_git(path, &["rev-parse", "--absolute-git-dir"])?;
        Ok(Repository {
            workdir: PathBuf::from(workdir),
            git_dir: PathBuf::from(git_dir),
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Trust anchors live next to the hook that uses them
    pub fn trust_store_dir(&self) -> PathBuf {
        self.git_dir.join("hooks").join("trustanchors")
    }

    fn git_raw(&self, args: &[&str]) -> Result<Output, TimestampError> {
        Command::new("git")
            .arg("-C")
            .arg(&self.workdir)
            .args(args)
            .output()
            .map_err(|e| TimestampError::Vcs(format!("failed to run git: {}", e)))
    }

    fn git(&self, args: &[&str]) -> Result<String, TimestampError> {
        let output = self.git_raw(args)?;
        if !output.status.success() {
            return Err(TimestampError::Vcs(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    /// Repository object format, which fixes the digest algorithm `H`
    pub fn object_format(&self) -> Result<HashAlgorithm, TimestampError> {
        let format = self.git(&["rev-parse", "--show-object-format"])?;
        HashAlgorithm::from_name(&format)
            .map_err(|_| TimestampError::Vcs(format!("unknown object format: {}", format)))
    }

    /// `git config --get`; absent keys are `None`, not an error
    pub fn config_get(&self, key: &str) -> Result<Option<String>, TimestampError> {
        let output = self.git_raw(&["config", "--get", key])?;
        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            ))
        } else {
            Ok(None)
        }
    }

    pub fn rev_parse(&self, rev: &str) -> Result<String, TimestampError> {
        self.git(&["rev-parse", "--verify", &format!("{}^{{commit}}", rev)])
    }

    pub fn head(&self) -> Result<String, TimestampError> {
        self.rev_parse("HEAD")
    }

    pub fn commit_info(&self, id: &str) -> Result<CommitInfo, TimestampError> {
        let raw = self.git(&["cat-file", "commit", id])?;
        parse_commit_object(id, &raw)
    }

    /// Read `<commit>:<path>`; a missing path is `None`
    pub fn show_blob(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>, TimestampError> {
        let spec = format!("{}:{}", commit, path);
        let output = self.git_raw(&["cat-file", "blob", &spec])?;
        if output.status.success() {
            Ok(Some(output.stdout))
        } else {
            Ok(None)
        }
    }

    pub fn stage(&self, path: &str) -> Result<(), TimestampError> {
        self.git(&["add", "--", path]).map(|_| ())
    }

    /// Best-effort unstage, used while rolling back an aborted hook
    pub fn unstage(&self, path: &str) {
        let _ = self.git_raw(&["reset", "-q", "--", path]);
    }

    /// Write the index to a tree object and return its id
    pub fn write_tree(&self) -> Result<String, TimestampError> {
        self.git(&["write-tree"])
    }

    /// Create a commit from the index, allowing an empty diff
    pub fn commit(&self, message: &str) -> Result<String, TimestampError> {
        self.git(&["commit", "--quiet", "--allow-empty", "-m", message])?;
        self.head()
    }

    /// Discard the branch tip while keeping its changes staged
    pub fn soft_rewind(&self) -> Result<(), TimestampError> {
        self.git(&["reset", "-q", "--soft", "HEAD~1"]).map(|_| ())
    }

    pub fn fsck(&self) -> Result<(), TimestampError> {
        let output = self.git_raw(&["fsck", "--no-progress"])?;
        if !output.status.success() {
            return Err(TimestampError::RepositoryCorrupt(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}

fn run_git(cwd: &Path, args: &[&str]) -> Result<String, TimestampError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(cwd)
        .args(args)
        .output()
        .map_err(|e| TimestampError::Vcs(format!("failed to run git: {}", e)))?;
    if !output.status.success() {
        return Err(TimestampError::Vcs(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

/// Parse the raw `git cat-file commit` object: headers, blank line, message
fn parse_commit_object(id: &str, raw: &str) -> Result<CommitInfo, TimestampError> {
    let (headers, message) = raw
        .split_once("\n\n")
        .unwrap_or((raw, ""));

    let mut tree = None;
    let mut parents = Vec::new();
    for line in headers.lines() {
        // Multi-line headers (gpgsig) continue with a leading space
        if line.starts_with(' ') {
            continue;
        }
        if let Some(value) = line.strip_prefix("tree ") {
            tree = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("parent ") {
            parents.push(value.to_string());
        }
    }

    let tree = tree.ok_or_else(|| {
        TimestampError::Vcs(format!("commit object {} has no tree header", id))
    })?;

    Ok(CommitInfo {
        id: id.to_string(),
        tree,
        parents,
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commit_object_with_parents() {
        let raw = "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
                   parent 1111111111111111111111111111111111111111\n\
                   parent 2222222222222222222222222222222222222222\n\
                   author A U Thor <a@example.com> 1700000000 +0000\n\
                   committer A U Thor <a@example.com> 1700000000 +0000\n\
                   \n\
                   Merge branch 'topic'\n";
        let info = parse_commit_object("deadbeef", raw).unwrap();
        assert_eq!(info.tree, "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
        assert_eq!(info.parents.len(), 2);
        assert_eq!(info.first_parent(), Some("1111111111111111111111111111111111111111"));
        assert_eq!(info.message, "Merge branch 'topic'\n");
    }

    #[test]
    fn parses_root_commit_without_parent() {
        let raw = "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
                   author A <a@e> 1 +0000\n\
                   committer A <a@e> 1 +0000\n\
                   \n\
                   init\n";
        let info = parse_commit_object("c0ffee", raw).unwrap();
        assert!(info.parents.is_empty());
        assert_eq!(info.first_parent(), None);
    }

    #[test]
    fn missing_tree_is_an_error() {
        assert!(parse_commit_object("id", "author x\n\nmsg").is_err());
    }
}

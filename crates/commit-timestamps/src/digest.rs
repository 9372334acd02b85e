//! The digest binder: the only place that defines what gets timestamped.
//!
//! The preimage is literal UTF-8 text over the lowercase hex tree and
//! parent ids, reproducible from a checked-out commit alone. No wall
//! clock, configuration, or randomness may ever enter it.

use crate::crypto::hash::{hex_lower, HashAlgorithm};

/// `parent:<parent-hex>,tree:<tree-hex>`
pub fn preimage(tree: &str, parent: &str) -> String {
    format!("parent:{},tree:{}", parent, tree)
}

/// The digest submitted to every TSA for a version-1 timestamp commit
pub fn digest(algorithm: HashAlgorithm, tree: &str, parent: &str) -> Vec<u8> {
    algorithm.hash(preimage(tree, parent).as_bytes())
}

pub fn digest_hex(algorithm: HashAlgorithm, tree: &str, parent: &str) -> String {
    hex_lower(&digest(algorithm, tree, parent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preimage_is_byte_exact() {
        assert_eq!(
            preimage("aabb", "ccdd"),
            "parent:ccdd,tree:aabb".to_string()
        );
    }

    #[test]
    fn digest_is_hash_of_preimage() {
        let tree = "2b297e643c551e76cfa1f93810c50811382f9117";
        let parent = "9c3b1f146b2831b5e1d2e52d35b1a374c38ec1d8";
        let expected = HashAlgorithm::Sha256.hash(preimage(tree, parent).as_bytes());
        assert_eq!(digest(HashAlgorithm::Sha256, tree, parent), expected);
        assert_eq!(
            digest_hex(HashAlgorithm::Sha256, tree, parent),
            hex::encode(expected)
        );
    }

    #[test]
    fn sha1_repositories_use_sha1_digests() {
        let d = digest(HashAlgorithm::Sha1, "aa", "bb");
        assert_eq!(d.len(), 20);
    }
}

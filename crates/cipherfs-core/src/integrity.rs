use cipherfs_crypto::BlockId;

use crate::types::{BlockContext, ResolvedPermissions};

/// Pure checks tying received bytes and pointer contexts to what the
/// caller asked for
pub trait IntegrityVerifier: Send + Sync {
    /// Recompute the content hash of `ciphertext` and compare it with `expected`
    fn verify_content_hash(&self, ciphertext: &[u8], expected: &BlockId) -> bool;

    /// Check that a pointer's embedded context is consistent with what
    /// current key material expects
    fn verify_context(&self, context: &BlockContext, resolved: &ResolvedPermissions<'_>) -> bool;
}

/// Verifier using the hash type recorded in each block id
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHashVerifier;

impl IntegrityVerifier for ContentHashVerifier {
    fn verify_content_hash(&self, ciphertext: &[u8], expected: &BlockId) -> bool {
        expected.matches(ciphertext)
    }

    fn verify_context(&self, context: &BlockContext, resolved: &ResolvedPermissions<'_>) -> bool {
        if context.creator.is_empty() || context.writer.is_empty() {
            return false;
        }
        // The writer of this reference must still be a writer of the collection
        resolved.is_writer(&context.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollectionId, KeyGen, KeyMetadata, UserId};

    #[test]
    fn test_content_hash() {
        let v = ContentHashVerifier;
        let id = BlockId::for_ciphertext(b"ciphertext");
        assert!(v.verify_content_hash(b"ciphertext", &id));
        assert!(!v.verify_content_hash(b"ciphertexT", &id));
        assert!(!v.verify_content_hash(b"", &BlockId::ZERO));
    }

    #[test]
    fn test_context_against_writers() {
        let v = ContentHashVerifier;
        let md =
            KeyMetadata::new(CollectionId::default(), KeyGen(1)).with_writer(UserId::new("alice"));

        let ok = BlockContext::first_ref(UserId::new("alice"));
        assert!(v.verify_context(&ok, &md.permissions()));

        let stale = BlockContext::first_ref(UserId::new("mallory"));
        assert!(!v.verify_context(&stale, &md.permissions()));

        let forged = BlockContext::first_ref(UserId::new(""));
        assert!(!v.verify_context(&forged, &md.permissions()));
    }
}

/// Opaque refresh-token generation and digesting.
///
/// Tokens are 64 random alphanumeric characters from the thread-local
/// CSPRNG (~381 bits of entropy, URL- and cookie-safe). Only the SHA-256
/// digest of a token is ever persisted; the digest is the storage and
/// lookup key and is never reversed.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

const TOKEN_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueTokenGenerator;

impl OpaqueTokenGenerator {
    /// Generate a fresh plaintext token. This is what the client holds; the
    /// server keeps only the digest.
    pub fn generate(&self) -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }

    /// Deterministic one-way digest of a token, lowercase hex.
    pub fn hash(&self, token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

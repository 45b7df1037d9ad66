//! Challenge-response authentication for the Tsunami Transfer Protocol
//! control session.
//!
//! Both peers hold a shared secret out of band. The server sends a 64-byte
//! random challenge; each side XORs the (repeated) secret bytes over the
//! challenge and takes the MD5 digest of the result. The server compares its
//! own digest against the one the client sends back.

use digest::Digest as _;
use zeroize::Zeroizing;

/// Length in bytes of the random challenge.
pub const CHALLENGE_LEN: usize = 64;
/// Length in bytes of the MD5 digest exchanged as proof.
pub const DIGEST_LEN: usize = 16;

/// Errors raised while generating a challenge or verifying a response.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The platform random source could not supply challenge bytes.
    #[error("failed to obtain random bytes for authentication challenge: {0}")]
    Random(#[from] getrandom::Error),
    /// The shared secret was empty; XOR tiling is undefined over zero bytes.
    #[error("shared secret must not be empty")]
    EmptySecret,
}

/// The shared secret, held only long enough to compute a digest.
///
/// Backed by [`zeroize::Zeroizing`] so the byte buffer is wiped on drop
/// without a hand-rolled zeroing loop.
#[derive(Clone)]
pub struct Secret(Zeroizing<Vec<u8>>);

impl Secret {
    /// Wraps `bytes` as a shared secret.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Generates a fresh 64-byte authentication challenge from the platform
/// random source.
pub fn generate_challenge() -> Result<[u8; CHALLENGE_LEN], AuthError> {
    let mut buf = [0u8; CHALLENGE_LEN];
    getrandom::getrandom(&mut buf)?;
    Ok(buf)
}

/// Computes the proof digest for `challenge` under `secret`.
///
/// The secret's bytes are tiled (wrapped, without a separator) across the
/// challenge length before XOR-ing, matching the reference tiling rule of
/// repeating the secret's raw byte string to cover the buffer.
pub fn compute_digest(
    challenge: &[u8; CHALLENGE_LEN],
    secret: &Secret,
) -> Result<[u8; DIGEST_LEN], AuthError> {
    let secret_bytes = secret.as_bytes();
    if secret_bytes.is_empty() {
        return Err(AuthError::EmptySecret);
    }

    let mut mixed = *challenge;
    for (i, byte) in mixed.iter_mut().enumerate() {
        *byte ^= secret_bytes[i % secret_bytes.len()];
    }

    let mut hasher = md5::Md5::new();
    hasher.update(mixed);
    Ok(hasher.finalize().into())
}

/// Compares two digests byte-wise.
#[must_use]
pub fn digests_match(expected: &[u8; DIGEST_LEN], actual: &[u8; DIGEST_LEN]) -> bool {
    expected == actual
}

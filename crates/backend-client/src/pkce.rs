//! PKCE code verifier and challenge generation (RFC 7636, S256).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use secrecy::SecretString;
use sha2::{Digest, Sha256};

const VERIFIER_BYTES: usize = 64;

/// Challenge sent with an authorization request, plus the verifier that
/// must be presented when exchanging the code.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: SecretString,
    pub code_challenge: String,
    pub code_challenge_method: &'static str,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        let verifier = generate_code_verifier();
        let challenge = code_challenge(&verifier);
        Self {
            code_verifier: SecretString::new(verifier),
            code_challenge: challenge,
            code_challenge_method: "s256",
        }
    }
}

/// Random URL-safe verifier, 86 characters long.
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; VERIFIER_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `BASE64URL(SHA256(verifier))` without padding.
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

//! Secret codec for integration credentials.
//!
//! Secrets (integration tokens and passwords) are sealed with
//! ChaCha20-Poly1305 under a key derived from the user's stable identity
//! string. The identity is not a user-chosen secret, so this is at-rest
//! obfuscation of the remote store rather than protection against an
//! adversary who already knows the identity.
//!
//! Armored form: `base64(nonce || ciphertext)` with a random 12-byte nonce.

use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::SyncError;

const KEY_CONTEXT: &str = "hearthsync 2026-01-10 profile secret sealing";
const NONCE_LEN: usize = 12;

fn derive_key(identity: &str) -> [u8; 32] {
    blake3::derive_key(KEY_CONTEXT, identity.as_bytes())
}

/// Seal a plaintext under the given identity.
pub fn encrypt(plaintext: &str, identity: &str) -> Result<String, SyncError> {
    if identity.is_empty() {
        return Err(SyncError::Validation("empty identity".to_string()));
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&derive_key(identity)));
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|e| SyncError::Validation(format!("encryption failed: {e}")))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(general_purpose::STANDARD.encode(sealed))
}

/// Recover a plaintext sealed with [`encrypt`].
///
/// Empty or blank input short-circuits to `Ok(None)` without touching the
/// cipher. Any malformed armor, failed auth tag (wrong identity, tampered
/// data) or non-UTF-8 plaintext is a field-scoped [`SyncError::DecryptFailure`];
/// the caller keeps the previous local value.
pub fn decrypt(armored: &str, identity: &str) -> Result<Option<String>, SyncError> {
    if armored.trim().is_empty() {
        return Ok(None);
    }

    let sealed = general_purpose::STANDARD
        .decode(armored.trim())
        .map_err(|e| SyncError::DecryptFailure(format!("bad armor: {e}")))?;
    if sealed.len() <= NONCE_LEN {
        return Err(SyncError::DecryptFailure("truncated ciphertext".to_string()));
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&derive_key(identity)));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| SyncError::DecryptFailure("authentication failed".to_string()))?;

    let plaintext = String::from_utf8(plaintext)
        .map_err(|_| SyncError::DecryptFailure("plaintext is not UTF-8".to_string()))?;
    Ok(Some(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: &str = "4f2c9b1e-user-identity";

    #[test]
    fn test_roundtrip() {
        let sealed = encrypt("super-secret-token", IDENTITY).unwrap();
        let recovered = decrypt(&sealed, IDENTITY).unwrap();
        assert_eq!(recovered.as_deref(), Some("super-secret-token"));
    }

    #[test]
    fn test_roundtrip_unicode() {
        let sealed = encrypt("mot de passe — ワイファイ", IDENTITY).unwrap();
        assert_eq!(
            decrypt(&sealed, IDENTITY).unwrap().as_deref(),
            Some("mot de passe — ワイファイ")
        );
    }

    #[test]
    fn test_wrong_identity_fails_never_garbage() {
        let sealed = encrypt("secret", IDENTITY).unwrap();
        let result = decrypt(&sealed, "some-other-user");
        assert!(matches!(result, Err(SyncError::DecryptFailure(_))));
    }

    #[test]
    fn test_nonce_makes_ciphertexts_differ() {
        let a = encrypt("secret", IDENTITY).unwrap();
        let b = encrypt("secret", IDENTITY).unwrap();
        assert_ne!(a, b);
        assert_eq!(decrypt(&a, IDENTITY).unwrap(), decrypt(&b, IDENTITY).unwrap());
    }

    #[test]
    fn test_blank_input_short_circuits() {
        assert_eq!(decrypt("", IDENTITY).unwrap(), None);
        assert_eq!(decrypt("   ", IDENTITY).unwrap(), None);
    }

    #[test]
    fn test_corrupted_armor_is_decrypt_failure() {
        assert!(matches!(
            decrypt("not!base64!!", IDENTITY),
            Err(SyncError::DecryptFailure(_))
        ));
        // Valid base64, too short to hold a nonce and a tag.
        assert!(matches!(
            decrypt("AAAA", IDENTITY),
            Err(SyncError::DecryptFailure(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let sealed = encrypt("secret", IDENTITY).unwrap();
        let mut raw = general_purpose::STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = general_purpose::STANDARD.encode(raw);
        assert!(matches!(
            decrypt(&tampered, IDENTITY),
            Err(SyncError::DecryptFailure(_))
        ));
    }
}

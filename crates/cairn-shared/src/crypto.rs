use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::constants::{
    DIGEST_SIZE, KDF_CONTEXT_ENVELOPE_KEY, KDF_CONTEXT_KEY_FINGERPRINT, NONCE_SIZE, SALT_SIZE,
    SYMMETRIC_KEY_SIZE, TAG_SIZE,
};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes: [u8; NONCE_SIZE] = random_bytes();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

// BLAKE3 KDF with domain separation; the salt keeps equal passphrases from
// producing equal keys across envelopes.
pub fn derive_key_from_passphrase(passphrase: &[u8], salt: &[u8]) -> SymmetricKey {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_ENVELOPE_KEY);
    hasher.update(salt);
    hasher.update(passphrase);
    *hasher.finalize().as_bytes()
}

/// One-way, unsalted fingerprint of a passphrase. Safe to store next to the
/// ciphertext; only useful for "is this plausibly the right passphrase" hints.
pub fn key_fingerprint(passphrase: &str) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_KEY_FINGERPRINT);
    hasher.update(passphrase.as_bytes());
    hex::encode(&hasher.finalize().as_bytes()[..DIGEST_SIZE])
}

/// Wrap `plaintext` under `passphrase`.
///
/// Envelope layout: `salt (16) || nonce (24) || ciphertext || tag (16)`.
/// Returns the envelope and the passphrase fingerprint.
pub fn wrap(plaintext: &[u8], passphrase: &str) -> Result<(Vec<u8>, String), CryptoError> {
    if passphrase.is_empty() {
        return Err(CryptoError::EmptyPassphrase);
    }

    let salt: [u8; SALT_SIZE] = random_bytes();
    let key = derive_key_from_passphrase(passphrase.as_bytes(), &salt);
    let sealed = encrypt(&key, plaintext)?;

    let mut envelope = Vec::with_capacity(SALT_SIZE + sealed.len());
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&sealed);
    Ok((envelope, key_fingerprint(passphrase)))
}

pub fn unwrap(envelope: &[u8], passphrase: &str) -> Result<Vec<u8>, CryptoError> {
    if envelope.len() < SALT_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }
    let (salt, sealed) = envelope.split_at(SALT_SIZE);
    let key = derive_key_from_passphrase(passphrase.as_bytes(), salt);
    decrypt(&key, sealed)
}

/// Size of the envelope produced for a plaintext of `plaintext_len` bytes.
pub fn wrapped_len(plaintext_len: usize) -> usize {
    SALT_SIZE + NONCE_SIZE + plaintext_len + TAG_SIZE
}

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::models::{SyncError, SyncErrorKind};

pub type CryptoResult<T> = Result<T, SyncError>;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// 12-byte nonce for AES-GCM (96 bits is the standard).
pub const NONCE_SIZE: usize = 12;

/// Random salt length for the user-password KDF.
pub const SALT_SIZE: usize = 16;

/// Argon2id cost parameters. The defaults are fixed so ciphertexts written by
/// one deployment remain decryptable by the next.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KdfParams {
    pub time_cost: u32,
    pub memory_cost_kib: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            time_cost: 2,
            memory_cost_kib: 102_400,
            parallelism: 8,
        }
    }
}

pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

pub fn generate_pipeline_key() -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    rand::thread_rng().fill_bytes(&mut *key);
    key
}

/// Derive a 32-byte key from an app password with Argon2id. CPU and memory
/// hard; callers on a latency-sensitive path must dispatch this off-loop.
pub fn derive_user_key(
    password: &str,
    salt: &[u8],
    params: &KdfParams,
) -> CryptoResult<Zeroizing<[u8; KEY_SIZE]>> {
    let argon_params = Params::new(
        params.memory_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|error| crypto_error(format!("invalid argon2 params: {error}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut *key)
        .map_err(|error| crypto_error(format!("argon2 derivation failed: {error}")))?;

    Ok(key)
}

/// Decode the configured server master key: urlsafe base64 first, raw UTF-8
/// bytes as a fallback. Must decode to at least 32 bytes; only the first 32
/// are used.
pub fn decode_master_key(raw: &str) -> CryptoResult<Zeroizing<[u8; KEY_SIZE]>> {
    let decoded = URL_SAFE
        .decode(raw.as_bytes())
        .unwrap_or_else(|_| raw.as_bytes().to_vec());
    let decoded = Zeroizing::new(decoded);

    if decoded.len() < KEY_SIZE {
        return Err(SyncError::new(
            SyncErrorKind::Configuration,
            "server master key must be at least 32 bytes after decoding",
        ));
    }

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&decoded[..KEY_SIZE]);
    Ok(key)
}

/// Encrypt plaintext under `key` with a fresh random nonce, returning
/// `(nonce, ciphertext)`. The AEAD tag is appended to the ciphertext.
pub fn wrap(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|error| crypto_error(format!("invalid key: {error}")))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|error| crypto_error(format!("encryption failed: {error}")))?;

    Ok((nonce_bytes.to_vec(), ciphertext))
}

/// Decrypt ciphertext; fails closed on any tampering. The authentication
/// failure is reported as `Authentication` so a wrong password surfaces as
/// invalid credentials, never as decryption internals.
pub fn unwrap(
    key: &[u8; KEY_SIZE],
    nonce: &[u8],
    ciphertext: &[u8],
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    if nonce.len() != NONCE_SIZE {
        return Err(crypto_error(format!(
            "invalid nonce size: expected {NONCE_SIZE}, got {}",
            nonce.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|error| crypto_error(format!("invalid key: {error}")))?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| {
            SyncError::new(
                SyncErrorKind::Authentication,
                "decryption failed: key mismatch or tampered ciphertext",
            )
        })?;

    Ok(Zeroizing::new(plaintext))
}

fn crypto_error(message: String) -> SyncError {
    SyncError::new(SyncErrorKind::Crypto, message)
}

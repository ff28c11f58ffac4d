use zeroize::Zeroizing;

use crate::models::{PlatformCredentials, SyncError, SyncErrorKind, UserId};
use crate::vault::crypto::{
    CryptoResult, KEY_SIZE, KdfParams, derive_user_key, generate_pipeline_key, generate_salt,
    unwrap, wrap,
};

/// One user's wrapped secret material. The pipeline key itself is never
/// stored in clear; both wrapped copies decrypt the same key, so either the
/// interactive or the unattended path recovers the same credentials.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VaultRecord {
    pub user: UserId,
    pub credentials_ciphertext: Vec<u8>,
    pub credentials_nonce: Vec<u8>,
    pub pipeline_key_wrapped_user: Vec<u8>,
    pub pipeline_key_wrapped_user_nonce: Vec<u8>,
    pub pipeline_key_wrapped_server: Option<Vec<u8>>,
    pub pipeline_key_wrapped_server_nonce: Option<Vec<u8>>,
    pub user_kdf_salt: Vec<u8>,
    pub cron_enabled: bool,
}

impl VaultRecord {
    /// Whether the scheduler can unwrap this vault without the user present.
    pub fn supports_unattended(&self) -> bool {
        self.cron_enabled
            && self.pipeline_key_wrapped_server.is_some()
            && self.pipeline_key_wrapped_server_nonce.is_some()
    }
}

/// Build a fresh vault: generate a pipeline key, wrap the credentials under
/// it, and wrap the pipeline key under the password-derived user key and,
/// when a server master key is configured, under the server key as well.
pub fn seal_credentials(
    user: UserId,
    credentials: &PlatformCredentials,
    app_password: &str,
    master_key: Option<&[u8; KEY_SIZE]>,
    params: &KdfParams,
    enable_cron: bool,
) -> CryptoResult<VaultRecord> {
    if enable_cron && master_key.is_none() {
        return Err(SyncError::new(
            SyncErrorKind::Configuration,
            "unattended access requested but no server master key is configured",
        )
        .for_user(user));
    }

    let salt = generate_salt();
    let user_key = derive_user_key(app_password, &salt, params)?;
    let pipeline_key = generate_pipeline_key();

    let blob = Zeroizing::new(
        serde_json::to_vec(credentials)
            .map_err(|error| SyncError::new(SyncErrorKind::Internal, error.to_string()))?,
    );
    let (credentials_nonce, credentials_ciphertext) = wrap(&pipeline_key, &blob)?;
    let (user_nonce, user_wrapped) = wrap(&user_key, pipeline_key.as_slice())?;

    let (server_wrapped, server_nonce) = match master_key {
        Some(key) => {
            let (nonce, wrapped) = wrap(key, pipeline_key.as_slice())?;
            (Some(wrapped), Some(nonce))
        }
        None => (None, None),
    };

    Ok(VaultRecord {
        user,
        credentials_ciphertext,
        credentials_nonce,
        pipeline_key_wrapped_user: user_wrapped,
        pipeline_key_wrapped_user_nonce: user_nonce,
        pipeline_key_wrapped_server: server_wrapped,
        pipeline_key_wrapped_server_nonce: server_nonce,
        user_kdf_salt: salt.to_vec(),
        cron_enabled: enable_cron,
    })
}

/// Interactive unwrap: re-derive the user key from the stored salt, unwrap
/// the pipeline key, unwrap the credentials. A wrong app password surfaces
/// as an authentication failure.
pub fn open_interactive(
    vault: &VaultRecord,
    app_password: &str,
    params: &KdfParams,
) -> CryptoResult<PlatformCredentials> {
    let user_key = derive_user_key(app_password, &vault.user_kdf_salt, params)?;
    let pipeline_key = unwrap(
        &user_key,
        &vault.pipeline_key_wrapped_user_nonce,
        &vault.pipeline_key_wrapped_user,
    )
    .map_err(|error| error.for_user(vault.user))?;
    open_credentials(vault, &pipeline_key)
}

/// Unattended unwrap via the server-wrapped pipeline key copy. Scheduler
/// only; request handlers taking user input must use the interactive path.
pub fn open_unattended(
    vault: &VaultRecord,
    master_key: &[u8; KEY_SIZE],
) -> CryptoResult<PlatformCredentials> {
    let (wrapped, nonce) = match (
        &vault.pipeline_key_wrapped_server,
        &vault.pipeline_key_wrapped_server_nonce,
    ) {
        (Some(wrapped), Some(nonce)) => (wrapped, nonce),
        _ => {
            return Err(SyncError::new(
                SyncErrorKind::Configuration,
                "vault has no server-wrapped pipeline key",
            )
            .for_user(vault.user));
        }
    };

    let pipeline_key =
        unwrap(master_key, nonce, wrapped).map_err(|error| error.for_user(vault.user))?;
    open_credentials(vault, &pipeline_key)
}

/// Recover the pipeline key through the user path (password proof required)
/// and re-wrap it under the server key, returning the new
/// `(wrapped, nonce)` pair for the unattended copy.
pub fn rewrap_for_unattended(
    vault: &VaultRecord,
    app_password: &str,
    master_key: &[u8; KEY_SIZE],
    params: &KdfParams,
) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
    let user_key = derive_user_key(app_password, &vault.user_kdf_salt, params)?;
    let pipeline_key = unwrap(
        &user_key,
        &vault.pipeline_key_wrapped_user_nonce,
        &vault.pipeline_key_wrapped_user,
    )
    .map_err(|error| error.for_user(vault.user))?;
    let pipeline_key = pipeline_key_bytes(vault.user, &pipeline_key)?;

    let (nonce, wrapped) = wrap(master_key, pipeline_key.as_slice())?;
    Ok((wrapped, nonce))
}

fn open_credentials(
    vault: &VaultRecord,
    pipeline_key: &Zeroizing<Vec<u8>>,
) -> CryptoResult<PlatformCredentials> {
    let pipeline_key = pipeline_key_bytes(vault.user, pipeline_key)?;
    let blob = unwrap(
        &pipeline_key,
        &vault.credentials_nonce,
        &vault.credentials_ciphertext,
    )
    .map_err(|error| error.for_user(vault.user))?;

    serde_json::from_slice(&blob)
        .map_err(|error| {
            SyncError::new(
                SyncErrorKind::Crypto,
                format!("credentials blob is not valid JSON: {error}"),
            )
            .for_user(vault.user)
        })
}

fn pipeline_key_bytes(
    user: UserId,
    raw: &Zeroizing<Vec<u8>>,
) -> CryptoResult<Zeroizing<[u8; KEY_SIZE]>> {
    if raw.len() != KEY_SIZE {
        return Err(SyncError::new(
            SyncErrorKind::Crypto,
            format!("unwrapped pipeline key has invalid length {}", raw.len()),
        )
        .for_user(user));
    }
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(raw);
    Ok(key)
}

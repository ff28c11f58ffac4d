pub mod crypto;
pub mod envelope;

pub use crypto::{
    CryptoResult, KEY_SIZE, KdfParams, NONCE_SIZE, SALT_SIZE, decode_master_key, derive_user_key,
    generate_pipeline_key, generate_salt, unwrap, wrap,
};
pub use envelope::{
    VaultRecord, open_interactive, open_unattended, rewrap_for_unattended, seal_credentials,
};

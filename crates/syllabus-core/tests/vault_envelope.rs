use syllabus_core::models::{PlatformCredentials, SyncErrorKind, UserId};
use syllabus_core::vault::{
    KdfParams, decode_master_key, open_interactive, open_unattended, rewrap_for_unattended,
    seal_credentials,
};

const APP_PASSWORD: &str = "correct horse battery staple";

fn fast_kdf() -> KdfParams {
    // Full-strength Argon2 parameters are pointless in tests.
    KdfParams {
        time_cost: 1,
        memory_cost_kib: 1024,
        parallelism: 1,
    }
}

fn credentials() -> PlatformCredentials {
    PlatformCredentials::new("student@example.edu", "platform-secret")
}

#[test]
fn interactive_round_trip_recovers_credentials() {
    let vault = seal_credentials(
        UserId(1),
        &credentials(),
        APP_PASSWORD,
        None,
        &fast_kdf(),
        false,
    )
    .expect("seal must succeed");

    assert!(!vault.supports_unattended());

    let opened = open_interactive(&vault, APP_PASSWORD, &fast_kdf()).expect("open must succeed");
    assert_eq!(opened, credentials());
}

#[test]
fn unattended_path_recovers_the_same_credentials() {
    let master = [7u8; 32];
    let vault = seal_credentials(
        UserId(2),
        &credentials(),
        APP_PASSWORD,
        Some(&master),
        &fast_kdf(),
        true,
    )
    .expect("seal must succeed");

    assert!(vault.supports_unattended());

    let interactive = open_interactive(&vault, APP_PASSWORD, &fast_kdf()).expect("user path");
    let unattended = open_unattended(&vault, &master).expect("server path");
    assert_eq!(interactive, unattended);
}

#[test]
fn wrong_app_password_is_an_authentication_failure() {
    let vault = seal_credentials(
        UserId(3),
        &credentials(),
        APP_PASSWORD,
        None,
        &fast_kdf(),
        false,
    )
    .expect("seal must succeed");

    let error = open_interactive(&vault, "not the password", &fast_kdf())
        .expect_err("wrong password must fail");
    assert_eq!(error.kind, SyncErrorKind::Authentication);
    assert_eq!(error.user, Some(UserId(3)));
}

#[test]
fn tampered_ciphertext_fails_closed() {
    let mut vault = seal_credentials(
        UserId(4),
        &credentials(),
        APP_PASSWORD,
        None,
        &fast_kdf(),
        false,
    )
    .expect("seal must succeed");

    vault.credentials_ciphertext[0] ^= 0xff;

    let error =
        open_interactive(&vault, APP_PASSWORD, &fast_kdf()).expect_err("tampering must fail");
    assert_eq!(error.kind, SyncErrorKind::Authentication);
}

#[test]
fn cron_without_master_key_is_a_configuration_error() {
    let error = seal_credentials(
        UserId(5),
        &credentials(),
        APP_PASSWORD,
        None,
        &fast_kdf(),
        true,
    )
    .expect_err("cron needs a server key");
    assert_eq!(error.kind, SyncErrorKind::Configuration);
}

#[test]
fn unattended_open_without_server_copy_is_a_configuration_error() {
    let master = [9u8; 32];
    let vault = seal_credentials(
        UserId(6),
        &credentials(),
        APP_PASSWORD,
        None,
        &fast_kdf(),
        false,
    )
    .expect("seal must succeed");

    let error = open_unattended(&vault, &master).expect_err("no server copy stored");
    assert_eq!(error.kind, SyncErrorKind::Configuration);
}

#[test]
fn rewrap_produces_a_working_server_copy() {
    let master = [3u8; 32];
    let mut vault = seal_credentials(
        UserId(7),
        &credentials(),
        APP_PASSWORD,
        None,
        &fast_kdf(),
        false,
    )
    .expect("seal must succeed");

    let (wrapped, nonce) = rewrap_for_unattended(&vault, APP_PASSWORD, &master, &fast_kdf())
        .expect("rewrap must succeed");
    vault.pipeline_key_wrapped_server = Some(wrapped);
    vault.pipeline_key_wrapped_server_nonce = Some(nonce);
    vault.cron_enabled = true;

    let opened = open_unattended(&vault, &master).expect("server path after rewrap");
    assert_eq!(opened, credentials());
}

#[test]
fn master_key_decoding_accepts_base64_and_raw_input() {
    // 32 zero bytes, urlsafe base64 with padding.
    let encoded = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
    let decoded = decode_master_key(encoded).expect("base64 input");
    assert_eq!(*decoded, [0u8; 32]);

    // Not base64, falls back to raw bytes and truncates to 32.
    let raw = "!raw-master-key-material-0123456789abcdef";
    let decoded = decode_master_key(raw).expect("raw input");
    assert_eq!(&decoded[..], &raw.as_bytes()[..32]);

    let error = decode_master_key("!too-short").expect_err("short keys are rejected");
    assert_eq!(error.kind, SyncErrorKind::Configuration);
}

//! Helpers for running the CLI binary in an isolated environment.

#![allow(dead_code)]

use std::path::Path;
use std::process::{Command, Output};

use chrono::{Duration, Utc};

use skyconn_core::{
    AuthOutcome, EndpointId, FileSessionStore, MessagingHost, PrimaryToken, RegistrationToken,
    SessionStore, TokenSet,
};

/// Endpoint id used by the mock messaging host.
pub const ENDPOINT_ID: &str = "{8f2c1a3e-11aa-4c0b-9a1e-2a0d4b6c7e81}";

/// Registration token handed out by the mock messaging host.
pub const REGISTRATION_TOKEN: &str = "U2lnbmF0dXJlOjE3MDA=";

fn command(args: &[&str], home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_skyconn"));
    cmd.args(args);
    cmd.env("HOME", home);
    cmd.env("XDG_DATA_HOME", home.join("data"));
    cmd.env("NO_COLOR", "1");
    cmd.env_remove("SKYCONN_SESSION_FILE");
    cmd.env_remove("SKYCONN_SERVICE_URL");
    cmd.env_remove("SKYCONN_PASSWORD");
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Run the CLI with a custom HOME directory for isolated session storage.
pub fn run_cli(args: &[&str], home: &Path) -> Output {
    command(args, home).output().expect("Failed to execute CLI")
}

/// Run the CLI against a mock server without blocking the test runtime.
pub async fn run_cli_against(args: &[&str], home: &Path, service_url: &str) -> Output {
    let mut cmd = tokio::process::Command::from(command(args, home));
    cmd.env("SKYCONN_SERVICE_URL", service_url);
    cmd.output().await.expect("Failed to execute CLI")
}

/// Panic with stderr unless the command succeeded; return stdout.
pub fn stdout_of(args: &[&str], output: Output) -> String {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("CLI command failed: {:?}\nstderr: {}", args, stderr);
    }
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Write a connected session for `identity` on `host` to `path`.
pub fn write_session(path: &Path, identity: &str, host: &str) {
    let host = MessagingHost::new(host).unwrap();
    let mut tokens = TokenSet::new(host.clone());
    tokens.identity = Some(identity.to_string());
    tokens.set_primary(AuthOutcome {
        token: PrimaryToken::new("stored-primary"),
        expiry: Some(Utc::now() + Duration::hours(2)),
    });
    tokens.set_registration(
        RegistrationToken::new(REGISTRATION_TOKEN),
        Utc::now() + Duration::hours(1),
        host,
        Some(EndpointId::new(ENDPOINT_ID).unwrap()),
    );
    FileSessionStore::new(path).save(&tokens).unwrap();
}

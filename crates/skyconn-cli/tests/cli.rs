//! CLI behaviour that needs no server.

mod common;

use chrono::{Duration, Utc};

use common::{run_cli, stdout_of, write_session};
use skyconn_core::{AuthOutcome, FileSessionStore, MessagingHost, PrimaryToken, SessionStore, TokenSet};

#[test]
fn test_version_flag() {
    let home = tempfile::tempdir().unwrap();
    let stdout = stdout_of(&["--version"], run_cli(&["--version"], home.path()));
    assert!(stdout.starts_with("skyconn "));
}

#[test]
fn test_whoami_without_session() {
    let home = tempfile::tempdir().unwrap();
    let output = run_cli(&["whoami"], home.path());

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No active session"));
}

#[test]
fn test_whoami_reads_default_session_location() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("data").join("skyconn").join("session");
    write_session(&path, "alice.example", "https://client-s.gateway.messenger.live.com/v1");

    let stdout = stdout_of(&["whoami"], run_cli(&["whoami"], home.path()));
    assert!(stdout.contains("alice.example"));
    assert!(stdout.contains("client-s.gateway.messenger.live.com"));
}

#[test]
fn test_whoami_json_from_session_file() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("custom-session");
    write_session(&path, "guest:visitor_4f1c2a", "https://db5-client-s.gateway.messenger.live.com/v1");
    let path_arg = path.to_str().unwrap();

    let args = ["--session-file", path_arg, "whoami", "--json"];
    let stdout = stdout_of(&args, run_cli(&args, home.path()));
    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    assert_eq!(summary["identity"], "guest:visitor_4f1c2a");
    assert_eq!(summary["guest"], true);
    assert_eq!(summary["registered"], true);
    assert_eq!(
        summary["host"],
        "https://db5-client-s.gateway.messenger.live.com/v1"
    );
    // Tokens stay in the session file.
    assert!(!stdout.contains("stored-primary"));
}

#[test]
fn test_whoami_with_expired_session() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("session");

    let mut tokens = TokenSet::new(MessagingHost::default());
    tokens.identity = Some("alice.example".to_string());
    tokens.set_primary(AuthOutcome {
        token: PrimaryToken::new("old"),
        expiry: Some(Utc::now() - Duration::minutes(10)),
    });
    FileSessionStore::new(&path).save(&tokens).unwrap();

    let args = ["--session-file", path.to_str().unwrap(), "whoami"];
    let output = run_cli(&args, home.path());
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load session"));
}

#[test]
fn test_refresh_with_expired_session_warns() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("session");

    let mut tokens = TokenSet::new(MessagingHost::default());
    tokens.identity = Some("alice.example".to_string());
    tokens.set_primary(AuthOutcome {
        token: PrimaryToken::new("old"),
        expiry: Some(Utc::now() - Duration::minutes(10)),
    });
    FileSessionStore::new(&path).save(&tokens).unwrap();

    let args = ["--session-file", path.to_str().unwrap(), "refresh"];
    let output = run_cli(&args, home.path());
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Stored session could not be restored"));
    assert!(stderr.contains("Failed to restore session"));
}

#[test]
fn test_logout_removes_session_and_tolerates_absence() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("session");
    write_session(&path, "alice.example", "https://client-s.gateway.messenger.live.com/v1");

    let args = ["--session-file", path.to_str().unwrap(), "logout"];
    stdout_of(&args, run_cli(&args, home.path()));
    assert!(!path.exists());

    // Second logout has nothing to remove.
    stdout_of(&args, run_cli(&args, home.path()));
}

#[test]
fn test_guest_rejects_bad_join_code() {
    let home = tempfile::tempdir().unwrap();
    let output = run_cli(&["guest", "not a code!", "--name", "Visitor"], home.path());

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid join code"));
}

#[test]
fn test_login_requires_password() {
    let home = tempfile::tempdir().unwrap();
    let output = run_cli(&["login", "--username", "alice"], home.path());

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--password"));
}

//! End-to-end tests for the BlockMint app lock
//!
//! These tests drive the controller through the real HTTP client against a
//! mock security server, with session markers stored on disk.

use std::sync::Arc;

use blockmint_lock::{
    ApiConfig, AppLock, FileSessionStore, HostEvent, HttpSecurityApi, LockConfig, LockError,
    LockEvent, LockPhase, NoBiometrics, PinOutcome, SetupStep, UserId,
};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

const USER: &str = "user-42";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn build_lock(
    server: &ServerGuard,
    config: LockConfig,
    session_dir: &TempDir,
) -> (AppLock, UnboundedReceiver<LockEvent>) {
    AppLock::new(
        config,
        Arc::new(HttpSecurityApi::new(ApiConfig::new(server.url()))),
        Arc::new(NoBiometrics),
        Arc::new(FileSessionStore::with_dir(session_dir.path().to_path_buf())),
    )
}

async fn settings_mock(server: &mut ServerGuard, pin_enabled: bool) -> Mock {
    server
        .mock("GET", "/api/security/settings")
        .match_query(Matcher::UrlEncoded("userId".into(), USER.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "pinLockEnabled": pin_enabled,
                "biometricEnabled": false,
                "lockOnBackground": true,
            })
            .to_string(),
        )
        .create_async()
        .await
}

async fn verify_mock(server: &mut ServerGuard, pin: &str, success: bool) -> Mock {
    server
        .mock("POST", "/api/security/verify-pin")
        .match_body(Matcher::Json(json!({ "pin": pin, "userId": USER })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "success": success }).to_string())
        .create_async()
        .await
}

/// Locked start, wrong PIN, right PIN, background re-lock
#[tokio::test]
async fn test_unlock_and_relock_workflow() -> anyhow::Result<()> {
    init_tracing();

    // ==========================================
    // STEP 1: Mount against a PIN-protected account
    // ==========================================
    let mut server = Server::new_async().await;
    let _settings = settings_mock(&mut server, true).await;
    let _wrong = verify_mock(&mut server, "111111", false).await;
    let right = verify_mock(&mut server, "123456", true).await;

    let sessions = TempDir::new()?;
    let (lock, _events) = build_lock(&server, LockConfig::primary(), &sessions);

    let snapshot = lock.mount(UserId::from(USER)).await?;
    assert_eq!(snapshot.phase, LockPhase::Locked);

    // ==========================================
    // STEP 2: Wrong PIN is counted
    // ==========================================
    assert_eq!(
        lock.submit_pin("111111").await?,
        PinOutcome::Rejected {
            attempts_remaining: 4
        }
    );

    // ==========================================
    // STEP 3: Right PIN unlocks and writes the session marker
    // ==========================================
    assert_eq!(lock.submit_pin("123456").await?, PinOutcome::Unlocked);
    right.assert_async().await;

    let marker = sessions.path().join("app_unlocked.json");
    assert!(marker.exists());
    assert_eq!(lock.snapshot().failed_attempts, 0);

    // ==========================================
    // STEP 4: A second controller in the same session starts unlocked
    // ==========================================
    let (reloaded, _) = build_lock(&server, LockConfig::primary(), &sessions);
    assert_eq!(
        reloaded.mount(UserId::from(USER)).await?.phase,
        LockPhase::Unlocked
    );

    // ==========================================
    // STEP 5: Backgrounding locks and removes the marker
    // ==========================================
    lock.handle_lifecycle(HostEvent::VisibilityChanged { hidden: true });
    assert_eq!(lock.phase(), LockPhase::Locked);
    assert!(!marker.exists());

    Ok(())
}

#[tokio::test]
async fn test_pin_setup_workflow() -> anyhow::Result<()> {
    init_tracing();

    let mut server = Server::new_async().await;
    let settings_off = settings_mock(&mut server, false).await;

    let sessions = TempDir::new()?;
    let (lock, mut events) = build_lock(&server, LockConfig::compliance(), &sessions);
    assert_eq!(
        lock.mount(UserId::from(USER)).await?.phase,
        LockPhase::Unlocked
    );

    lock.begin_pin_setup(None)?;

    // The server reports the PIN as enabled once it has been stored
    settings_off.remove_async().await;
    let _settings_on = settings_mock(&mut server, true).await;
    let set_pin = server
        .mock("POST", "/api/security/pin")
        .match_body(Matcher::Json(json!({ "pin": "246810", "userId": USER })))
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .expect(1)
        .create_async()
        .await;

    assert_eq!(
        lock.submit_setup_entry("246810").await?,
        SetupStep::AwaitingConfirm
    );
    assert_eq!(
        lock.submit_setup_entry("246811").await?,
        SetupStep::Mismatch
    );
    assert_eq!(
        lock.submit_setup_entry("246810").await?,
        SetupStep::Completed
    );
    set_pin.assert_async().await;

    assert_eq!(lock.phase(), LockPhase::Unlocked);
    assert!(lock.settings().is_some_and(|s| s.pin_enabled));
    assert!(sessions.path().join("safe_app_unlocked.json").exists());

    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        completed |= event == LockEvent::PinSetupCompleted;
    }
    assert!(completed);

    Ok(())
}

#[tokio::test]
async fn test_server_failures() -> anyhow::Result<()> {
    init_tracing();

    // Settings unavailable: the app stays usable
    let mut down = Server::new_async().await;
    let _settings = down
        .mock("GET", "/api/security/settings")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let sessions = TempDir::new()?;
    let (lock, _) = build_lock(&down, LockConfig::primary(), &sessions);
    let err = lock.mount(UserId::from(USER)).await.unwrap_err();
    assert!(matches!(err, LockError::Api(_)));
    assert_eq!(lock.phase(), LockPhase::Unlocked);

    // Verification unavailable: counted as a failed attempt
    let mut flaky = Server::new_async().await;
    let _settings = settings_mock(&mut flaky, true).await;
    let _verify = flaky
        .mock("POST", "/api/security/verify-pin")
        .with_status(500)
        .create_async()
        .await;

    let (lock, _) = build_lock(&flaky, LockConfig::primary(), &sessions);
    lock.mount(UserId::from(USER)).await?;
    assert_eq!(
        lock.submit_pin("123456").await?,
        PinOutcome::Rejected {
            attempts_remaining: 4
        }
    );
    assert_eq!(lock.phase(), LockPhase::Locked);

    Ok(())
}

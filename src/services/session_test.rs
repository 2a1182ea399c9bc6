use super::*;
use crate::net::test_helpers::{MockTransport, mock_client};
use serde_json::{Value, json};

fn context(mock: &Arc<MockTransport>) -> SessionContext {
    SessionContext::new(mock_client(mock), SessionSettings::default())
}

fn context_with_policy(mock: &Arc<MockTransport>, refresh_failure: RefreshFailurePolicy) -> SessionContext {
    let settings = SessionSettings { refresh_failure, ..SessionSettings::default() };
    SessionContext::new(mock_client(mock), settings)
}

fn person(flags: &[&str]) -> Value {
    json!({ "ok": true, "person": { "email": "a@b.com", "user_name": "bob", "flags": flags } })
}

async fn logged_in(mock: &Arc<MockTransport>, session: &SessionContext, flags: &[&str]) {
    mock.reply("/user/login", json!({ "ok": true, "token": "T1" }));
    mock.reply("/user/profile", person(flags));
    session.login("a@b.com", "pw").await.expect("login should succeed");
}

async fn wait_for_calls(mock: &MockTransport, path: &str, count: usize) {
    for _ in 0..200 {
        if mock.calls(path) >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("expected {count} call(s) to {path}, saw {}", mock.calls(path));
}

// =============================================================================
// login / profile
// =============================================================================

#[tokio::test]
async fn login_then_profile_yields_full_session() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &["x", "y"]).await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.token, "T1");
    assert_eq!(snapshot.email, "a@b.com");
    assert_eq!(snapshot.user_name, "bob");
    assert_eq!(snapshot.flags.as_slice(), ["x", "y"]);
    assert_eq!(snapshot.error, "");
    assert_eq!(session.phase(), Phase::LoggedIn);
}

#[tokio::test]
async fn login_scenario_fetches_profile_with_new_token() {
    let mock = MockTransport::new();
    let session = context(&mock);
    assert_eq!(session.phase(), Phase::LoggedOut);

    logged_in(&mock, &session, &["x"]).await;

    let profile = mock.last_request("/user/profile").expect("profile fetched after login");
    assert_eq!(profile.options.header("X-API-Key"), Some("T1"));
    let snapshot = session.snapshot();
    assert_eq!(snapshot.token, "T1");
    assert_eq!(snapshot.flags.as_slice(), ["x"]);
    assert!(session.refresh_scheduled());
}

#[tokio::test]
async fn rejected_login_keeps_token_empty_and_shows_server_error() {
    let mock = MockTransport::new();
    mock.reply("/user/login", json!({ "ok": false, "error": "Wrong password" }));
    let session = context(&mock);

    let err = session.login("a@b.com", "bad").await.unwrap_err();
    assert_eq!(err, SessionError::Application("Wrong password".into()));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.token, "");
    assert_eq!(snapshot.error, "Wrong password");
    assert_eq!(mock.calls("/user/profile"), 0);
    assert!(!session.refresh_scheduled());
}

#[tokio::test]
async fn login_transport_failure_shows_generic_message() {
    let mock = MockTransport::new();
    mock.fail("/user/login", ApiError::Transport("connection refused".into()));
    let session = context(&mock);

    let err = session.login("a@b.com", "pw").await.unwrap_err();
    assert!(matches!(err, SessionError::Transport { ref message, .. } if message == LOGIN_FAILED));
    assert_eq!(session.snapshot().error, LOGIN_FAILED);
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn login_reply_without_ok_shows_generic_message() {
    let mock = MockTransport::new();
    mock.reply("/user/login", json!({ "token": "T1" }));
    let session = context(&mock);

    let err = session.login("a@b.com", "pw").await.unwrap_err();
    assert!(matches!(err, SessionError::Transport { .. }));
    assert_eq!(session.snapshot().error, LOGIN_FAILED);
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn login_requires_both_fields() {
    let mock = MockTransport::new();
    let session = context(&mock);

    let err = session.login("a@b.com", "").await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert!(!session.snapshot().error.is_empty());
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn login_while_logged_in_is_rejected() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &[]).await;

    let err = session.login("c@d.com", "pw").await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert_eq!(mock.calls("/user/login"), 1);
    assert_eq!(session.snapshot().token, "T1");
}

#[tokio::test]
async fn phase_reports_login_in_flight() {
    let mock = MockTransport::new();
    mock.reply("/user/login", json!({ "ok": true, "token": "T1" }));
    mock.reply("/user/profile", person(&[]));
    let gate = mock.hold("/user/login");
    let session = context(&mock);

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.login("a@b.com", "pw").await }
    });
    wait_for_calls(&mock, "/user/login", 1).await;
    assert_eq!(session.phase(), Phase::LoggingIn);

    gate.release();
    task.await.expect("login task").expect("login should succeed");
    assert_eq!(session.phase(), Phase::LoggedIn);
}

#[tokio::test]
async fn repeated_profile_fetch_does_not_duplicate_flags() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &["x"]).await;

    mock.reply("/user/profile", person(&["x", "y"]));
    session.fetch_profile().await.expect("second fetch");
    assert_eq!(session.snapshot().flags.as_slice(), ["x", "y"]);
}

#[tokio::test]
async fn profile_failure_keeps_session_logged_in() {
    let mock = MockTransport::new();
    mock.reply("/user/login", json!({ "ok": true, "token": "T1" }));
    mock.reply("/user/profile", json!({ "ok": false, "error": "Invalid token" }));
    let session = context(&mock);

    let err = session.login("a@b.com", "pw").await.unwrap_err();
    assert_eq!(err, SessionError::Application("Invalid token".into()));
    let snapshot = session.snapshot();
    assert_eq!(snapshot.token, "T1");
    assert_eq!(snapshot.error, "Invalid token");
}

#[tokio::test]
async fn resume_adopts_token_and_loads_profile() {
    let mock = MockTransport::new();
    mock.reply("/user/profile", person(&["x"]));
    let session = context(&mock);

    session.resume(" T9 ").await.expect("resume should succeed");
    assert_eq!(session.snapshot().token, "T9");
    assert_eq!(session.snapshot().email, "a@b.com");
    assert_eq!(session.resume("  ").await.unwrap_err(), SessionError::NotAuthenticated);
}

#[tokio::test]
async fn operations_need_a_token() {
    let mock = MockTransport::new();
    let session = context(&mock);

    assert_eq!(session.fetch_profile().await.unwrap_err(), SessionError::NotAuthenticated);
    assert_eq!(session.add_flag("x").await.unwrap_err(), SessionError::NotAuthenticated);
    assert_eq!(session.remove_flag("x").await.unwrap_err(), SessionError::NotAuthenticated);
    assert_eq!(session.refresh_token().await.unwrap_err(), SessionError::NotAuthenticated);
    assert!(mock.requests().is_empty());
}

// =============================================================================
// logout / stale replies
// =============================================================================

#[tokio::test]
async fn logout_resets_everything() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &["x", "y"]).await;

    session.logout();
    assert_eq!(session.snapshot(), Session::default());
    assert_eq!(session.phase(), Phase::LoggedOut);
    assert!(!session.refresh_scheduled());

    session.logout();
    assert_eq!(session.snapshot(), Session::default());
}

#[tokio::test]
async fn flag_reply_after_logout_is_discarded() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &[]).await;

    mock.reply("/user/flag/add", json!({ "ok": true }));
    let gate = mock.hold("/user/flag/add");
    let task = tokio::spawn({
        let session = session.clone();
        async move { session.add_flag("x").await }
    });
    wait_for_calls(&mock, "/user/flag/add", 1).await;

    session.logout();
    gate.release();

    let result = task.await.expect("add task");
    assert_eq!(result.unwrap_err(), SessionError::SessionEnded);
    assert_eq!(session.snapshot(), Session::default());
}

#[tokio::test]
async fn login_reply_after_logout_is_discarded() {
    let mock = MockTransport::new();
    mock.reply("/user/login", json!({ "ok": true, "token": "T1" }));
    let gate = mock.hold("/user/login");
    let session = context(&mock);

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.login("a@b.com", "pw").await }
    });
    wait_for_calls(&mock, "/user/login", 1).await;

    session.logout();
    gate.release();

    assert_eq!(task.await.expect("login task").unwrap_err(), SessionError::SessionEnded);
    assert_eq!(session.snapshot().token, "");
    assert_eq!(mock.calls("/user/profile"), 0);
}

#[tokio::test]
async fn subscribers_see_each_change() {
    let mock = MockTransport::new();
    let session = context(&mock);
    let mut updates = session.subscribe();

    logged_in(&mock, &session, &["x"]).await;
    assert!(updates.has_changed().expect("sender alive"));
    assert_eq!(updates.borrow_and_update().email, "a@b.com");

    session.logout();
    assert!(updates.has_changed().expect("sender alive"));
    assert!(!updates.borrow_and_update().is_authenticated());
}

// =============================================================================
// flags
// =============================================================================

#[tokio::test]
async fn repeated_adds_keep_a_single_copy() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &[]).await;

    for _ in 0..3 {
        mock.reply("/user/flag/add", json!({ "ok": true }));
    }
    assert!(session.add_flag("x").await.expect("first add"));
    assert!(!session.add_flag("x").await.expect("second add"));
    assert!(!session.add_flag(" x ").await.expect("third add"));

    assert_eq!(session.snapshot().flags.as_slice(), ["x"]);
    assert_eq!(mock.calls("/user/flag/add"), 3);
}

#[tokio::test]
async fn concurrent_adds_of_same_flag_are_serialized() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &[]).await;

    mock.reply("/user/flag/add", json!({ "ok": true }));
    mock.reply("/user/flag/add", json!({ "ok": true }));
    let gate = mock.hold("/user/flag/add");

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.add_flag("x").await }
    });
    let second = tokio::spawn({
        let session = session.clone();
        async move { session.add_flag("x").await }
    });
    wait_for_calls(&mock, "/user/flag/add", 1).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(mock.calls("/user/flag/add"), 1, "second add waits for the first reply");
    assert_eq!(session.pending_flags().in_flight("x"), 2);

    gate.release();
    gate.release();
    let first = first.await.expect("first task").expect("first add");
    let second = second.await.expect("second task").expect("second add");

    assert!(first ^ second, "exactly one add changes the set");
    assert_eq!(session.snapshot().flags.as_slice(), ["x"]);
    assert!(session.pending_flags().is_idle());
}

#[tokio::test]
async fn remove_issued_during_add_applies_after_it() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &[]).await;

    mock.reply("/user/flag/add", json!({ "ok": true }));
    mock.reply("/user/flag/remove", json!({ "ok": true }));
    let gate = mock.hold("/user/flag/add");

    let add = tokio::spawn({
        let session = session.clone();
        async move { session.add_flag("x").await }
    });
    wait_for_calls(&mock, "/user/flag/add", 1).await;
    let remove = tokio::spawn({
        let session = session.clone();
        async move { session.remove_flag("x").await }
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(mock.calls("/user/flag/remove"), 0);

    gate.release();
    assert!(add.await.expect("add task").expect("add"));
    assert!(remove.await.expect("remove task").expect("remove"));
    assert!(session.snapshot().flags.is_empty());
}

#[tokio::test]
async fn removing_absent_flag_leaves_set_unchanged() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &["x"]).await;

    mock.reply("/user/flag/remove", json!({ "ok": true }));
    assert!(!session.remove_flag("y").await.expect("remove"));
    assert_eq!(session.snapshot().flags.as_slice(), ["x"]);

    mock.reply("/user/flag/remove", json!({ "ok": true }));
    assert!(session.remove_flag("x").await.expect("remove"));
    assert!(session.snapshot().flags.is_empty());
}

#[tokio::test]
async fn padded_flag_is_removed_like_it_was_added() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &[]).await;

    mock.reply("/user/flag/add", json!({ "ok": true }));
    mock.reply("/user/flag/remove", json!({ "ok": true }));
    assert!(session.add_flag(" x ").await.expect("add"));
    assert!(session.remove_flag(" x ").await.expect("remove"));

    let request = mock.last_request("/user/flag/remove").expect("remove recorded");
    assert_eq!(request.body, Some(json!({ "flag": "x" })));
    assert!(session.snapshot().flags.is_empty());
    assert!(session.pending_flags().is_idle());
}

#[tokio::test]
async fn blank_flag_removal_is_rejected_locally() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &["x"]).await;

    assert!(matches!(session.remove_flag("   ").await, Err(SessionError::Validation(_))));
    assert_eq!(mock.calls("/user/flag/remove"), 0);
    assert_eq!(session.snapshot().flags.as_slice(), ["x"]);
}

#[tokio::test]
async fn failed_flag_add_leaves_set_unchanged() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &["x"]).await;

    mock.reply("/user/flag/add", json!({ "ok": false, "error": "Flag too long" }));
    let err = session.add_flag("y").await.unwrap_err();
    assert_eq!(err, SessionError::Application("Flag too long".into()));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.flags.as_slice(), ["x"]);
    assert_eq!(snapshot.error, "Flag too long");
}

#[tokio::test]
async fn blank_flag_is_rejected_locally() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &[]).await;

    assert!(matches!(session.add_flag("  ").await, Err(SessionError::Validation(_))));
    assert_eq!(mock.calls("/user/flag/add"), 0);
}

// =============================================================================
// refresh
// =============================================================================

#[tokio::test]
async fn refresh_replaces_token() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &[]).await;

    mock.reply("/user/token", json!({ "ok": true, "token": "T2" }));
    session.refresh_token().await.expect("refresh");
    assert_eq!(session.snapshot().token, "T2");
    let request = mock.last_request("/user/token").expect("refresh recorded");
    assert_eq!(request.options.header("X-API-Key"), Some("T1"));
}

#[tokio::test]
async fn rejected_refresh_logs_out_by_default() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &["x"]).await;

    mock.reply("/user/token", json!({ "ok": false, "error": "Token expired" }));
    let err = session.refresh_token().await.unwrap_err();
    assert_eq!(err, SessionError::Application("Token expired".into()));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.token, "");
    assert!(snapshot.flags.is_empty());
    assert_eq!(snapshot.error, SESSION_EXPIRED);
    assert!(!session.refresh_scheduled());
}

#[tokio::test]
async fn rejected_refresh_keeps_token_under_keep_policy() {
    let mock = MockTransport::new();
    let session = context_with_policy(&mock, RefreshFailurePolicy::Keep);
    logged_in(&mock, &session, &["x"]).await;

    mock.reply("/user/token", json!({ "ok": false, "error": "Token expired" }));
    assert!(session.refresh_token().await.is_err());

    let snapshot = session.snapshot();
    assert_eq!(snapshot.token, "T1");
    assert_eq!(snapshot.error, "");
}

#[tokio::test]
async fn refresh_transport_failure_keeps_token() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &[]).await;

    mock.fail("/user/token", ApiError::Transport("timed out".into()));
    let err = session.refresh_token().await.unwrap_err();
    assert!(matches!(err, SessionError::Transport { .. }));
    assert_eq!(session.snapshot().token, "T1");
    assert!(session.refresh_scheduled());
}

#[tokio::test(start_paused = true)]
async fn scheduled_refresh_renews_token() {
    let mock = MockTransport::new();
    let settings = SessionSettings { refresh_interval: Duration::from_secs(60), ..SessionSettings::default() };
    let session = SessionContext::new(mock_client(&mock), settings);
    logged_in(&mock, &session, &[]).await;
    mock.reply("/user/token", json!({ "ok": true, "token": "T2" }));

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(mock.calls("/user/token"), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(mock.calls("/user/token"), 1);
    assert_eq!(session.snapshot().token, "T2");
}

#[tokio::test(start_paused = true)]
async fn zero_refresh_interval_uses_default_period() {
    let mock = MockTransport::new();
    let settings = SessionSettings { refresh_interval: Duration::ZERO, ..SessionSettings::default() };
    let session = SessionContext::new(mock_client(&mock), settings);
    logged_in(&mock, &session, &[]).await;
    mock.reply("/user/token", json!({ "ok": true, "token": "T2" }));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(session.refresh_scheduled());
    assert_eq!(mock.calls("/user/token"), 0);

    tokio::time::sleep(Duration::from_secs(DEFAULT_REFRESH_SECS)).await;
    assert_eq!(mock.calls("/user/token"), 1);
    assert_eq!(session.snapshot().token, "T2");
}

#[tokio::test(start_paused = true)]
async fn logout_stops_scheduled_refresh() {
    let mock = MockTransport::new();
    let settings = SessionSettings { refresh_interval: Duration::from_secs(60), ..SessionSettings::default() };
    let session = SessionContext::new(mock_client(&mock), settings);
    logged_in(&mock, &session, &[]).await;

    session.logout();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(mock.calls("/user/token"), 0);
}

// =============================================================================
// registration / profile updates
// =============================================================================

#[tokio::test]
async fn registration_mismatch_makes_no_call() {
    let mock = MockTransport::new();
    let session = context(&mock);

    let err = session.register("a@b.com", "pw1", "pw2").await.unwrap_err();
    assert_eq!(err, SessionError::Validation(PASSWORD_MISMATCH.into()));
    assert_eq!(session.snapshot().error, "Password and confirm password aren't the same.");
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn registration_rejects_malformed_email() {
    let mock = MockTransport::new();
    let session = context(&mock);

    let err = session.register("not-an-email", "pw", "pw").await.unwrap_err();
    assert_eq!(err, SessionError::Validation(INVALID_EMAIL.into()));
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn registration_success_clears_error_and_returns_message() {
    let mock = MockTransport::new();
    let session = context(&mock);
    let _ = session.register("a@b.com", "x", "y").await;

    mock.reply("/user/registration", json!({ "ok": true, "message": "Check your inbox" }));
    let message = session.register("a@b.com", "pw", "pw").await.expect("register");
    assert_eq!(message.as_deref(), Some("Check your inbox"));
    assert_eq!(session.snapshot().error, "");
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn registration_succeeds_when_session_changes_meanwhile() {
    let mock = MockTransport::new();
    mock.reply("/user/registration", json!({ "ok": true, "message": "Check your inbox" }));
    let gate = mock.hold("/user/registration");
    let session = context(&mock);

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.register("a@b.com", "pw", "pw").await }
    });
    wait_for_calls(&mock, "/user/registration", 1).await;
    session.logout();
    gate.release();

    let message = task.await.expect("register task").expect("register");
    assert_eq!(message.as_deref(), Some("Check your inbox"));
}

#[tokio::test]
async fn registration_transport_failure_shows_generic_message() {
    let mock = MockTransport::new();
    mock.fail("/user/registration", ApiError::Transport("reset by peer".into()));
    let session = context(&mock);

    assert!(session.register("a@b.com", "pw", "pw").await.is_err());
    assert_eq!(session.snapshot().error, REGISTRATION_FAILED);
}

#[tokio::test]
async fn update_email_validates_then_applies() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &[]).await;

    let err = session.update_email("nope").await.unwrap_err();
    assert_eq!(err, SessionError::Validation(INVALID_EMAIL.into()));
    assert_eq!(mock.calls("/user/update"), 0);

    mock.reply("/user/update", json!({ "ok": true }));
    session.update_email("new@b.com").await.expect("update");
    assert_eq!(session.snapshot().email, "new@b.com");
    assert_eq!(session.snapshot().error, "");
}

#[tokio::test]
async fn update_user_name_applies_after_confirmation() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &[]).await;

    mock.reply("/user/update", json!({ "ok": false, "error": "Username taken" }));
    assert!(session.update_user_name("alice").await.is_err());
    assert_eq!(session.snapshot().user_name, "bob");

    mock.reply("/user/update", json!({ "ok": true }));
    session.update_user_name("alice").await.expect("update");
    assert_eq!(session.snapshot().user_name, "alice");
}

#[tokio::test]
async fn change_password_checks_confirmation() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &[]).await;

    let err = session.change_password("a", "b").await.unwrap_err();
    assert_eq!(err, SessionError::Validation(NEW_PASSWORD_MISMATCH.into()));
    assert_eq!(mock.calls("/user/password"), 0);

    mock.reply("/user/password", json!({ "ok": true, "message": "Password changed" }));
    let message = session.change_password("new", "new").await.expect("change");
    assert_eq!(message.as_deref(), Some("Password changed"));
}

#[tokio::test]
async fn delete_account_ends_session() {
    let mock = MockTransport::new();
    let session = context(&mock);
    logged_in(&mock, &session, &["x"]).await;

    mock.reply("/user/delete", json!({ "ok": true }));
    session.delete_account("pw").await.expect("delete");
    assert_eq!(session.snapshot(), Session::default());
    assert!(!session.refresh_scheduled());
}

#[tokio::test]
async fn password_reset_flow_runs_logged_out() {
    let mock = MockTransport::new();
    let session = context(&mock);

    mock.reply("/user/forgotten_pwd", json!({ "ok": true, "message": "Mail sent" }));
    let sent = session.request_password_reset("a@b.com").await.expect("request");
    assert_eq!(sent.as_deref(), Some("Mail sent"));

    let err = session.reset_password("R1", "a", "b").await.unwrap_err();
    assert_eq!(err, SessionError::Validation(PASSWORD_MISMATCH.into()));

    mock.reply("/user/change_forgotten_pwd", json!({ "ok": true }));
    session.reset_password("R1", "pw", "pw").await.expect("reset");
    assert_eq!(mock.calls("/user/change_forgotten_pwd"), 1);
}

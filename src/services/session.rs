//! Session context: token lifecycle, profile loading and flag sync.
//!
//! ARCHITECTURE
//! ============
//! `SessionContext` is a cheap clone over shared state. The current
//! [`Session`] lives inside a `watch` channel so views can subscribe to
//! changes; every reply is applied in a single `send_modify`, which makes each
//! update atomic from a subscriber's point of view.
//!
//! Each login starts a new epoch. Operations capture the epoch when they are
//! issued and drop their result if a logout or re-login happened before the
//! reply arrived, so a late reply can never repopulate a cleared session.
//!
//! TRADE-OFFS
//! ==========
//! Flag changes are applied only after the server confirms them. That costs
//! a round trip of latency in the view, but local state never shows a flag
//! the server does not have. Overlapping calls for the same flag wait on the
//! pending tracker instead of racing.
//!
//! LOCKING
//! =======
//! The lifecycle mutex is always taken before the watch lock and neither is
//! held across an `.await`. Callers must not keep a `watch::Ref` alive while
//! invoking an operation.

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::refresh::{RefreshHandle, spawn_refresh_task};
use crate::config::{ConsoleConfig, DEFAULT_REFRESH_SECS, RefreshFailurePolicy};
use crate::net::api::ApiClient;
use crate::net::types::{ApiError, ProfileUpdate};
use crate::state::flags::PendingFlags;
use crate::state::session::{Phase, Session};
use crate::util::email::is_valid_email;

pub const PASSWORD_MISMATCH: &str = "Password and confirm password aren't the same.";
pub const NEW_PASSWORD_MISMATCH: &str = "Password and its confirmation aren't equal.";
pub const INVALID_EMAIL: &str = "Email is not in the right format.";
pub const SESSION_EXPIRED: &str = "Your session has expired. Log in again.";

pub const LOGIN_FAILED: &str = "Could not log in.";
pub const REGISTRATION_FAILED: &str = "Could not register the account.";
const PROFILE_FAILED: &str = "Could not load the profile.";
const REFRESH_FAILED: &str = "Could not renew the session.";
const UPDATE_FAILED: &str = "Could not update the profile.";
const FLAG_FAILED: &str = "Could not update the flags.";
const PASSWORD_FAILED: &str = "Could not change the password.";
const DELETE_FAILED: &str = "Could not delete the account.";
const RESET_FAILED: &str = "Could not reset the password.";

// =============================================================================
// ERROR
// =============================================================================

/// Outcome of a failed session operation.
///
/// `Display` is the text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Input rejected locally; no request was sent.
    #[error("{0}")]
    Validation(String),

    /// The server answered `ok == false`.
    #[error("{0}")]
    Application(String),

    /// The request itself failed; `cause` is kept for logs only.
    #[error("{message}")]
    Transport { message: String, cause: String },

    /// The operation needs a token and the session has none.
    #[error("not logged in")]
    NotAuthenticated,

    /// Logout or re-login happened while the request was in flight.
    #[error("session ended before the reply arrived")]
    SessionEnded,
}

impl SessionError {
    fn from_api(error: ApiError, fallback: &str) -> Self {
        match error {
            ApiError::Application(message) => Self::Application(message),
            other => Self::Transport { message: fallback.to_owned(), cause: other.to_string() },
        }
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub refresh_interval: Duration,
    pub refresh_failure: RefreshFailurePolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_SECS),
            refresh_failure: RefreshFailurePolicy::default(),
        }
    }
}

impl From<&ConsoleConfig> for SessionSettings {
    fn from(config: &ConsoleConfig) -> Self {
        Self { refresh_interval: config.refresh_interval, refresh_failure: config.refresh_failure }
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

struct Shared {
    api: ApiClient,
    settings: SessionSettings,
    state: watch::Sender<Session>,
    lifecycle: Mutex<Lifecycle>,
    pending: PendingFlags,
}

#[derive(Default)]
struct Lifecycle {
    epoch: u64,
    logins_in_flight: usize,
    refresher: Option<RefreshHandle>,
}

impl Shared {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the console's single session. Clones share state.
#[derive(Clone)]
pub struct SessionContext {
    shared: Arc<Shared>,
}

/// Non-owning handle held by the refresh task.
#[derive(Clone)]
pub(crate) struct WeakSession {
    shared: Weak<Shared>,
}

impl WeakSession {
    pub(crate) fn upgrade(&self) -> Option<SessionContext> {
        self.shared.upgrade().map(|shared| SessionContext { shared })
    }
}

/// Counts an in-flight login for [`Phase::LoggingIn`].
struct LoginAttempt<'a> {
    shared: &'a Shared,
}

impl Drop for LoginAttempt<'_> {
    fn drop(&mut self) {
        let mut lifecycle = self.shared.lifecycle();
        lifecycle.logins_in_flight = lifecycle.logins_in_flight.saturating_sub(1);
    }
}

impl SessionContext {
    /// A zero refresh interval falls back to the default period.
    #[must_use]
    pub fn new(api: ApiClient, mut settings: SessionSettings) -> Self {
        if settings.refresh_interval.is_zero() {
            warn!(default_secs = DEFAULT_REFRESH_SECS, "zero refresh interval; using the default");
            settings.refresh_interval = Duration::from_secs(DEFAULT_REFRESH_SECS);
        }
        let shared = Shared {
            api,
            settings,
            state: watch::Sender::new(Session::default()),
            lifecycle: Mutex::new(Lifecycle::default()),
            pending: PendingFlags::new(),
        };
        Self { shared: Arc::new(shared) }
    }

    /// Build a context talking to the configured API over `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ConsoleConfig) -> Result<Self, ApiError> {
        Ok(Self::new(ApiClient::from_config(config)?, SessionSettings::from(config)))
    }

    pub(crate) fn downgrade(&self) -> WeakSession {
        WeakSession { shared: Arc::downgrade(&self.shared) }
    }

    // -------------------------------------------------------------------------
    // READ ACCESS
    // -------------------------------------------------------------------------

    /// Receiver notified after every change to the session.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.shared.state.borrow().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.shared.state.borrow().is_authenticated()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        let lifecycle = self.shared.lifecycle();
        if self.shared.state.borrow().is_authenticated() {
            Phase::LoggedIn
        } else if lifecycle.logins_in_flight > 0 {
            Phase::LoggingIn
        } else {
            Phase::LoggedOut
        }
    }

    /// `true` while a refresh task is scheduled for the current session.
    #[must_use]
    pub fn refresh_scheduled(&self) -> bool {
        self.shared
            .lifecycle()
            .refresher
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    #[must_use]
    pub fn pending_flags(&self) -> &PendingFlags {
        &self.shared.pending
    }

    // -------------------------------------------------------------------------
    // TOKEN LIFECYCLE
    // -------------------------------------------------------------------------

    /// Log in with credentials, then load the profile.
    ///
    /// # Errors
    ///
    /// Validation, server or transport failures. The session stays logged
    /// out and `error` carries the message. A profile failure after a
    /// successful login leaves the session logged in.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), SessionError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(self.reject("Enter both email and password."));
        }
        if self.is_authenticated() {
            return Err(self.reject("Log out before logging in again."));
        }

        let (epoch, attempt) = self.begin_login();
        let result = self.shared.api.login(email, password).await;
        drop(attempt);

        match result {
            Ok(token) => {
                self.adopt_token(Some(epoch), token)?;
                info!("login succeeded");
                self.fetch_profile().await
            }
            Err(e) => Err(self.fail(epoch, e, LOGIN_FAILED)),
        }
    }

    /// Continue a session from a token obtained elsewhere.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` for a blank token, otherwise the profile fetch
    /// result.
    pub async fn resume(&self, token: &str) -> Result<(), SessionError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SessionError::NotAuthenticated);
        }
        self.adopt_token(None, token.to_owned())?;
        info!("session resumed from token");
        self.fetch_profile().await
    }

    /// Load email, user name and flags. Server flags are merged into the
    /// local set without duplicates.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` when logged out, otherwise server or transport
    /// failures.
    pub async fn fetch_profile(&self) -> Result<(), SessionError> {
        let (epoch, token) = self.credentials()?;
        let result = self.shared.api.profile(&token).await;
        match result {
            Ok(person) => {
                let flags = person.flags.len();
                self.apply_if_current(epoch, |session| session.apply_person(person))?;
                debug!(flags, "profile loaded");
                Ok(())
            }
            Err(e) => Err(self.fail(epoch, e, PROFILE_FAILED)),
        }
    }

    /// Trade the current token for a renewed one.
    ///
    /// A server rejection ends the session under
    /// [`RefreshFailurePolicy::Logout`]. Transport failures never do, and
    /// neither touches the visible error line.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` when logged out, otherwise server or transport
    /// failures.
    pub async fn refresh_token(&self) -> Result<(), SessionError> {
        let (epoch, token) = self.credentials()?;
        let result = self.shared.api.refresh_token(&token).await;
        match result {
            Ok(renewed) => {
                self.apply_if_current(epoch, |session| session.token = renewed)?;
                debug!("session token renewed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "token refresh failed");
                let rejected = matches!(e, ApiError::Application(_));
                let policy = self.shared.settings.refresh_failure;
                if rejected
                    && policy == RefreshFailurePolicy::Logout
                    && self.end_session(Some(epoch), Some(SESSION_EXPIRED))
                {
                    info!("session ended after rejected token refresh");
                }
                Err(SessionError::from_api(e, REFRESH_FAILED))
            }
        }
    }

    /// Clear the token and everything derived from it. No network call.
    pub fn logout(&self) {
        self.end_session(None, None);
        info!("logged out");
    }

    // -------------------------------------------------------------------------
    // FLAGS
    // -------------------------------------------------------------------------

    /// Add a flag once the server confirms it. Returns whether the local set
    /// changed (`false` when it was already present).
    ///
    /// # Errors
    ///
    /// Validation, server or transport failures; the flag set is unchanged.
    pub async fn add_flag(&self, flag: &str) -> Result<bool, SessionError> {
        let flag = flag.trim();
        if flag.is_empty() {
            return Err(self.reject("Enter a flag first."));
        }
        if !self.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }

        let ticket = self.shared.pending.acquire(flag).await;
        let (epoch, token) = self.credentials()?;
        let result = self.shared.api.add_flag(&token, flag).await;
        match result {
            Ok(()) => {
                let mut inserted = false;
                self.apply_if_current(epoch, |session| {
                    inserted = session.flags.insert(flag);
                    session.error.clear();
                })?;
                debug!(flag, ticket = ticket.number(), inserted, "flag add confirmed");
                Ok(inserted)
            }
            Err(e) => Err(self.fail(epoch, e, FLAG_FAILED)),
        }
    }

    /// Remove a flag once the server confirms it. Returns whether the local
    /// set changed (`false` when it was not present).
    ///
    /// # Errors
    ///
    /// Validation, server or transport failures; the flag set is unchanged.
    pub async fn remove_flag(&self, flag: &str) -> Result<bool, SessionError> {
        let flag = flag.trim();
        if flag.is_empty() {
            return Err(self.reject("Enter a flag first."));
        }
        if !self.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }

        let ticket = self.shared.pending.acquire(flag).await;
        let (epoch, token) = self.credentials()?;
        let result = self.shared.api.remove_flag(&token, flag).await;
        match result {
            Ok(()) => {
                let mut removed = false;
                self.apply_if_current(epoch, |session| {
                    removed = session.flags.remove(flag);
                    session.error.clear();
                })?;
                debug!(flag, ticket = ticket.number(), removed, "flag removal confirmed");
                Ok(removed)
            }
            Err(e) => Err(self.fail(epoch, e, FLAG_FAILED)),
        }
    }

    // -------------------------------------------------------------------------
    // PROFILE UPDATES
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// Malformed email (no request sent), server or transport failures.
    pub async fn update_email(&self, email: &str) -> Result<(), SessionError> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(self.reject(INVALID_EMAIL));
        }
        let (epoch, token) = self.credentials()?;
        let update = ProfileUpdate { new_email: Some(email), ..ProfileUpdate::default() };
        let result = self.shared.api.update_profile(&token, &update).await;
        match result {
            Ok(()) => self.apply_if_current(epoch, |session| {
                session.email = email.to_owned();
                session.error.clear();
            }),
            Err(e) => Err(self.fail(epoch, e, UPDATE_FAILED)),
        }
    }

    /// # Errors
    ///
    /// Blank name (no request sent), server or transport failures.
    pub async fn update_user_name(&self, user_name: &str) -> Result<(), SessionError> {
        let user_name = user_name.trim();
        if user_name.is_empty() {
            return Err(self.reject("Enter a new username."));
        }
        let (epoch, token) = self.credentials()?;
        let update = ProfileUpdate { new_user_name: Some(user_name), ..ProfileUpdate::default() };
        let result = self.shared.api.update_profile(&token, &update).await;
        match result {
            Ok(()) => self.apply_if_current(epoch, |session| {
                session.user_name = user_name.to_owned();
                session.error.clear();
            }),
            Err(e) => Err(self.fail(epoch, e, UPDATE_FAILED)),
        }
    }

    /// Change the password of the logged-in account. Returns the server's
    /// confirmation message, if any.
    ///
    /// # Errors
    ///
    /// Mismatch or blank password (no request sent), server or transport
    /// failures.
    pub async fn change_password(&self, password: &str, confirm_password: &str) -> Result<Option<String>, SessionError> {
        if password != confirm_password {
            return Err(self.reject(NEW_PASSWORD_MISMATCH));
        }
        if password.is_empty() {
            return Err(self.reject("Enter a new password."));
        }
        let (epoch, token) = self.credentials()?;
        let result = self.shared.api.change_password(&token, password, confirm_password).await;
        match result {
            Ok(message) => {
                self.apply_if_current(epoch, |session| session.error.clear())?;
                info!("password changed");
                Ok(message)
            }
            Err(e) => Err(self.fail(epoch, e, PASSWORD_FAILED)),
        }
    }

    /// Delete the account and end the session.
    ///
    /// # Errors
    ///
    /// Blank password (no request sent), server or transport failures.
    pub async fn delete_account(&self, password: &str) -> Result<(), SessionError> {
        if password.is_empty() {
            return Err(self.reject("Enter your password to confirm."));
        }
        let (epoch, token) = self.credentials()?;
        let result = self.shared.api.delete_account(&token, password).await;
        match result {
            Ok(()) => {
                if !self.end_session(Some(epoch), None) {
                    return Err(SessionError::SessionEnded);
                }
                info!("account deleted");
                Ok(())
            }
            Err(e) => Err(self.fail(epoch, e, DELETE_FAILED)),
        }
    }

    // -------------------------------------------------------------------------
    // UNAUTHENTICATED FLOWS
    // -------------------------------------------------------------------------

    /// Create an account. Returns the server's confirmation message, if any.
    ///
    /// # Errors
    ///
    /// Mismatched passwords or malformed email (no request sent), server or
    /// transport failures.
    pub async fn register(&self, email: &str, password: &str, confirm_password: &str) -> Result<Option<String>, SessionError> {
        if password != confirm_password {
            return Err(self.reject(PASSWORD_MISMATCH));
        }
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(self.reject(INVALID_EMAIL));
        }
        if password.is_empty() {
            return Err(self.reject("Enter a password."));
        }

        let epoch = self.epoch();
        let result = self.shared.api.register(email, password, confirm_password).await;
        match result {
            Ok(message) => {
                self.clear_error_if_current(epoch);
                info!("account registered");
                Ok(message)
            }
            Err(e) => Err(self.fail(epoch, e, REGISTRATION_FAILED)),
        }
    }

    /// Ask the server to mail a password reset token for `id`.
    ///
    /// # Errors
    ///
    /// Blank id (no request sent), server or transport failures.
    pub async fn request_password_reset(&self, id: &str) -> Result<Option<String>, SessionError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(self.reject("Enter your email or user id."));
        }
        let epoch = self.epoch();
        let result = self.shared.api.request_password_reset(id).await;
        match result {
            Ok(message) => {
                self.clear_error_if_current(epoch);
                Ok(message)
            }
            Err(e) => Err(self.fail(epoch, e, RESET_FAILED)),
        }
    }

    /// Set a new password with a mailed reset token.
    ///
    /// # Errors
    ///
    /// Blank token, mismatched passwords (no request sent), server or
    /// transport failures.
    pub async fn reset_password(
        &self,
        reset_token: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<Option<String>, SessionError> {
        let reset_token = reset_token.trim();
        if reset_token.is_empty() {
            return Err(self.reject("Enter the reset token from the email."));
        }
        if password != confirm_password {
            return Err(self.reject(PASSWORD_MISMATCH));
        }
        if password.is_empty() {
            return Err(self.reject("Enter a password."));
        }
        let epoch = self.epoch();
        let result = self.shared.api.reset_password(reset_token, password, confirm_password).await;
        match result {
            Ok(message) => {
                self.clear_error_if_current(epoch);
                info!("password reset");
                Ok(message)
            }
            Err(e) => Err(self.fail(epoch, e, RESET_FAILED)),
        }
    }

    // -------------------------------------------------------------------------
    // INTERNALS
    // -------------------------------------------------------------------------

    /// Show `message` on the error line and return it as a validation error.
    pub(crate) fn reject(&self, message: &str) -> SessionError {
        self.shared.state.send_modify(|session| session.error = message.to_owned());
        SessionError::Validation(message.to_owned())
    }

    fn epoch(&self) -> u64 {
        self.shared.lifecycle().epoch
    }

    fn credentials(&self) -> Result<(u64, String), SessionError> {
        let lifecycle = self.shared.lifecycle();
        let token = self.shared.state.borrow().token.clone();
        if token.is_empty() {
            return Err(SessionError::NotAuthenticated);
        }
        Ok((lifecycle.epoch, token))
    }

    fn begin_login(&self) -> (u64, LoginAttempt<'_>) {
        let mut lifecycle = self.shared.lifecycle();
        lifecycle.logins_in_flight += 1;
        (lifecycle.epoch, LoginAttempt { shared: &self.shared })
    }

    /// Apply `change` unless the session moved to a new epoch since `epoch`.
    fn apply_if_current<F>(&self, epoch: u64, change: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut Session),
    {
        let lifecycle = self.shared.lifecycle();
        if lifecycle.epoch != epoch {
            debug!(issued = epoch, current = lifecycle.epoch, "discarding reply from ended session");
            return Err(SessionError::SessionEnded);
        }
        self.shared.state.send_modify(change);
        Ok(())
    }

    /// Clear the error line after an unauthenticated call. The call itself
    /// succeeded, so a session change meanwhile only skips the clear.
    fn clear_error_if_current(&self, epoch: u64) {
        if self.apply_if_current(epoch, |session| session.error.clear()).is_err() {
            debug!("session changed during request; error line left as is");
        }
    }

    /// Convert an API failure and show it, if its session is still current.
    fn fail(&self, epoch: u64, error: ApiError, fallback: &str) -> SessionError {
        let failure = SessionError::from_api(error, fallback);
        if let SessionError::Transport { cause, .. } = &failure {
            warn!(error = %cause, "identity request failed");
        }
        let message = failure.to_string();
        match self.apply_if_current(epoch, |session| session.error = message) {
            Ok(()) => failure,
            Err(ended) => ended,
        }
    }

    /// Start a new epoch holding `token` and schedule its refresh.
    fn adopt_token(&self, expected_epoch: Option<u64>, token: String) -> Result<u64, SessionError> {
        let mut lifecycle = self.shared.lifecycle();
        if expected_epoch.is_some_and(|epoch| epoch != lifecycle.epoch) {
            return Err(SessionError::SessionEnded);
        }
        lifecycle.epoch += 1;
        self.shared.state.send_modify(|session| {
            session.clear();
            session.token = token;
        });
        let refresher = spawn_refresh_task(self.downgrade(), self.shared.settings.refresh_interval);
        if let Some(previous) = lifecycle.refresher.replace(refresher) {
            previous.stop();
        }
        Ok(lifecycle.epoch)
    }

    /// Reset the session and cancel its refresh task. Returns `false` when
    /// `expected_epoch` no longer matches.
    fn end_session(&self, expected_epoch: Option<u64>, message: Option<&str>) -> bool {
        let mut lifecycle = self.shared.lifecycle();
        if expected_epoch.is_some_and(|epoch| epoch != lifecycle.epoch) {
            return false;
        }
        lifecycle.epoch += 1;
        let refresher = lifecycle.refresher.take();
        self.shared.state.send_modify(|session| {
            session.clear();
            if let Some(message) = message {
                session.error = message.to_owned();
            }
        });
        drop(lifecycle);
        if let Some(refresher) = refresher {
            refresher.stop();
        }
        true
    }
}

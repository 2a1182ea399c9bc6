//! Profile screen for the logged-in user: profile fields, flags, password
//! change and account deletion.

#[cfg(test)]
#[path = "user_panel_test.rs"]
mod tests;

use std::fmt::Write as _;

use super::double_input::DoubleInputForm;
use super::input::InputForm;
use super::tags::TagList;
use crate::services::session::{SessionContext, SessionError};
use crate::state::session::Session;

const PASSWORD_CHANGED: &str = "Password changed.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPanel {
    pub email: InputForm,
    pub user_name: InputForm,
    pub flag: InputForm,
    pub password: DoubleInputForm,
    /// Confirmation from the last successful password change.
    pub notice: Option<String>,
}

impl Default for UserPanel {
    fn default() -> Self {
        Self {
            email: InputForm::new("Email", "new email"),
            user_name: InputForm::new("Username", "new username"),
            flag: InputForm::new("Flag", "new flag"),
            password: DoubleInputForm::masked("New password"),
            notice: None,
        }
    }
}

impl UserPanel {
    /// # Errors
    ///
    /// Blank input, or whatever [`SessionContext::update_email`] reports.
    pub async fn submit_email(&mut self, session: &SessionContext) -> Result<(), SessionError> {
        let Some(email) = self.email.submit() else {
            return Err(session.reject("Enter a new email."));
        };
        session.update_email(&email).await
    }

    /// # Errors
    ///
    /// Blank input, or whatever [`SessionContext::update_user_name`] reports.
    pub async fn submit_user_name(&mut self, session: &SessionContext) -> Result<(), SessionError> {
        let Some(user_name) = self.user_name.submit() else {
            return Err(session.reject("Enter a new username."));
        };
        session.update_user_name(&user_name).await
    }

    /// Add the typed flag.
    ///
    /// # Errors
    ///
    /// Blank input, or whatever [`SessionContext::add_flag`] reports.
    pub async fn submit_flag(&mut self, session: &SessionContext) -> Result<bool, SessionError> {
        let Some(flag) = self.flag.submit() else {
            return Err(session.reject("Enter a flag first."));
        };
        session.add_flag(&flag).await
    }

    /// Remove the flag whose chip was clicked. Clicking a value that has no
    /// chip does nothing.
    ///
    /// # Errors
    ///
    /// Whatever [`SessionContext::remove_flag`] reports.
    pub async fn remove_chip(&mut self, session: &SessionContext, value: &str) -> Result<bool, SessionError> {
        self.notice = None;
        let tags = TagList::from_flags(&session.snapshot().flags);
        let Some(flag) = tags.select(value) else {
            return Ok(false);
        };
        session.remove_flag(flag).await
    }

    /// # Errors
    ///
    /// Missing input, or whatever [`SessionContext::change_password`]
    /// reports.
    pub async fn submit_password(&mut self, session: &SessionContext) -> Result<(), SessionError> {
        self.notice = None;
        let Some((password, confirm)) = self.password.submit() else {
            return Err(session.reject("Enter the new password twice."));
        };
        let message = session.change_password(&password, &confirm).await?;
        self.notice = Some(message.unwrap_or_else(|| PASSWORD_CHANGED.to_owned()));
        Ok(())
    }

    #[must_use]
    pub fn render(&self, session: &Session) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Logged in as {} <{}>", display_name(session), session.email);
        let tags = TagList::from_flags(&session.flags).render();
        if tags.is_empty() {
            out.push_str("Flags: (none)\n");
        } else {
            let _ = writeln!(out, "Flags: {tags}");
        }
        for line in [self.email.render(), self.user_name.render(), self.flag.render(), self.password.render()] {
            let _ = writeln!(out, "  {line}");
        }
        if let Some(notice) = &self.notice {
            let _ = writeln!(out, "{notice}");
        }
        out
    }
}

fn display_name(session: &Session) -> &str {
    if session.user_name.is_empty() { "(no username)" } else { &session.user_name }
}

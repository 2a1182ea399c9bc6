//! Login panel shown on the unauthenticated home screen.

#[cfg(test)]
#[path = "login_test.rs"]
mod tests;

use crate::services::session::{SessionContext, SessionError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginPanel {
    pub email: String,
    pub password: String,
}

impl LoginPanel {
    pub fn set_credentials(&mut self, email: impl Into<String>, password: impl Into<String>) {
        self.email = email.into();
        self.password = password.into();
    }

    /// Send the typed credentials. The password field is always cleared;
    /// the email is kept on failure so it can be corrected.
    ///
    /// # Errors
    ///
    /// Whatever [`SessionContext::login`] reports.
    pub async fn submit(&mut self, session: &SessionContext) -> Result<(), SessionError> {
        let password = std::mem::take(&mut self.password);
        session.login(&self.email, &password).await?;
        self.email.clear();
        Ok(())
    }

    #[must_use]
    pub fn render(&self) -> String {
        let email = if self.email.is_empty() { "(email)" } else { self.email.as_str() };
        format!("Login\n  {email}\n  {}", "*".repeat(self.password.chars().count()))
    }
}

//! Registration panel shown on the unauthenticated home screen.

#[cfg(test)]
#[path = "registration_test.rs"]
mod tests;

use crate::services::session::{SessionContext, SessionError};

const REGISTERED: &str = "Account created. You can log in now.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationPanel {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    /// Confirmation from the last successful registration.
    pub notice: Option<String>,
}

impl RegistrationPanel {
    pub fn set_fields(
        &mut self,
        email: impl Into<String>,
        password: impl Into<String>,
        confirm_password: impl Into<String>,
    ) {
        self.email = email.into();
        self.password = password.into();
        self.confirm_password = confirm_password.into();
    }

    /// Register the typed account. Fields are cleared only on success.
    ///
    /// # Errors
    ///
    /// Whatever [`SessionContext::register`] reports.
    pub async fn submit(&mut self, session: &SessionContext) -> Result<(), SessionError> {
        self.notice = None;
        let message = session.register(&self.email, &self.password, &self.confirm_password).await?;
        *self = Self { notice: Some(message.unwrap_or_else(|| REGISTERED.to_owned())), ..Self::default() };
        Ok(())
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("Register\n  {}", if self.email.is_empty() { "(email)" } else { self.email.as_str() });
        if let Some(notice) = &self.notice {
            out.push_str("\n  ");
            out.push_str(notice);
        }
        out
    }
}

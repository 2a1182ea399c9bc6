//! Typed console commands and their dispatch onto the view models.
//!
//! Each input line is parsed with clap as if it were a command line without
//! a binary name, so `help` and per-command `--help` come for free.
//! Arguments are split on whitespace; quoting is not supported.

#[cfg(test)]
#[path = "console_test.rs"]
mod tests;

use clap::{Parser, Subcommand};

use crate::app::App;
use crate::components::user_panel::UserPanel;
use crate::services::session::SessionError;

#[derive(Parser, Debug)]
#[command(name = "console", no_binary_name = true, disable_version_flag = true)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub command: ConsoleCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Log in and load the profile.
    Login { email: String, password: String },
    /// Create an account.
    Register { email: String, password: String, confirm_password: String },
    /// Reload the profile from the server.
    Profile,
    /// Change the account email.
    Email { email: String },
    /// Change the username.
    Name { user_name: String },
    /// Change the password.
    Password { password: String, confirm_password: String },
    /// Add a flag.
    AddFlag { flag: String },
    /// Remove a flag.
    RemoveFlag { flag: String },
    /// Delete the account and log out.
    Delete { password: String },
    /// Mail a password reset token.
    Forgot { id: String },
    /// Set a new password with a mailed reset token.
    Reset { token: String, password: String, confirm_password: String },
    /// Log out.
    Logout,
    /// Open a page (`/` or `/about`).
    Go { path: String },
    /// Print the current screen.
    Show,
    /// Leave the console.
    #[command(alias = "exit")]
    Quit,
}

/// Whether the driver loop keeps reading lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parse one input line. Blank lines parse to `None`.
///
/// # Errors
///
/// Unknown commands, missing arguments, and `help` requests, which clap
/// reports as errors carrying the help text.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, clap::Error> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let parsed = ConsoleLine::try_parse_from(line.split_whitespace())?;
    Ok(Some(parsed.command))
}

/// Run `command` against the app.
///
/// # Errors
///
/// The session error of a failed operation. It is also on the session's
/// error line, so the caller only needs it for logging.
pub async fn execute(app: &mut App, command: ConsoleCommand) -> Result<Flow, SessionError> {
    let session = app.session().clone();
    match command {
        ConsoleCommand::Login { email, password } => {
            app.login.set_credentials(email, password);
            app.login.submit(&session).await?;
        }
        ConsoleCommand::Register { email, password, confirm_password } => {
            app.registration.set_fields(email, password, confirm_password);
            app.registration.submit(&session).await?;
        }
        ConsoleCommand::Profile => session.fetch_profile().await?,
        ConsoleCommand::Email { email } => {
            app.user.email.set_value(email);
            app.user.submit_email(&session).await?;
        }
        ConsoleCommand::Name { user_name } => {
            app.user.user_name.set_value(user_name);
            app.user.submit_user_name(&session).await?;
        }
        ConsoleCommand::Password { password, confirm_password } => {
            app.user.password.set_values(password, confirm_password);
            app.user.submit_password(&session).await?;
        }
        ConsoleCommand::AddFlag { flag } => {
            app.user.flag.set_value(flag);
            app.user.submit_flag(&session).await?;
        }
        ConsoleCommand::RemoveFlag { flag } => {
            app.user.remove_chip(&session, &flag).await?;
        }
        ConsoleCommand::Delete { password } => {
            session.delete_account(&password).await?;
            app.user = UserPanel::default();
        }
        ConsoleCommand::Forgot { id } => {
            let message = session.request_password_reset(&id).await?;
            app.registration.notice = Some(message.unwrap_or_else(|| "Check your inbox for the reset token.".to_owned()));
        }
        ConsoleCommand::Reset { token, password, confirm_password } => {
            let message = session.reset_password(&token, &password, &confirm_password).await?;
            app.registration.notice = Some(message.unwrap_or_else(|| "Password reset. You can log in now.".to_owned()));
        }
        ConsoleCommand::Logout => app.logout(),
        ConsoleCommand::Go { path } => {
            if !app.navigate(&path) {
                return Err(session.reject(&format!("No page at {path}.")));
            }
        }
        ConsoleCommand::Show => {}
        ConsoleCommand::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

//! Top-level router and view tree.
//!
//! The home route shows the login and registration panels while the session
//! has no token and the user panel once it has one. `/about` is static and
//! reachable from both trees.

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;

use crate::components::login::LoginPanel;
use crate::components::registration::RegistrationPanel;
use crate::components::user_panel::UserPanel;
use crate::services::session::SessionContext;

const ABOUT: &str = "identity-console\n\
    Manage your account on the identity service: log in, register, update\n\
    your profile and keep your flags in sync.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Home,
    About,
}

impl Route {
    /// Match a path, ignoring a trailing slash.
    #[must_use]
    pub fn parse(path: &str) -> Option<Self> {
        match path.trim().trim_end_matches('/') {
            "" => Some(Self::Home),
            "/about" => Some(Self::About),
            _ => None,
        }
    }

    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::About => "/about",
        }
    }
}

/// What the router currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Unauthenticated,
    Profile,
    About,
}

pub struct App {
    session: SessionContext,
    route: Route,
    pub login: LoginPanel,
    pub registration: RegistrationPanel,
    pub user: UserPanel,
}

impl App {
    #[must_use]
    pub fn new(session: SessionContext) -> Self {
        Self {
            session,
            route: Route::default(),
            login: LoginPanel::default(),
            registration: RegistrationPanel::default(),
            user: UserPanel::default(),
        }
    }

    #[must_use]
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    #[must_use]
    pub fn route(&self) -> Route {
        self.route
    }

    /// Switch to `path`. Unknown paths leave the route unchanged.
    pub fn navigate(&mut self, path: &str) -> bool {
        let Some(route) = Route::parse(path) else {
            return false;
        };
        self.route = route;
        true
    }

    #[must_use]
    pub fn screen(&self) -> Screen {
        match self.route {
            Route::About => Screen::About,
            Route::Home if self.session.is_authenticated() => Screen::Profile,
            Route::Home => Screen::Unauthenticated,
        }
    }

    /// End the session and drop everything typed into the user panel.
    pub fn logout(&mut self) {
        self.session.logout();
        self.user = UserPanel::default();
    }

    #[must_use]
    pub fn render(&self) -> String {
        let session = self.session.snapshot();
        let mut out = match self.screen() {
            Screen::About => return format!("{ABOUT}\n"),
            Screen::Unauthenticated => format!("{}\n\n{}\n", self.login.render(), self.registration.render()),
            Screen::Profile => self.user.render(&session),
        };
        if !session.error.is_empty() {
            out.push_str("! ");
            out.push_str(&session.error);
            out.push('\n');
        }
        out
    }
}

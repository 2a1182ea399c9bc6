//! # identity-console
//!
//! Account console for a remote identity API: login, registration, profile
//! viewing and unique-flag management.
//!
//! ## Layers
//!
//! ```text
//! main.rs / console   terminal driver, parses typed commands
//!        │
//! app / components    headless view models (router, panels, widgets)
//!        │
//! services::session   session context: token lifecycle + flag sync
//!        │
//! net::api            request options, transport, typed endpoints
//! ```
//!
//! Views never hold session state of their own. They read snapshots from
//! [`services::session::SessionContext`] and call its operations, which
//! return explicit results and publish every change on a watch channel.

pub mod app;
pub mod components;
pub mod config;
pub mod console;
pub mod net;
pub mod services;
pub mod state;
pub mod util;

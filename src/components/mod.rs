//! Headless view models for the console screens.
//!
//! Widgets hold only transient input. Anything that outlives a submit lives
//! in the session context.

pub mod double_input;
pub mod input;
pub mod login;
pub mod registration;
pub mod tags;
pub mod user_panel;

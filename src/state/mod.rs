//! Client-side state models.
//!
//! DESIGN
//! ======
//! `session` is the record views render from; `flags` holds the flag set and
//! the per-flag pending tracker used while server calls are in flight.

pub mod flags;
pub mod session;

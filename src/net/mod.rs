//! Networking for the identity API.
//!
//! SYSTEM CONTEXT
//! ==============
//! `api` builds and sends requests, `types` defines the wire schema and the
//! error taxonomy shared by every caller.

pub mod api;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

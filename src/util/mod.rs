//! Small pure helpers shared by views and the session.

pub mod email;

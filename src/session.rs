//! Session keys shared across handlers.

pub const USER_ID: &str = "user_id";
pub const USERNAME: &str = "username";

/// Commenting and voting fall back to this identity when no session exists.
pub const GUEST_USER: &str = "guest";

//! Shared helpers

pub mod password;
pub mod rate_limit;
pub mod slug;
pub mod time;

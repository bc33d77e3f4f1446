//! Sign-in Domain Concerns

pub mod email;
pub mod magic_links;
pub mod maintenance;
pub mod rate_limits;
pub mod tokens;

//! Rate Limits

pub mod messages;
pub mod records;
pub mod service;

pub use messages::explain;
pub use service::*;

//! Magic Links

pub mod audit;
pub mod data;
pub mod errors;
pub mod service;

pub use data::*;
pub use errors::{MagicLinkError, SignInError};
pub use service::*;

//! Tokens

pub mod data;
pub mod errors;
pub mod records;
pub mod secret;
pub mod service;
pub mod store;

pub use errors::{TokenStoreError, TokensServiceError};
pub use service::*;

//! Maintenance

pub mod records;
pub mod service;

pub use records::*;
pub use service::*;

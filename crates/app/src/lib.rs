//! Passwordless sign-in: magic-link issuance, rate limiting and token bookkeeping.

pub mod broker;
pub mod clock;
pub mod context;
pub mod database;
pub mod domain;

#[cfg(test)]
mod test;

mod uuids;

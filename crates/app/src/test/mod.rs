//! Test support


pub use db::TestDb;

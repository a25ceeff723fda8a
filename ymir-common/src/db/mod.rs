//! Embedded key-value store for model records

pub mod init;
pub mod models;

pub use init::*;
pub use models::*;

//! Application services shared by the CLI and the admin API.

pub mod error;
pub mod operations;

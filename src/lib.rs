//! Edge cache policy and purge dispatch for multi-site publishing hosts.

pub mod application;
pub mod config;
pub mod infra;
pub mod purge;

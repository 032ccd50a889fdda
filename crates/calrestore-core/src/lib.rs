//! Shared building blocks for the calendar restore pipeline: configuration,
//! the core error type, dump version handling and principal addressing.

pub mod config;
pub mod constants;
pub mod error;
pub mod principal;
pub mod version;

//! Still Louder Core Library
//!
//! Shared configuration, error types, and logging setup for the offline
//! caching layer and its page-side lifecycle manager.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CacheConfig, PwaConfig, SiteConfig, DEFAULT_ORIGIN};
pub use error::{LouderError, LouderResult};
pub use logging::{init_logging, LogConfig, LogFormat, LOUDER_TARGETS};

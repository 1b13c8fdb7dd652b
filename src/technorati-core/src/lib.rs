//! Technorati Core Library
//!
//! Everything the Technorati client needs that does not touch the network:
//! - Error taxonomy
//! - Query table, option whitelists and validation
//! - Cache keys and response cache backends
//! - XML response tree, parsing and error classification
//! - Client configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod options;
pub mod query;
pub mod response;

// Re-export commonly used types
pub use cache::{CacheStats, MemoryCache, ResponseCache, SqliteCache};
pub use config::{CacheConfig, ClientConfig};
pub use error::{Error, Result, TransportFailure};
pub use options::{validate, OptionPolicy, OptionSet};
pub use query::{password_hash, CacheKey, Query, QueryKind};
pub use response::{classify, KeyInfo, ParsedResponse, XmlNode};

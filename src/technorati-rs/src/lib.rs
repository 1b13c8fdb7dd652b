//! Technorati Client Library
//!
//! Async client for the Technorati blog-search REST API.
//!
//! ```rust,no_run
//! use technorati_rs::{OptionSet, TechnoratiClient};
//!
//! #[tokio::main]
//! async fn main() -> technorati_rs::Result<()> {
//!     let client = TechnoratiClient::new("your-api-key")?;
//!     let links = client
//!         .cosmos("http://www.example.com", Some(OptionSet::new().with("limit", 10)))
//!         .await?;
//!     for item in links.items() {
//!         println!("{:?}", item.text_of(&["weblog", "name"]));
//!     }
//!     Ok(())
//! }
//! ```

mod client;
mod dispatcher;
pub mod transport;

pub use client::{ClientBuilder, TechnoratiClient};
pub use dispatcher::{AttentionFile, QueryDispatcher};
pub use technorati_core::{
    password_hash, CacheConfig, ClientConfig, Error, KeyInfo, MemoryCache, OptionPolicy,
    OptionSet, ParsedResponse, ResponseCache, Result, SqliteCache, TransportFailure, XmlNode,
};
pub use transport::{HttpTransport, Transport};

//! The fixed table of supported queries and per-dispatch query values.

use md5::Md5;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::Result;
use crate::options::{validate, OptionPolicy, OptionSet};

/// Every query the remote API supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    KeyInfo,
    BlogPostTags,
    Cosmos,
    Search,
    Outbound,
    Tag,
    TopTags,
    GetInfo,
    BlogInfo,
    Attention,
    AttentionPost,
}

impl QueryKind {
    pub const ALL: [QueryKind; 11] = [
        QueryKind::KeyInfo,
        QueryKind::BlogPostTags,
        QueryKind::Cosmos,
        QueryKind::Search,
        QueryKind::Outbound,
        QueryKind::Tag,
        QueryKind::TopTags,
        QueryKind::GetInfo,
        QueryKind::BlogInfo,
        QueryKind::Attention,
        QueryKind::AttentionPost,
    ];

    /// Path segment appended to the API base URL.
    pub fn wire_name(self) -> &'static str {
        match self {
            QueryKind::KeyInfo => "keyinfo",
            QueryKind::BlogPostTags => "blogposttags",
            QueryKind::Cosmos => "cosmos",
            QueryKind::Search => "search",
            QueryKind::Outbound => "outbound",
            QueryKind::Tag => "tag",
            QueryKind::TopTags => "toptags",
            QueryKind::GetInfo => "getinfo",
            QueryKind::BlogInfo => "bloginfo",
            QueryKind::Attention | QueryKind::AttentionPost => "attention",
        }
    }

    /// Names of the chief parameters, always sent and never whitelisted.
    pub fn chief_params(self) -> &'static [&'static str] {
        match self {
            QueryKind::KeyInfo | QueryKind::TopTags => &[],
            QueryKind::BlogPostTags
            | QueryKind::Cosmos
            | QueryKind::Outbound
            | QueryKind::BlogInfo => &["url"],
            QueryKind::Search => &["query"],
            QueryKind::Tag => &["tag"],
            QueryKind::GetInfo | QueryKind::Attention => &["username"],
            QueryKind::AttentionPost => &["username", "password"],
        }
    }

    /// Secondary options the query accepts.
    pub fn whitelist(self) -> &'static [&'static str] {
        match self {
            QueryKind::BlogPostTags => &["limit"],
            QueryKind::Cosmos => &["type", "limit", "start", "current", "claim", "highlight"],
            QueryKind::Search => &["start", "limit", "claim"],
            QueryKind::Outbound => &["start"],
            QueryKind::Tag => &["limit", "start", "format", "excerptsize", "topexcerptsize"],
            QueryKind::TopTags => &["limit", "start"],
            QueryKind::Attention => &["password"],
            QueryKind::KeyInfo
            | QueryKind::GetInfo
            | QueryKind::BlogInfo
            | QueryKind::AttentionPost => &[],
        }
    }

    /// Whether a successful read may be served from, and stored in, the cache.
    ///
    /// keyInfo reports live quota counters. attentionPost is a write and
    /// stores its result under its own key instead.
    pub fn is_cacheable(self) -> bool {
        !matches!(self, QueryKind::KeyInfo | QueryKind::AttentionPost)
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One query ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub kind: QueryKind,
    pub chief: OptionSet,
    pub options: Option<OptionSet>,
}

impl Query {
    pub fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            chief: OptionSet::new(),
            options: None,
        }
    }

    pub fn chief(mut self, name: &str, value: impl ToString) -> Self {
        self.chief.insert(name, value);
        self
    }

    pub fn options(mut self, options: Option<OptionSet>) -> Self {
        self.options = options;
        self
    }

    /// Validate the options and merge the chief parameters over them.
    ///
    /// Validated options come first in caller order, followed by the chief
    /// parameters.
    pub fn parameters(&self, policy: OptionPolicy) -> Result<OptionSet> {
        let mut params = validate(
            self.kind.wire_name(),
            self.options.as_ref(),
            self.kind.whitelist(),
            policy,
        )?;
        params.extend_from(&self.chief);
        Ok(params)
    }
}

/// Deterministic cache key for a query and its final parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key of the form `<query>.<sha256 hex>`.
    ///
    /// The digest covers the parameters sorted by name, each name and value
    /// written with a length prefix so no value can imitate a boundary.
    pub fn new(query: &str, params: &OptionSet) -> Self {
        let mut pairs: Vec<(&str, &str)> = params.iter().collect();
        pairs.sort_unstable();

        let mut hasher = Sha256::new();
        write_field(&mut hasher, query);
        for (name, value) in pairs {
            write_field(&mut hasher, name);
            write_field(&mut hasher, value);
        }

        CacheKey(format!("{}.{}", query, hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines.
    pub fn short(&self) -> &str {
        let cut = self.0.find('.').map_or(self.0.len(), |dot| (dot + 9).min(self.0.len()));
        &self.0[..cut]
    }
}

fn write_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// MD5 hex digest the service expects in place of a plaintext password.
pub fn password_hash(password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_cache_key_ignores_option_order() {
        let a = OptionSet::new().with("limit", 10).with("url", "http://a.example");
        let b = OptionSet::new().with("url", "http://a.example").with("limit", 10);
        assert_eq!(CacheKey::new("cosmos", &a), CacheKey::new("cosmos", &b));
    }

    #[test]
    fn test_cache_key_differs_on_any_value() {
        let a = OptionSet::new().with("limit", 10).with("url", "http://a.example");
        let b = OptionSet::new().with("limit", 11).with("url", "http://a.example");
        assert_ne!(CacheKey::new("cosmos", &a), CacheKey::new("cosmos", &b));
    }

    #[test]
    fn test_cache_key_differs_per_query() {
        let params = OptionSet::new().with("url", "http://a.example");
        assert_ne!(
            CacheKey::new("cosmos", &params),
            CacheKey::new("outbound", &params)
        );
    }

    #[test]
    fn test_cache_key_resists_concatenation_aliasing() {
        // Plain concatenation would render both as "ab_c".
        let a = OptionSet::new().with("x", "ab").with("y", "_c");
        let b = OptionSet::new().with("x", "ab_").with("y", "c");
        assert_ne!(CacheKey::new("tag", &a), CacheKey::new("tag", &b));

        let c = OptionSet::new().with("start", "1=limit");
        let d = OptionSet::new().with("start", "1").with("limit", "");
        assert_ne!(CacheKey::new("tag", &c), CacheKey::new("tag", &d));
    }

    #[test]
    fn test_cache_key_shape() {
        let key = CacheKey::new("search", &OptionSet::new().with("query", "rust"));
        assert!(key.as_str().starts_with("search."));
        assert_eq!(key.as_str().len(), "search.".len() + 64);
        assert_eq!(key.short().len(), "search.".len() + 8);
    }

    #[test]
    fn test_password_hash_is_md5_hex() {
        assert_eq!(password_hash("secret"), "5ebe2294ecd0e0f08eab7690d2a6ee69");
        assert_ne!(password_hash("secret"), "secret");
    }

    #[test]
    fn test_parameters_merge_chief_after_options() {
        let query = Query::new(QueryKind::Cosmos)
            .chief("url", "http://www.example.com")
            .options(Some(OptionSet::new().with("limit", 5).with("type", "link")));
        let params = query.parameters(OptionPolicy::Strict).unwrap();
        assert_eq!(params.names(), vec!["limit", "type", "url"]);
    }

    #[test]
    fn test_chief_params_bypass_whitelist() {
        let query = Query::new(QueryKind::GetInfo).chief("username", "alice");
        let params = query.parameters(OptionPolicy::Strict).unwrap();
        assert_eq!(params.get("username"), Some("alice"));
    }

    #[test]
    fn test_every_query_rejects_foreign_option() {
        for kind in QueryKind::ALL {
            let query = Query::new(kind).options(Some(OptionSet::new().with("nonsense", 1)));
            match query.parameters(OptionPolicy::Strict) {
                Err(Error::UnsupportedOption { option, .. }) => assert_eq!(option, "nonsense"),
                other => panic!("{kind}: expected UnsupportedOption, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_whitelist_table() {
        assert!(QueryKind::KeyInfo.whitelist().is_empty());
        assert_eq!(QueryKind::Search.whitelist(), &["start", "limit", "claim"]);
        assert_eq!(QueryKind::Attention.whitelist(), &["password"]);
        assert!(!QueryKind::KeyInfo.is_cacheable());
        assert!(QueryKind::Cosmos.is_cacheable());
    }
}

use std::path::Path;
use std::sync::Arc;
use technorati_core::{
    password_hash, ClientConfig, Error, KeyInfo, MemoryCache, OptionSet, ParsedResponse, Query,
    QueryKind, ResponseCache, Result, SqliteCache,
};

use crate::dispatcher::{AttentionFile, QueryDispatcher};
use crate::transport::{HttpTransport, Transport};

/// Technorati REST API client
///
/// One method per query. Options not accepted by a query are rejected (or
/// dropped, under [`technorati_core::OptionPolicy::Lenient`]) before any
/// cache lookup or network call.
pub struct TechnoratiClient {
    dispatcher: QueryDispatcher,
}

pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    cache: Option<Arc<dyn ResponseCache>>,
}

impl ClientBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<TechnoratiClient> {
        self.config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config.timeout())?),
        };

        Ok(TechnoratiClient {
            dispatcher: QueryDispatcher::new(self.config, transport, self.cache),
        })
    }
}

impl TechnoratiClient {
    /// Client with default settings and no cache.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::builder(ClientConfig::new(api_key)).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            transport: None,
            cache: None,
        }
    }

    /// Client whose cache backend is chosen by `config.cache`.
    pub async fn from_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let cache: Option<Arc<dyn ResponseCache>> = if !config.cache.enabled {
            None
        } else if let Some(path) = &config.cache.sqlite_path {
            tracing::info!(path = %path, "Using SQLite response cache");
            Some(Arc::new(SqliteCache::open(path).await?))
        } else {
            tracing::info!(
                capacity = config.cache.memory_capacity,
                "Using in-memory response cache"
            );
            Some(Arc::new(MemoryCache::new(config.cache.memory_capacity)?))
        };

        let mut builder = Self::builder(config);
        builder.cache = cache;
        builder.build()
    }

    pub fn config(&self) -> &ClientConfig {
        self.dispatcher.config()
    }

    /// Daily usage of the API key. Always a live call.
    pub async fn key_info(&self) -> Result<ParsedResponse> {
        self.dispatcher.dispatch(&Query::new(QueryKind::KeyInfo)).await
    }

    pub async fn key_info_typed(&self) -> Result<KeyInfo> {
        KeyInfo::from_response(&self.key_info().await?)
    }

    /// Top tags used by posts on a blog. Options: `limit`.
    pub async fn blog_post_tags(
        &self,
        url: &str,
        options: Option<OptionSet>,
    ) -> Result<ParsedResponse> {
        self.dispatcher
            .dispatch(
                &Query::new(QueryKind::BlogPostTags)
                    .chief("url", url)
                    .options(options),
            )
            .await
    }

    /// Blogs linking to a URL. Options: `type`, `limit`, `start`,
    /// `current`, `claim`, `highlight`.
    pub async fn cosmos(&self, url: &str, options: Option<OptionSet>) -> Result<ParsedResponse> {
        self.dispatcher
            .dispatch(&Query::new(QueryKind::Cosmos).chief("url", url).options(options))
            .await
    }

    /// Posts containing a search term. Options: `start`, `limit`, `claim`.
    pub async fn search(&self, query: &str, options: Option<OptionSet>) -> Result<ParsedResponse> {
        self.dispatcher
            .dispatch(
                &Query::new(QueryKind::Search)
                    .chief("query", query)
                    .options(options),
            )
            .await
    }

    /// Blogs a given blog links to. Options: `start`.
    pub async fn outbound(&self, url: &str, options: Option<OptionSet>) -> Result<ParsedResponse> {
        self.dispatcher
            .dispatch(
                &Query::new(QueryKind::Outbound)
                    .chief("url", url)
                    .options(options),
            )
            .await
    }

    /// Posts carrying a tag. Options: `limit`, `start`, `format`,
    /// `excerptsize`, `topexcerptsize`.
    pub async fn tag(&self, tag: &str, options: Option<OptionSet>) -> Result<ParsedResponse> {
        self.dispatcher
            .dispatch(&Query::new(QueryKind::Tag).chief("tag", tag).options(options))
            .await
    }

    /// Most popular post tags. Options: `limit`, `start`.
    pub async fn top_tags(&self, options: Option<OptionSet>) -> Result<ParsedResponse> {
        self.dispatcher
            .dispatch(&Query::new(QueryKind::TopTags).options(options))
            .await
    }

    /// What Technorati knows about a member.
    pub async fn get_info(&self, username: &str) -> Result<ParsedResponse> {
        self.dispatcher
            .dispatch(&Query::new(QueryKind::GetInfo).chief("username", username))
            .await
    }

    /// The blog, if any, associated with a URL.
    pub async fn blog_info(&self, url: &str) -> Result<ParsedResponse> {
        self.dispatcher
            .dispatch(&Query::new(QueryKind::BlogInfo).chief("url", url))
            .await
    }

    /// A member's Attention.XML. Experimental on the service side.
    pub async fn attention(&self, username: &str, password: &str) -> Result<ParsedResponse> {
        let options = OptionSet::new().with("password", password_hash(password));
        self.dispatcher
            .dispatch(
                &Query::new(QueryKind::Attention)
                    .chief("username", username)
                    .options(Some(options)),
            )
            .await
    }

    /// Upload a new Attention.XML document.
    pub async fn attention_post(
        &self,
        username: &str,
        password: &str,
        file: AttentionFile,
    ) -> Result<ParsedResponse> {
        self.dispatcher
            .post_attention(username, &password_hash(password), file)
            .await
    }

    /// Upload an Attention.XML document read from disk.
    pub async fn attention_post_file(
        &self,
        username: &str,
        password: &str,
        path: impl AsRef<Path>,
    ) -> Result<ParsedResponse> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await.map_err(Error::Io)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attention.xml".to_string());

        self.attention_post(username, password, AttentionFile::new(file_name, content))
            .await
    }
}

use std::sync::Arc;
use technorati_core::{
    classify, CacheKey, ClientConfig, Error, OptionSet, ParsedResponse, Query, QueryKind,
    ResponseCache, Result, TransportFailure,
};

use crate::transport::{FilePart, Method, Multipart, Request, Transport};

/// Cache label for attention uploads, kept apart from attention reads.
const ATTENTION_POST_LABEL: &str = "attentionpost";

/// An attention.xml document to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttentionFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl AttentionFile {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }
}

/// Validates, caches and sends queries.
pub struct QueryDispatcher {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn ResponseCache>>,
}

impl QueryDispatcher {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        cache: Option<Arc<dyn ResponseCache>>,
    ) -> Self {
        Self {
            config,
            transport,
            cache,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run a read query: validate, consult the cache, send, classify, store.
    ///
    /// Attention uploads go through [`QueryDispatcher::post_attention`].
    pub async fn dispatch(&self, query: &Query) -> Result<ParsedResponse> {
        let kind = query.kind;
        self.run_read(query).await.map_err(|e| failed(kind, e))
    }

    async fn run_read(&self, query: &Query) -> Result<ParsedResponse> {
        let kind = query.kind;
        if kind == QueryKind::AttentionPost {
            return Err(Error::Config(
                "attentionPost is a multipart upload; use post_attention".to_string(),
            ));
        }
        let params = query.parameters(self.config.option_policy)?;

        let key = if kind.is_cacheable() {
            Some(CacheKey::new(kind.wire_name(), &params))
        } else {
            None
        };

        if let Some(key) = &key {
            if let Some(hit) = self.cache_lookup(key).await {
                tracing::debug!(query = %kind, key = key.short(), "Serving cached response");
                return Ok(hit);
            }
        }

        let request = self.build_request(kind, &params);
        let response = self.execute(kind, request).await?;

        if let Some(key) = &key {
            self.cache_store(key, &response).await;
        }

        Ok(response)
    }

    /// Upload an attention.xml file. Never served from the cache; a
    /// successful result is stored under a key derived from the username.
    pub async fn post_attention(
        &self,
        username: &str,
        password_hash: &str,
        file: AttentionFile,
    ) -> Result<ParsedResponse> {
        let kind = QueryKind::AttentionPost;
        let request = Request {
            method: Method::Post,
            url: self.config.endpoint(kind.wire_name()),
            headers: self.headers(),
            query: vec![("key".to_string(), self.config.api_key.clone())],
            multipart: Some(Multipart {
                fields: vec![
                    ("username".to_string(), username.to_string()),
                    ("password".to_string(), password_hash.to_string()),
                ],
                file: FilePart {
                    field_name: "attention.xml".to_string(),
                    file_name: file.file_name,
                    content: file.content,
                },
            }),
        };

        let response = self
            .execute(kind, request)
            .await
            .map_err(|e| failed(kind, e))?;

        let key = CacheKey::new(
            ATTENTION_POST_LABEL,
            &OptionSet::new().with("username", username),
        );
        self.cache_store(&key, &response).await;

        Ok(response)
    }

    /// GET request for a query: the API key first, then every parameter.
    pub fn build_request(&self, kind: QueryKind, params: &OptionSet) -> Request {
        let mut query = Vec::with_capacity(params.len() + 1);
        query.push(("key".to_string(), self.config.api_key.clone()));
        query.extend(params.iter().map(|(k, v)| (k.to_string(), v.to_string())));

        Request {
            method: Method::Get,
            url: self.config.endpoint(kind.wire_name()),
            headers: self.headers(),
            query,
            multipart: None,
        }
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![("User-Agent".to_string(), self.config.user_agent.clone())]
    }

    async fn execute(&self, kind: QueryKind, request: Request) -> Result<ParsedResponse> {
        tracing::debug!(query = %kind, method = ?request.method, "Sending request");

        let response = self.transport.send(request).await?;

        if !response.is_success() {
            return Err(Error::Transport(TransportFailure::Status {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            }));
        }

        let parsed = ParsedResponse::parse(&response.body)?;
        classify(parsed)
    }

    async fn cache_lookup(&self, key: &CacheKey) -> Option<ParsedResponse> {
        let cache = self.cache.as_ref()?;
        match cache.get(key.as_str()).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(
                    key = key.short(),
                    category = e.category(),
                    error = %e,
                    "Cache read failed, treating as miss"
                );
                None
            }
        }
    }

    async fn cache_store(&self, key: &CacheKey, response: &ParsedResponse) {
        let Some(cache) = &self.cache else {
            return;
        };
        let ttl = Some(self.config.cache.ttl());
        if let Err(e) = cache.put(key.as_str(), response, ttl).await {
            tracing::warn!(
                key = key.short(),
                category = e.category(),
                error = %e,
                "Cache write failed"
            );
        }
    }
}

/// Log a failed query with its error category and pass the error on.
fn failed(kind: QueryKind, err: Error) -> Error {
    tracing::debug!(
        query = %kind,
        category = err.category(),
        status = err.status_code(),
        error = %err,
        "Query failed"
    );
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Response;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use technorati_core::{MemoryCache, OptionPolicy};

    /// Records requests and replays a fixed response.
    struct StubTransport {
        status: u16,
        body: &'static str,
        sent: Mutex<Vec<Request>>,
    }

    impl StubTransport {
        fn new(status: u16, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn send(&self, request: Request) -> std::result::Result<Response, TransportFailure> {
            self.sent.lock().unwrap().push(request);
            Ok(Response {
                status: self.status,
                body: self.body.as_bytes().to_vec(),
            })
        }
    }

    /// Cache whose writes always fail.
    struct BrokenCache;

    #[async_trait]
    impl ResponseCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<ParsedResponse>> {
            Err(Error::Cache("disk gone".to_string()))
        }

        async fn put(
            &self,
            _key: &str,
            _value: &ParsedResponse,
            _ttl: Option<std::time::Duration>,
        ) -> Result<()> {
            Err(Error::Cache("disk gone".to_string()))
        }
    }

    const COSMOS_OK: &str =
        "<tapi><document><result><url>http://www.example.com</url></result></document></tapi>";

    fn cosmos() -> Query {
        Query::new(QueryKind::Cosmos).chief("url", "http://www.example.com")
    }

    #[tokio::test]
    async fn test_cache_hit_skips_transport() {
        let transport = StubTransport::new(200, COSMOS_OK);
        let cache = Arc::new(MemoryCache::new(8).unwrap());
        let dispatcher =
            QueryDispatcher::new(ClientConfig::new("k"), transport.clone(), Some(cache.clone()));

        let params = cosmos().parameters(OptionPolicy::Strict).unwrap();
        let key = CacheKey::new("cosmos", &params);
        let cached = ParsedResponse::parse(b"<document><result><url>cached</url></result></document>")
            .unwrap();
        cache.put(key.as_str(), &cached, None).await.unwrap();

        let response = dispatcher.dispatch(&cosmos()).await.unwrap();
        assert_eq!(response.result_text("url"), Some("cached"));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_miss_populates_cache() {
        let transport = StubTransport::new(200, COSMOS_OK);
        let cache = Arc::new(MemoryCache::new(8).unwrap());
        let dispatcher =
            QueryDispatcher::new(ClientConfig::new("k"), transport.clone(), Some(cache.clone()));

        dispatcher.dispatch(&cosmos()).await.unwrap();
        dispatcher.dispatch(&cosmos()).await.unwrap();
        assert_eq!(transport.calls(), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_key_info_never_cached() {
        let transport = StubTransport::new(
            200,
            "<document><result><apiqueries>1</apiqueries><maxqueries>500</maxqueries></result></document>",
        );
        let cache = Arc::new(MemoryCache::new(8).unwrap());
        let dispatcher =
            QueryDispatcher::new(ClientConfig::new("k"), transport.clone(), Some(cache.clone()));

        let query = Query::new(QueryKind::KeyInfo);
        dispatcher.dispatch(&query).await.unwrap();
        dispatcher.dispatch(&query).await.unwrap();
        assert_eq!(transport.calls(), 2);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_unsupported_option_fails_before_io() {
        let transport = StubTransport::new(200, COSMOS_OK);
        let dispatcher = QueryDispatcher::new(ClientConfig::new("k"), transport.clone(), None);

        let query = Query::new(QueryKind::Search)
            .chief("query", "rust")
            .options(Some(OptionSet::new().with("highlight", 1)));
        let err = dispatcher.dispatch(&query).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedOption { .. }));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_refuses_attention_upload() {
        let transport = StubTransport::new(200, COSMOS_OK);
        let dispatcher = QueryDispatcher::new(ClientConfig::new("k"), transport.clone(), None);

        let query = Query::new(QueryKind::AttentionPost).chief("username", "alice");
        let err = dispatcher.dispatch(&query).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err:?}");
        assert_eq!(err.category(), "config");
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_api_error_not_cached() {
        let transport = StubTransport::new(
            200,
            "<document><result><error>Rate limit exceeded</error></result></document>",
        );
        let cache = Arc::new(MemoryCache::new(8).unwrap());
        let dispatcher =
            QueryDispatcher::new(ClientConfig::new("k"), transport.clone(), Some(cache.clone()));

        let err = dispatcher.dispatch(&cosmos()).await.unwrap_err();
        assert!(err.is_api_error());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_error_status_is_not_parsed() {
        // The body would classify as an API error if it were parsed.
        let transport = StubTransport::new(
            503,
            "<document><result><error>should not surface</error></result></document>",
        );
        let dispatcher = QueryDispatcher::new(ClientConfig::new("k"), transport, None);

        let err = dispatcher.dispatch(&cosmos()).await.unwrap_err();
        assert_eq!(err.status_code(), Some(503));
    }

    #[tokio::test]
    async fn test_cache_failures_are_not_fatal() {
        let transport = StubTransport::new(200, COSMOS_OK);
        let dispatcher = QueryDispatcher::new(
            ClientConfig::new("k"),
            transport.clone(),
            Some(Arc::new(BrokenCache)),
        );

        let response = dispatcher.dispatch(&cosmos()).await.unwrap();
        assert_eq!(response.result_text("url"), Some("http://www.example.com"));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_still_returns_payload() {
        let transport = StubTransport::new(200, COSMOS_OK);
        let cache = Arc::new(MemoryCache::new(8).unwrap());
        let mut config = ClientConfig::new("k");
        config.cache.ttl_secs = 100_000_000_000_000;
        let dispatcher = QueryDispatcher::new(config, transport.clone(), Some(cache.clone()));

        let response = dispatcher.dispatch(&cosmos()).await.unwrap();
        assert_eq!(response.result_text("url"), Some("http://www.example.com"));
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_request_shape() {
        let transport = StubTransport::new(200, COSMOS_OK);
        let dispatcher = QueryDispatcher::new(ClientConfig::new("k"), transport.clone(), None);
        dispatcher.dispatch(&cosmos()).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        let request = &sent[0];
        assert_eq!(request.method, Method::Get);
        assert_eq!(
            request.full_url().unwrap().as_str(),
            "http://api.technorati.com/cosmos?key=k&url=http%3A%2F%2Fwww.example.com"
        );
        assert!(request.header("User-Agent").is_some());
    }

    #[tokio::test]
    async fn test_attention_post_stores_result_by_username() {
        let transport = StubTransport::new(200, "<document><result><status>ok</status></result></document>");
        let cache = Arc::new(MemoryCache::new(8).unwrap());
        let dispatcher =
            QueryDispatcher::new(ClientConfig::new("k"), transport.clone(), Some(cache.clone()));

        let file = AttentionFile::new("attention.xml", "<attention/>");
        dispatcher
            .post_attention("alice", "5ebe2294ecd0e0f08eab7690d2a6ee69", file)
            .await
            .unwrap();

        let key = CacheKey::new(ATTENTION_POST_LABEL, &OptionSet::new().with("username", "alice"));
        assert!(cache.get(key.as_str()).await.unwrap().is_some());

        let sent = transport.sent.lock().unwrap();
        let multipart = sent[0].multipart.as_ref().unwrap();
        assert_eq!(sent[0].method, Method::Post);
        assert_eq!(multipart.file.field_name, "attention.xml");
        assert!(multipart
            .fields
            .contains(&("password".to_string(), "5ebe2294ecd0e0f08eab7690d2a6ee69".to_string())));
    }
}

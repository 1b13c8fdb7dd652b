use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client as HttpClient, Url};
use std::time::Duration;
use technorati_core::{Error, Result, TransportFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// File attached to a multipart POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field_name: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multipart {
    pub fields: Vec<(String, String)>,
    pub file: FilePart,
}

/// One outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub multipart: Option<Multipart>,
}

impl Request {
    /// The target URL with its query string, form-urlencoded.
    pub fn full_url(&self) -> Result<Url> {
        Url::parse_with_params(&self.url, &self.query)
            .map_err(|e| Error::Config(format!("invalid request URL {}: {e}", self.url)))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs exactly one HTTP exchange. Non-2xx statuses are returned, not
/// raised; classification happens in the dispatcher.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> std::result::Result<Response, TransportFailure>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: HttpClient,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

fn connection(err: reqwest::Error) -> TransportFailure {
    TransportFailure::Connection(err.without_url().to_string())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> std::result::Result<Response, TransportFailure> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .query(&request.query);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(multipart) = request.multipart {
            let mut form = Form::new();
            for (name, value) in multipart.fields {
                form = form.text(name, value);
            }
            let file = multipart.file;
            form = form.part(
                file.field_name,
                Part::bytes(file.content).file_name(file.file_name),
            );
            builder = builder.multipart(form);
        }

        let response = builder.send().await.map_err(connection)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(connection)?;

        Ok(Response {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn get(url: String) -> Request {
        Request {
            method: Method::Get,
            url,
            headers: vec![("User-Agent".to_string(), "test-agent".to_string())],
            query: vec![
                ("key".to_string(), "k".to_string()),
                ("url".to_string(), "http://www.example.com".to_string()),
            ],
            multipart: None,
        }
    }

    #[test]
    fn test_full_url_encodes_parameters() {
        let request = get("http://api.technorati.com/cosmos".to_string());
        assert_eq!(
            request.full_url().unwrap().as_str(),
            "http://api.technorati.com/cosmos?key=k&url=http%3A%2F%2Fwww.example.com"
        );
        assert_eq!(request.header("user-agent"), Some("test-agent"));
    }

    #[tokio::test]
    async fn test_http_transport_sends_query_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cosmos"))
            .and(query_param("key", "k"))
            .and(query_param("url", "http://www.example.com"))
            .and(header("User-Agent", "test-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<document/>"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .send(get(format!("{}/cosmos", server.uri())))
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.body, b"<document/>");
    }

    #[tokio::test]
    async fn test_http_transport_returns_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let response = transport
            .send(get(format!("{}/search", server.uri())))
            .await
            .unwrap();

        assert_eq!(response.status, 503);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_http_transport_connection_failure() {
        let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        let err = transport
            .send(get("http://127.0.0.1:9/cosmos".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportFailure::Connection(_)));
    }
}

// Async Last.fm client: sends descriptors, classifies failures, never retries

use super::request::{query, RequestDescriptor};
use super::traits::{HttpRequest, Transport};
use crate::error::{RemoteError, RemoteResult};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Default Last.fm host
pub const API_BASE_URL: &str = "https://ws.audioscrobbler.com";

/// Default timeout applied to each call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// Last.fm error codes that mean our credentials/signature are no longer accepted
const ERROR_INVALID_SIGNATURE: u32 = 13;
const ERROR_SUSPENDED_API_KEY: u32 = 26;
const ERROR_AUTHENTICATION_FAILED: u32 = 4;

/// Client that owns no session state; one instance can be shared freely.
#[derive(Clone)]
pub struct RemoteClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    timeout: Duration,
}

impl RemoteClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: API_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send a request and return the JSON object in the body.
    pub async fn send(&self, descriptor: RequestDescriptor) -> RemoteResult<Map<String, Value>> {
        let request = self.http_request(descriptor)?;
        let transport = Arc::clone(&self.transport);
        let method = request
            .params
            .iter()
            .find(|(k, _)| k == query::METHOD)
            .map(|(_, v)| v.clone())
            .unwrap_or_default();

        let response = tokio::task::spawn_blocking(move || transport.post(&request))
            .await
            .map_err(|e| RemoteError::Transport(format!("request task failed: {}", e)))?
            .map_err(|e| {
                log::warn!("{}: transport failure: {:#}", method, e);
                RemoteError::Transport(format!("{:#}", e))
            })?;

        log::debug!("{}: HTTP {}", method, response.status);

        let body = serde_json::from_slice::<Value>(&response.body).ok();

        if let Some((code, message)) = body.as_ref().and_then(service_error) {
            if code == ERROR_INVALID_SIGNATURE || code == ERROR_SUSPENDED_API_KEY {
                log::warn!("{}: signature rejected ({}): {}", method, code, message);
                return Err(RemoteError::SignatureRejected(message));
            }
            if code == ERROR_AUTHENTICATION_FAILED {
                log::warn!("{}: authentication failed: {}", method, message);
                return Err(RemoteError::AuthenticationFailed(message));
            }
            if !response.is_success() {
                log::warn!("{}: HTTP {} with error {}: {}", method, response.status, code, message);
                return Err(RemoteError::HttpStatus(response.status));
            }
            log::warn!("{}: Last.fm error {}: {}", method, code, message);
            return Err(RemoteError::Api { code, message });
        }

        if !response.is_success() {
            log::warn!("{}: HTTP {}", method, response.status);
            return Err(RemoteError::HttpStatus(response.status));
        }

        match body {
            Some(Value::Object(object)) => Ok(object),
            _ => {
                log::warn!("{}: response body is not a JSON object", method);
                Err(RemoteError::MalformedResponse)
            }
        }
    }

    /// Send a request and deserialize the body strictly into `T`.
    pub async fn send_as<T: DeserializeOwned>(&self, descriptor: RequestDescriptor) -> RemoteResult<T> {
        let object = self.send(descriptor).await?;
        serde_json::from_value(Value::Object(object)).map_err(|e| {
            log::warn!("Failed to decode response: {}", e);
            RemoteError::MalformedResponse
        })
    }

    fn http_request(&self, descriptor: RequestDescriptor) -> RemoteResult<HttpRequest> {
        if descriptor.method().map_or(true, str::is_empty) {
            return Err(RemoteError::InvalidRequest("missing method".to_string()));
        }
        if descriptor.param(query::API_KEY).map_or(true, str::is_empty) {
            return Err(RemoteError::InvalidRequest("missing api_key".to_string()));
        }
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(RemoteError::InvalidRequest(format!(
                "unsupported base URL {}",
                self.base_url
            )));
        }

        Ok(HttpRequest {
            url: format!("{}{}", self.base_url.trim_end_matches('/'), descriptor.path),
            params: descriptor.params,
            timeout: self.timeout,
        })
    }
}

// Last.fm reports failures as {"error": 13, "message": "..."}
fn service_error(body: &Value) -> Option<(u32, String)> {
    let code = body.get("error")?;
    let code = code
        .as_u64()
        .or_else(|| code.as_str().and_then(|s| s.parse().ok()))
        .and_then(|c| u32::try_from(c).ok())?;
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    Some((code, message))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::super::traits::{HttpRequest, HttpResponse, Transport};
    use anyhow::Result;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type Responder = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync>;

    /// Transport double that records every request and answers through a closure
    pub struct FakeTransport {
        pub requests: Mutex<Vec<HttpRequest>>,
        responder: Responder,
        queued: Mutex<VecDeque<Result<HttpResponse>>>,
    }

    impl FakeTransport {
        pub fn new<F>(responder: F) -> Self
        where
            F: Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
        {
            Self {
                requests: Mutex::new(Vec::new()),
                responder: Box::new(responder),
                queued: Mutex::new(VecDeque::new()),
            }
        }

        /// Always answer with the same status and JSON body
        pub fn json(status: u16, body: &str) -> Self {
            let body = body.as_bytes().to_vec();
            Self::new(move |_| {
                Ok(HttpResponse {
                    status,
                    body: body.clone(),
                })
            })
        }

        /// Answer from a queue first, then fall back to the responder
        pub fn push(&self, response: Result<HttpResponse>) {
            self.queued.lock().unwrap().push_back(response);
        }

        pub fn methods(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| param(r, "method").unwrap_or_default())
                .collect()
        }

        pub fn count(&self, method: &str) -> usize {
            self.methods().iter().filter(|m| m.as_str() == method).count()
        }
    }

    pub fn param(request: &HttpRequest, name: &str) -> Option<String> {
        request
            .params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    impl Transport for FakeTransport {
        fn post(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(response) = self.queued.lock().unwrap().pop_front() {
                return response;
            }
            (self.responder)(request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeTransport;
    use super::*;
    use crate::scrobbler::request::RequestBuilder;

    fn make_client(transport: FakeTransport) -> (RemoteClient, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        (RemoteClient::new(transport.clone()), transport)
    }

    fn descriptor() -> RequestDescriptor {
        RequestBuilder::new("KEY", "SECRET").user_info("alice")
    }

    #[tokio::test]
    async fn returns_json_object_on_success() {
        let (client, transport) = make_client(FakeTransport::json(200, r#"{"user":{"name":"alice"}}"#));
        let object = client.send(descriptor()).await.unwrap();
        assert_eq!(object["user"]["name"], "alice");

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://ws.audioscrobbler.com/2.0/");
        assert_eq!(requests[0].timeout, DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let (client, _) = make_client(FakeTransport::json(503, "Service Unavailable"));
        assert_eq!(client.send(descriptor()).await, Err(RemoteError::HttpStatus(503)));
    }

    #[tokio::test]
    async fn unparsable_body_is_malformed() {
        let (client, _) = make_client(FakeTransport::json(200, "<html></html>"));
        assert_eq!(client.send(descriptor()).await, Err(RemoteError::MalformedResponse));

        let (client, _) = make_client(FakeTransport::json(200, "[1, 2, 3]"));
        assert_eq!(client.send(descriptor()).await, Err(RemoteError::MalformedResponse));
    }

    #[tokio::test]
    async fn transport_failure_is_not_retried() {
        let (client, transport) = make_client(FakeTransport::new(|_| anyhow::bail!("connection reset")));
        let result = client.send(descriptor()).await;
        assert!(matches!(result, Err(RemoteError::Transport(ref cause)) if cause.contains("connection reset")));
        assert_eq!(transport.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn signature_errors_are_distinct() {
        let (client, _) = make_client(FakeTransport::json(
            403,
            r#"{"error":13,"message":"Invalid method signature supplied"}"#,
        ));
        assert_eq!(
            client.send(descriptor()).await,
            Err(RemoteError::SignatureRejected(
                "Invalid method signature supplied".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn authentication_failure_is_distinct() {
        let (client, _) = make_client(FakeTransport::json(
            403,
            r#"{"error":4,"message":"Authentication Failed"}"#,
        ));
        assert_eq!(
            client.send(descriptor()).await,
            Err(RemoteError::AuthenticationFailed("Authentication Failed".to_string()))
        );
    }

    #[tokio::test]
    async fn oversized_error_code_is_not_truncated() {
        // 2^32 + 13 must not be read as the signature error
        let (client, _) = make_client(FakeTransport::json(
            500,
            r#"{"error":4294967309,"message":"Bogus"}"#,
        ));
        assert_eq!(client.send(descriptor()).await, Err(RemoteError::HttpStatus(500)));
    }

    #[tokio::test]
    async fn other_service_errors() {
        let (client, _) = make_client(FakeTransport::json(
            403,
            r#"{"error":10,"message":"Invalid API key"}"#,
        ));
        assert_eq!(client.send(descriptor()).await, Err(RemoteError::HttpStatus(403)));

        let (client, _) = make_client(FakeTransport::json(200, r#"{"error":"6","message":"Track not found"}"#));
        assert_eq!(
            client.send(descriptor()).await,
            Err(RemoteError::Api {
                code: 6,
                message: "Track not found".to_string()
            })
        );
    }

    #[tokio::test]
    async fn rejects_incomplete_descriptors() {
        let (client, transport) = make_client(FakeTransport::json(200, "{}"));
        let mut request = descriptor();
        request.params.retain(|(k, _)| k != "api_key");
        assert!(matches!(
            client.send(request).await,
            Err(RemoteError::InvalidRequest(_))
        ));

        let client = client.with_base_url("ftp://example.com");
        assert!(matches!(
            client.send(descriptor()).await,
            Err(RemoteError::InvalidRequest(_))
        ));
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn strict_decoding_failure_is_malformed() {
        #[derive(serde::Deserialize, Debug)]
        struct Needs {
            #[allow(dead_code)]
            session: String,
        }
        let (client, _) = make_client(FakeTransport::json(200, r#"{"other":1}"#));
        assert_eq!(
            client.send_as::<Needs>(descriptor()).await.unwrap_err(),
            RemoteError::MalformedResponse
        );
    }
}

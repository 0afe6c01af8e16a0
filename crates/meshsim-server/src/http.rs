//! JSON over HTTP to node control endpoints.

use std::time::Duration;

use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request, StatusCode};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("bad request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("transport error: {0}")]
    Transport(#[from] hyper::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Sends JSON bodies and returns the response text.
#[derive(Clone)]
pub struct JsonClient {
    client: Client<HttpConnector>,
    timeout: Duration,
}

impl JsonClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    pub async fn put<T: Serialize + ?Sized>(&self, uri: &str, payload: &T) -> Result<String, HttpError> {
        self.send(Method::PUT, uri, payload).await
    }

    pub async fn post<T: Serialize + ?Sized>(&self, uri: &str, payload: &T) -> Result<String, HttpError> {
        self.send(Method::POST, uri, payload).await
    }

    /// Non-2xx responses are errors.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        method: Method,
        uri: &str,
        payload: &T,
    ) -> Result<String, HttpError> {
        let json = serde_json::to_string(payload)?;
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(json))?;

        let exchange = async {
            let resp = self.client.request(req).await?;
            let status = resp.status();
            let body_bytes = hyper::body::to_bytes(resp.into_body()).await?;
            Ok::<_, HttpError>((status, String::from_utf8_lossy(&body_bytes).into_owned()))
        };

        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| HttpError::Timeout(self.timeout))??;

        if status.is_success() {
            Ok(body)
        } else {
            Err(HttpError::Status { status, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        // Port 9 (discard) is not expected to be listening.
        let client = JsonClient::new(Duration::from_secs(5));
        let err = client
            .put("http://127.0.0.1:9/routes", &serde_json::json!([]))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Transport(_) | HttpError::Timeout(_)));
    }

    #[tokio::test]
    async fn malformed_uri_is_rejected_before_sending() {
        let client = JsonClient::new(Duration::from_secs(1));
        let err = client.post("not a uri", &()).await.unwrap_err();
        assert!(matches!(err, HttpError::Request(_)));
    }
}

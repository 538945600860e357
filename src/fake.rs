use crate::client::{ApiRequest, ApiResponse, Transport};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

enum Scripted {
    Response(ApiResponse),
    TransportError(String),
}

/// In-memory transport that replays scripted responses in order and records
/// every request it is handed.
#[derive(Default)]
pub struct FakeTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, scripted: Scripted) {
        self.script
            .lock()
            .expect("fake transport script poisoned")
            .push_back(scripted);
    }

    pub fn push_response(&self, status: u16, content_type: &str, body: Vec<u8>) {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(CONTENT_TYPE, value);
        }
        self.push(Scripted::Response(ApiResponse {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers,
            body,
        }));
    }

    pub fn push_json(&self, status: u16, body: Value) {
        self.push_response(status, "application/json", body.to_string().into_bytes());
    }

    pub fn push_text(&self, status: u16, content_type: &str, body: &str) {
        self.push_response(status, content_type, body.as_bytes().to_vec());
    }

    pub fn push_transport_error(&self, message: &str) {
        self.push(Scripted::TransportError(message.to_string()));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .expect("fake transport log poisoned")
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .expect("fake transport log poisoned")
            .len()
    }

    /// Requests sent to `path`, matched against the end of the URL.
    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.url.ends_with(path))
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = request.url.clone();
        self.requests
            .lock()
            .expect("fake transport log poisoned")
            .push(request);
        let next = self
            .script
            .lock()
            .expect("fake transport script poisoned")
            .pop_front();
        match next {
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::TransportError(message)) => Err(ClientError::Transport(message)),
            None => Err(ClientError::Transport(format!(
                "no scripted response for {url}"
            ))),
        }
    }
}

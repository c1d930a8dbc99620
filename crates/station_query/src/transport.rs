//! Transport abstraction for talking to stations.
//!
//! Every station query is a POST of opaque bytes; framing and decoding
//! happen in the client.

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use prost::Message;
use station_proto::app::HttpReply;

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status_code: u16,
    pub body: Bytes,
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `url` and return the raw response.
    async fn request(&self, url: &str, body: Bytes) -> anyhow::Result<TransportResponse>;
}

/// HTTP transport backed by reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn request(&self, url: &str, body: Bytes) -> anyhow::Result<TransportResponse> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await
            .with_context(|| format!("request {url}"))?;

        let status_code = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("read body from {url}"))?;

        Ok(TransportResponse { status_code, body })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub url: String,
    pub body: Bytes,
}

enum Canned {
    Body(u16, Bytes),
    Fail(String),
}

/// Mock transport for testing: records requests and returns canned
/// responses in the order they were pushed.
pub struct MockTransport {
    responses: std::sync::Mutex<VecDeque<Canned>>,
    sent: std::sync::Mutex<Vec<SentRequest>>,
    echo: bool,
    latency: Duration,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(VecDeque::new()),
            sent: std::sync::Mutex::new(Vec::new()),
            echo: false,
            latency: Duration::ZERO,
        }
    }

    /// Answer every request with its own body once the canned queue is empty.
    pub fn echo() -> Self {
        Self {
            echo: true,
            ..Self::new()
        }
    }

    /// Wait `latency` before answering each request.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a 200 reply carrying `reply`, length-delimited.
    pub fn push_reply(&self, reply: &HttpReply) {
        self.push_body(200, Bytes::from(reply.encode_length_delimited_to_vec()));
    }

    pub fn push_body(&self, status_code: u16, body: Bytes) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Canned::Body(status_code, body));
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Canned::Fail(message.to_string()));
    }

    pub fn take_sent(&self) -> Vec<SentRequest> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn request(&self, url: &str, body: Bytes) -> anyhow::Result<TransportResponse> {
        self.sent.lock().unwrap().push(SentRequest {
            url: url.to_string(),
            body: body.clone(),
        });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let canned = self.responses.lock().unwrap().pop_front();
        let (status_code, body) = match canned {
            Some(Canned::Body(code, body)) => (code, body),
            Some(Canned::Fail(message)) => anyhow::bail!(message),
            None if self.echo => (200, body),
            None => anyhow::bail!("no canned response"),
        };

        Ok(TransportResponse { status_code, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use station_proto::app::ReplyType;

    #[tokio::test]
    async fn mock_records_and_answers_in_order() {
        let transport = MockTransport::new();
        transport.push_body(200, Bytes::from_static(b"first"));
        transport.push_body(204, Bytes::new());

        let a = transport
            .request("http://10.0.0.5:80/fk/v1", Bytes::from_static(b"q"))
            .await
            .unwrap();
        let b = transport
            .request("http://10.0.0.5:80/fk/v1", Bytes::new())
            .await
            .unwrap();

        assert_eq!(a.body, Bytes::from_static(b"first"));
        assert_eq!(b.status_code, 204);

        let sent = transport.take_sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].body, Bytes::from_static(b"q"));
        assert_eq!(sent[0].url, "http://10.0.0.5:80/fk/v1");
    }

    #[tokio::test]
    async fn mock_no_response_errors() {
        let transport = MockTransport::new();
        let result = transport
            .request("http://10.0.0.5:80/fk/v1", Bytes::new())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mock_echo_returns_request_body() {
        let transport = MockTransport::echo();
        let resp = transport
            .request("http://x/fk/v1", Bytes::from_static(b"\x02\x08\x12"))
            .await
            .unwrap();
        assert_eq!(resp.body, Bytes::from_static(b"\x02\x08\x12"));
    }

    #[tokio::test]
    async fn push_reply_is_length_delimited() {
        let transport = MockTransport::new();
        transport.push_reply(&HttpReply {
            r#type: ReplyType::ReplyStatus as i32,
            ..Default::default()
        });
        let resp = transport
            .request("http://x/fk/v1", Bytes::new())
            .await
            .unwrap();
        let decoded = HttpReply::decode_length_delimited(resp.body).unwrap();
        assert_eq!(decoded.reply_type(), ReplyType::ReplyStatus);
    }

    #[test]
    fn http_transport_builds() {
        assert!(HttpTransport::new(Duration::from_secs(5)).is_ok());
    }
}

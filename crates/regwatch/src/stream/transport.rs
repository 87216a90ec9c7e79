//! Byte-level transports for the event stream.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc as futures_mpsc;
use futures::{Stream, TryStreamExt};
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::event::{CHANGE_DETECTED_TYPE, NotificationEvent};
use crate::utils::url::redacted;

/// Body of an open event stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Header carrying the resumption cursor on reconnects.
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// One attempt to open the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Full URL including the `token` and `lastEventId` query parameters.
    pub url: Url,
    /// Resumption cursor, also sent as `Last-Event-ID`.
    pub last_event_id: Option<String>,
}

impl StreamRequest {
    /// Build the request for `stream_url` authenticated by `token`.
    pub fn new(stream_url: &Url, token: &str, last_event_id: Option<&str>) -> Self {
        let mut url = stream_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("token", token);
            if let Some(id) = last_event_id {
                query.append_pair("lastEventId", id);
            }
        }
        Self {
            url,
            last_event_id: last_event_id.map(str::to_string),
        }
    }

    /// Value of a query parameter.
    pub fn query(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// Opens the server-to-client byte stream.
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    /// Open the stream. The returned body yields raw `text/event-stream` bytes.
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream>;
}

/// Streaming HTTP GET transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream> {
        let mut builder = self
            .client
            .get(request.url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(id) = &request.last_event_id {
            builder = builder.header(LAST_EVENT_ID_HEADER, id);
        }

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::InvalidStatus {
                status: status.as_u16(),
                url: redacted(&request.url),
            });
        }

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or("");
            if !content_type.contains("text/event-stream") {
                return Err(Error::InvalidContentType(content_type.to_string()));
            }
        }

        debug!(url = %redacted(&request.url), "Event stream response accepted");
        Ok(Box::pin(response.bytes_stream().map_err(Error::from)))
    }
}

enum ScriptedSession {
    Open(futures_mpsc::UnboundedReceiver<Result<Bytes>>),
    Fail(String),
}

/// In-memory transport: each `open` consumes the next scripted session.
///
/// Useful for driving a client from a local source and for tests.
#[derive(Default)]
pub struct ChannelTransport {
    sessions: Mutex<VecDeque<ScriptedSession>>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a session that opens successfully; bytes are fed through the
    /// returned sender and the stream ends when it is dropped.
    pub fn push_session(&self) -> SessionSender {
        let (tx, rx) = futures_mpsc::unbounded();
        self.sessions.lock().push_back(ScriptedSession::Open(rx));
        SessionSender { tx }
    }

    /// Queue a session whose `open` fails.
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.sessions
            .lock()
            .push_back(ScriptedSession::Fail(reason.into()));
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl StreamTransport for ChannelTransport {
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream> {
        self.requests.lock().push(request.clone());
        let session = self.sessions.lock().pop_front();
        match session {
            Some(ScriptedSession::Open(rx)) => Ok(Box::pin(rx)),
            Some(ScriptedSession::Fail(reason)) => Err(Error::connection(reason)),
            None => Err(Error::connection("no session available")),
        }
    }
}

/// Feeds one [`ChannelTransport`] session.
#[derive(Clone)]
pub struct SessionSender {
    tx: futures_mpsc::UnboundedSender<Result<Bytes>>,
}

impl SessionSender {
    /// Send raw stream bytes. Returns `false` once the reader is gone.
    pub fn send_raw(&self, text: impl Into<String>) -> bool {
        self.tx
            .unbounded_send(Ok(Bytes::from(text.into())))
            .is_ok()
    }

    /// Send one complete event.
    pub fn send_event(&self, event: Option<&str>, id: Option<&str>, data: &str) -> bool {
        let mut frame = String::new();
        if let Some(event) = event {
            frame.push_str(&format!("event: {event}\n"));
        }
        if let Some(id) = id {
            frame.push_str(&format!("id: {id}\n"));
        }
        for line in data.lines() {
            frame.push_str(&format!("data: {line}\n"));
        }
        frame.push('\n');
        self.send_raw(frame)
    }

    /// Send a change notification, using its id as the stream event id.
    pub fn send_notification(&self, event: &NotificationEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(data) => self.send_event(Some(CHANGE_DETECTED_TYPE), Some(&event.id), &data),
            Err(_) => false,
        }
    }

    /// Send a heartbeat control message.
    pub fn send_heartbeat(&self) -> bool {
        self.send_event(None, None, r#"{"type":"heartbeat"}"#)
    }

    /// Fail the stream with a transport error.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.tx
            .unbounded_send(Err(Error::connection(reason)))
            .is_ok()
    }

    /// End the stream as if the server closed it.
    pub fn close(&self) {
        self.tx.close_channel();
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[test]
    fn test_request_query() {
        let url = Url::parse("https://api.example.com/notifications/stream").unwrap();
        let request = StreamRequest::new(&url, "t0k=n", Some("e9"));
        assert_eq!(request.query("token").as_deref(), Some("t0k=n"));
        assert_eq!(request.query("lastEventId").as_deref(), Some("e9"));
        assert_eq!(request.last_event_id.as_deref(), Some("e9"));

        let request = StreamRequest::new(&url, "abc", None);
        assert_eq!(request.query("lastEventId"), None);
        assert_eq!(request.url.query(), Some("token=abc"));
    }

    #[tokio::test]
    async fn test_channel_transport_sessions() {
        let transport = ChannelTransport::new();
        let url = Url::parse("http://localhost/notifications/stream").unwrap();
        let request = StreamRequest::new(&url, "abc", None);

        transport.push_failure("refused");
        let session = transport.push_session();

        assert!(transport.open(&request).await.is_err());
        let mut body = transport.open(&request).await.unwrap();
        assert!(session.send_heartbeat());
        session.close();

        let chunk = body.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"data: {\"type\":\"heartbeat\"}\n\n");
        assert!(body.next().await.is_none());

        assert!(transport.open(&request).await.is_err());
        assert_eq!(transport.requests().len(), 3);
    }
}

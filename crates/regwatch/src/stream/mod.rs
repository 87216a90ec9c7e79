//! Server-push event stream: SSE framing, transports and the reconnecting client.

pub mod backoff;
pub mod client;
pub mod sse;
pub mod status;
pub mod transport;

pub use backoff::Backoff;
pub use client::{EventReceiver, EventStreamClient};
pub use sse::{SseDecoder, SseFrame};
pub use status::ConnectionStatus;
pub use transport::{
    ByteStream, ChannelTransport, HttpTransport, SessionSender, StreamRequest, StreamTransport,
};

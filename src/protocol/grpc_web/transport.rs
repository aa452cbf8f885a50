//! gRPC-Web HTTP transport.
//!
//! Wire format: every frame is a one-byte flag, a four-byte big-endian
//! length and the payload. Flag `0x00` carries a message, flag `0x80` the
//! trailers as `key:value\r\n` lines.

use std::pin::Pin;

use bytes::{Buf, Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::protocol::tls::WebTlsOptions;
use crate::types::StatusCode;

pub const GRPC_STATUS: &str = "grpc-status";
pub const GRPC_MESSAGE: &str = "grpc-message";

const CONTENT_TYPE_GRPC_WEB: &str = "application/grpc-web+proto";
const DATA_FLAG: u8 = 0x00;
const TRAILER_FLAG: u8 = 0x80;
const FRAME_HEADER_LEN: usize = 5;

/// Default number of events buffered between the HTTP body reader and the
/// adapter.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// One gRPC-Web call.
#[derive(Debug, Clone)]
pub struct WebRequest {
    /// Base URL, `http(s)://host[:port]`.
    pub host: String,
    /// `/<package.Service>/<Method>`.
    pub path: String,
    /// Encoded request message, unframed.
    pub body: Bytes,
    pub metadata: HeaderMap,
    pub tls: WebTlsOptions,
}

impl WebRequest {
    pub fn url(&self) -> String {
        format!("{}{}", self.host.trim_end_matches('/'), self.path)
    }
}

/// What the transport observed, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum WebEvent {
    /// One encoded response message.
    Message(Bytes),
    /// Response headers merged with trailers. Always the last event.
    End(HeaderMap),
}

pub type WebEventStream = Pin<Box<dyn Stream<Item = WebEvent> + Send>>;

/// The gRPC-Web wire primitive consumed by the adapter.
pub trait WebTransport: Send + Sync {
    /// Start the call. The stream yields messages and then exactly one `End`.
    fn invoke(&self, request: WebRequest) -> WebEventStream;
}

// ============================================================================
// Framing
// ============================================================================

/// Frame a payload with the given flag.
pub fn encode_frame(flag: u8, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&[flag]);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame.freeze()
}

/// Frame a message as a data frame.
pub fn encode_message(payload: &[u8]) -> Bytes {
    encode_frame(DATA_FLAG, payload)
}

/// Frame trailers as a trailer frame.
pub fn encode_trailers(trailers: &HeaderMap) -> Bytes {
    let mut block = Vec::new();
    for (name, value) in trailers {
        block.extend_from_slice(name.as_str().as_bytes());
        block.push(b':');
        block.extend_from_slice(value.as_bytes());
        block.extend_from_slice(b"\r\n");
    }
    encode_frame(TRAILER_FLAG, &block)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Frame {
    pub(crate) flag: u8,
    pub(crate) payload: Bytes,
}

impl Frame {
    fn is_trailer(&self) -> bool {
        self.flag & TRAILER_FLAG == TRAILER_FLAG
    }
}

/// Incremental frame decoder. Partial input is buffered.
#[derive(Debug, Default)]
pub(crate) struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub(crate) fn next_frame(&mut self) -> Option<Frame> {
        if self.buffer.len() < FRAME_HEADER_LEN {
            return None;
        }
        let flag = self.buffer[0];
        let len = u32::from_be_bytes([
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
            self.buffer[4],
        ]) as usize;
        if self.buffer.len() < FRAME_HEADER_LEN + len {
            return None;
        }
        self.buffer.advance(FRAME_HEADER_LEN);
        let payload = self.buffer.split_to(len).freeze();
        Some(Frame { flag, payload })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Parse a trailer block. Malformed lines are skipped.
pub(crate) fn parse_trailers(block: &[u8]) -> HeaderMap {
    let mut trailers = HeaderMap::new();
    let text = String::from_utf8_lossy(block);
    for line in text.split("\r\n").filter(|line| !line.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            debug!(line, "skipping malformed trailer line");
            continue;
        };
        let name = HeaderName::from_bytes(name.trim().to_ascii_lowercase().as_bytes());
        let value = HeaderValue::from_str(value.trim());
        if let (Ok(name), Ok(value)) = (name, value) {
            trailers.append(name, value);
        }
    }
    trailers
}

/// Header map carrying a synthesized status.
pub(crate) fn status_headers(code: StatusCode, message: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(GRPC_STATUS, HeaderValue::from(code.as_i32()));
    let printable: String = message
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '?' })
        .collect();
    if let Ok(value) = HeaderValue::from_str(&printable) {
        headers.insert(GRPC_MESSAGE, value);
    }
    headers
}

/// Status implied by an HTTP response status when the server sent none.
pub(crate) fn http_status_to_code(status: http::StatusCode) -> StatusCode {
    match status.as_u16() {
        200 => StatusCode::Ok,
        400 => StatusCode::Internal,
        401 => StatusCode::Unauthenticated,
        403 => StatusCode::PermissionDenied,
        404 => StatusCode::Unimplemented,
        429 | 502 | 503 | 504 => StatusCode::Unavailable,
        _ => StatusCode::Unknown,
    }
}

// ============================================================================
// HTTP transport
// ============================================================================

/// [`WebTransport`] over `reqwest`.
///
/// A client is built per call from that call's TLS material. The response
/// body is decoded on a spawned task feeding a bounded channel. Dropping the
/// returned event stream aborts the request.
#[derive(Debug, Clone)]
pub struct HttpWebTransport {
    buffer: usize,
}

impl Default for HttpWebTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpWebTransport {
    pub fn new() -> Self {
        Self {
            buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
        }
    }

    fn client(tls: &WebTlsOptions) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(ca) = &tls.ca {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(ca)?);
        }
        if let (Some(cert), Some(key)) = (&tls.cert, &tls.key) {
            let pem = [cert.as_slice(), b"\n", key.as_slice()].concat();
            builder = builder.identity(reqwest::Identity::from_pem(&pem)?);
        }
        builder.build()
    }

    /// Run the exchange, forwarding messages. Returns the final header map.
    async fn exchange(request: WebRequest, tx: &mpsc::Sender<WebEvent>) -> HeaderMap {
        let client = match Self::client(&request.tls) {
            Ok(client) => client,
            Err(e) => return status_headers(StatusCode::Unknown, &e.to_string()),
        };
        let url = request.url();
        let response = client
            .post(&url)
            .headers(request.metadata)
            .header(CONTENT_TYPE, CONTENT_TYPE_GRPC_WEB)
            .header("x-grpc-web", "1")
            .body(encode_message(&request.body))
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "gRPC-Web request failed");
                return status_headers(StatusCode::Unknown, &e.to_string());
            }
        };

        let status = response.status();
        let mut headers = response.headers().clone();
        if !status.is_success() {
            if !headers.contains_key(GRPC_STATUS) {
                headers.extend(status_headers(
                    http_status_to_code(status),
                    &format!("HTTP status {status}"),
                ));
            }
            return headers;
        }

        let mut decoder = FrameDecoder::default();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    headers.extend(status_headers(StatusCode::Unknown, &e.to_string()));
                    return headers;
                }
            };
            decoder.push(&chunk);
            while let Some(frame) = decoder.next_frame() {
                if frame.is_trailer() {
                    headers.extend(parse_trailers(&frame.payload));
                } else if tx.send(WebEvent::Message(frame.payload)).await.is_err() {
                    // receiver dropped
                    return headers;
                }
            }
        }
        if !decoder.is_empty() {
            headers.extend(status_headers(
                StatusCode::Internal,
                "response body ended inside a frame",
            ));
        }
        headers
    }
}

impl WebTransport for HttpWebTransport {
    fn invoke(&self, request: WebRequest) -> WebEventStream {
        let (tx, rx) = mpsc::channel(self.buffer);
        tokio::spawn(async move {
            // Dropping the exchange aborts the request and closes its connection.
            let end = tokio::select! {
                end = Self::exchange(request, &tx) => end,
                _ = tx.closed() => {
                    debug!("event stream dropped, aborting gRPC-Web exchange");
                    return;
                }
            };
            let _ = tx.send(WebEvent::End(end)).await;
        });
        Box::pin(ReceiverStream::new(rx))
    }
}

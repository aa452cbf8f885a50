//! Stream handles returned by streaming invocations.
//!
//! Every streaming call is driven by one spawned task. The caller holds a
//! handle that pairs a command sender (`write`, `end`, `cancel`) with an
//! event receiver; the handle implements [`Stream`] so events are consumed
//! with `StreamExt::next`.
//!
//! Events travel through a bounded channel of [`DEFAULT_STREAM_BUFFER`]
//! slots; the driver stops pulling from the transport while the caller is
//! behind, so transport flow control applies end to end.
//!
//! Exactly one terminal event is delivered per call. The driver owns an
//! `EventSink` whose `terminated` flag drops anything the transport raises
//! after that point. Dropping a handle cancels the call without further
//! events.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::loader::CallShape;
use crate::telemetry::{self, Direction};
use crate::types::{ErrorValue, ResponseEnvelope, StatusCode};

/// Detail carried by the error emitted when the caller cancels.
pub const CANCELLED_ON_CLIENT: &str = "Cancelled on client";

/// Default number of events buffered between a driver and its handle.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

// ============================================================================
// Driver side
// ============================================================================

/// Caller → driver instruction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StreamCommand {
    Write(Value),
    End,
    Cancel,
}

/// Event classification used by [`EventSink`].
pub(crate) trait StreamEvent {
    /// Status of the outcome if this event ends the call.
    fn terminal_code(&self) -> Option<StatusCode>;

    /// Whether the event carries one inbound message.
    fn is_message(&self) -> bool;
}

/// Driver-owned event producer for one call.
pub(crate) struct EventSink<E: StreamEvent> {
    tx: mpsc::Sender<E>,
    protocol: &'static str,
    call_shape: CallShape,
    started: Instant,
    terminated: bool,
}

impl<E: StreamEvent> EventSink<E> {
    fn new(tx: mpsc::Sender<E>, protocol: &'static str, call_shape: CallShape) -> Self {
        Self {
            tx,
            protocol,
            call_shape,
            started: Instant::now(),
            terminated: false,
        }
    }

    /// Milliseconds since the call was dispatched.
    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub(crate) fn protocol(&self) -> &'static str {
        self.protocol
    }

    /// Deliver an event, waiting for buffer space. Returns `false` once the
    /// call has terminated.
    pub(crate) async fn emit(&mut self, event: E) -> bool {
        if self.terminated {
            debug!(protocol = self.protocol, "event after terminal outcome discarded");
            return false;
        }
        if event.is_message() {
            telemetry::record_message(self.protocol, Direction::Inbound);
        }
        if let Some(code) = event.terminal_code() {
            self.terminated = true;
            telemetry::record_call(self.protocol, self.call_shape, code, self.started);
        }
        if self.tx.send(event).await.is_err() {
            // receiver dropped: the driver notices through its command channel
            debug!(protocol = self.protocol, "event for dropped handle discarded");
        }
        true
    }

    /// Envelope for a successfully decoded message.
    pub(crate) fn ok(&self, value: Value) -> ResponseEnvelope {
        ResponseEnvelope::ok(value, self.elapsed_ms())
    }

    /// Envelope for a transport failure.
    pub(crate) fn failure(&self, status: &tonic::Status) -> ResponseEnvelope {
        ResponseEnvelope::from_status(status, self.elapsed_ms())
    }

    /// Envelope for a caller-initiated cancellation.
    pub(crate) fn cancelled(&self) -> ResponseEnvelope {
        ResponseEnvelope::failure(
            StatusCode::Cancelled,
            self.elapsed_ms(),
            ErrorValue::new(CANCELLED_ON_CLIENT),
        )
    }
}

impl<E: StreamEvent> Drop for EventSink<E> {
    fn drop(&mut self) {
        if !self.terminated {
            telemetry::record_call(
                self.protocol,
                self.call_shape,
                StatusCode::Cancelled,
                self.started,
            );
        }
    }
}

/// Command and event channels shared by every handle kind.
struct Channels<E> {
    commands: mpsc::UnboundedSender<StreamCommand>,
    events: mpsc::Receiver<E>,
}

impl<E> Channels<E> {
    fn send(&self, command: StreamCommand) {
        if self.commands.send(command).is_err() {
            debug!("command after stream completion ignored");
        }
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<E>> {
        self.events.poll_recv(cx)
    }
}

/// Driver-side halves handed to the spawned task.
pub(crate) struct Driver<E: StreamEvent> {
    pub(crate) commands: mpsc::UnboundedReceiver<StreamCommand>,
    pub(crate) sink: EventSink<E>,
}

fn open<E: StreamEvent>(
    protocol: &'static str,
    call_shape: CallShape,
) -> (Channels<E>, Driver<E>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(DEFAULT_STREAM_BUFFER);
    (
        Channels {
            commands: command_tx,
            events: event_rx,
        },
        Driver {
            commands: command_rx,
            sink: EventSink::new(event_tx, protocol, call_shape),
        },
    )
}

// ============================================================================
// Client streaming
// ============================================================================

/// Events of a client-streaming call. Exactly one is delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientStreamEvent {
    Response(ResponseEnvelope),
    Error(ResponseEnvelope),
}

impl StreamEvent for ClientStreamEvent {
    fn terminal_code(&self) -> Option<StatusCode> {
        match self {
            Self::Response(envelope) | Self::Error(envelope) => Some(envelope.code()),
        }
    }

    fn is_message(&self) -> bool {
        matches!(self, Self::Response(_))
    }
}

/// Handle to an in-flight client-streaming call.
pub struct ClientStream {
    channels: Channels<ClientStreamEvent>,
}

impl ClientStream {
    pub(crate) fn open(protocol: &'static str) -> (Self, Driver<ClientStreamEvent>) {
        let (channels, driver) = open(protocol, CallShape::ClientStreaming);
        (Self { channels }, driver)
    }

    /// Queue one request message. Ignored after [`end`](Self::end).
    pub fn write(&self, payload: Value) {
        self.channels.send(StreamCommand::Write(payload));
    }

    /// Close the request stream; the single response follows.
    pub fn end(&self) {
        self.channels.send(StreamCommand::End);
    }

    /// Cancel the call. An `Error` event with `CANCELLED` follows.
    pub fn cancel(&self) {
        self.channels.send(StreamCommand::Cancel);
    }
}

impl Stream for ClientStream {
    type Item = ClientStreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().channels.poll_event(cx)
    }
}

// ============================================================================
// Server streaming
// ============================================================================

/// Events of a server-streaming call.
///
/// Any number of `Response`s, then one of `Error`, `End` or `Cancelled`.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerStreamEvent {
    Response(ResponseEnvelope),
    Error(ResponseEnvelope),
    End,
    Cancelled,
}

impl StreamEvent for ServerStreamEvent {
    fn terminal_code(&self) -> Option<StatusCode> {
        match self {
            Self::Response(_) => None,
            Self::Error(envelope) => Some(envelope.code()),
            Self::End => Some(StatusCode::Ok),
            Self::Cancelled => Some(StatusCode::Cancelled),
        }
    }

    fn is_message(&self) -> bool {
        matches!(self, Self::Response(_))
    }
}

/// Handle to an in-flight server-streaming call.
pub struct ServerStream {
    channels: Channels<ServerStreamEvent>,
}

impl ServerStream {
    pub(crate) fn open(
        protocol: &'static str,
    ) -> (Self, Driver<ServerStreamEvent>) {
        let (channels, driver) = open(protocol, CallShape::ServerStreaming);
        (Self { channels }, driver)
    }

    /// Cancel the call. A `Cancelled` event follows.
    pub fn cancel(&self) {
        self.channels.send(StreamCommand::Cancel);
    }
}

impl Stream for ServerStream {
    type Item = ServerStreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().channels.poll_event(cx)
    }
}

// ============================================================================
// Bidirectional streaming
// ============================================================================

/// Events of a bidirectional call.
///
/// Any number of `Response`s, then one of `Error` or `EndServerStream`.
#[derive(Debug, Clone, PartialEq)]
pub enum BidiStreamEvent {
    Response(ResponseEnvelope),
    Error(ResponseEnvelope),
    /// The inbound half completed; the outbound half is still the caller's.
    EndServerStream,
}

impl StreamEvent for BidiStreamEvent {
    fn terminal_code(&self) -> Option<StatusCode> {
        match self {
            Self::Response(_) => None,
            Self::Error(envelope) => Some(envelope.code()),
            Self::EndServerStream => Some(StatusCode::Ok),
        }
    }

    fn is_message(&self) -> bool {
        matches!(self, Self::Response(_))
    }
}

/// Handle to an in-flight bidirectional call.
pub struct BidiStream {
    channels: Channels<BidiStreamEvent>,
}

impl BidiStream {
    pub(crate) fn open(protocol: &'static str) -> (Self, Driver<BidiStreamEvent>) {
        let (channels, driver) = open(protocol, CallShape::BidirectionalStreaming);
        (Self { channels }, driver)
    }

    /// Queue one request message. Ignored after [`end_client_stream`](Self::end_client_stream).
    pub fn write(&self, payload: Value) {
        self.channels.send(StreamCommand::Write(payload));
    }

    /// Close the outbound half. Responses keep arriving until the server ends.
    pub fn end_client_stream(&self) {
        self.channels.send(StreamCommand::End);
    }

    /// Cancel the call. An `Error` event with `CANCELLED` follows.
    pub fn cancel(&self) {
        self.channels.send(StreamCommand::Cancel);
    }
}

impl Stream for BidiStream {
    type Item = BidiStreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().channels.poll_event(cx)
    }
}

//! Per-call driver tasks shared by the adapters.
//!
//! Each driver races the transport against the caller's commands and turns
//! whatever the transport raises into stream events. Returning from a driver
//! drops the transport call, which cancels it on the wire.

use std::future::Future;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use prost_reflect::MessageDescriptor;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::Status;
use tracing::debug;

use crate::codec;
use crate::stream::{
    BidiStreamEvent, ClientStreamEvent, Driver, EventSink, ServerStreamEvent, StreamCommand,
    StreamEvent,
};
use crate::telemetry::{self, Direction};
use crate::types::ResponseEnvelope;

/// Outbound request messages handed to a transport.
pub type RequestStream = Pin<Box<dyn Stream<Item = Value> + Send + 'static>>;

/// Inbound response messages produced by a transport.
pub type ResponseStream =
    Pin<Box<dyn Stream<Item = std::result::Result<Value, Status>> + Send + 'static>>;

/// Writer half of an outbound request stream.
pub(crate) struct Outbound {
    tx: Option<mpsc::UnboundedSender<Value>>,
    input: MessageDescriptor,
    protocol: &'static str,
}

impl Outbound {
    pub(crate) fn new(input: MessageDescriptor, protocol: &'static str) -> (Self, RequestStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let outbound = Self {
            tx: Some(tx),
            input,
            protocol,
        };
        (outbound, Box::pin(UnboundedReceiverStream::new(rx)))
    }

    /// Validate and forward one message. Writes after `end` are ignored.
    fn write(&mut self, payload: Value) -> std::result::Result<(), Status> {
        let Some(tx) = &self.tx else {
            debug!("write after end of request stream ignored");
            return Ok(());
        };
        codec::to_message(&self.input, &payload)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        if tx.send(payload).is_ok() {
            telemetry::record_message(self.protocol, Direction::Outbound);
        }
        Ok(())
    }

    fn end(&mut self) {
        self.tx = None;
    }
}

/// Apply one caller command. Returns `false` when the call is over.
async fn apply<E: StreamEvent>(
    command: Option<StreamCommand>,
    outbound: &mut Outbound,
    sink: &mut EventSink<E>,
    error: fn(ResponseEnvelope) -> E,
) -> bool {
    match command {
        Some(StreamCommand::Write(payload)) => match outbound.write(payload) {
            Ok(()) => true,
            Err(status) => {
                sink.emit(error(sink.failure(&status))).await;
                false
            }
        },
        Some(StreamCommand::End) => {
            outbound.end();
            true
        }
        Some(StreamCommand::Cancel) => {
            sink.emit(error(sink.cancelled())).await;
            false
        }
        None => {
            debug!(protocol = sink.protocol(), "stream handle dropped, cancelling call");
            false
        }
    }
}

/// Resolves to `true` on a cancel command, `false` once the handle is gone.
async fn cancel_requested(commands: &mut mpsc::UnboundedReceiver<StreamCommand>) -> bool {
    loop {
        match commands.recv().await {
            Some(StreamCommand::Cancel) => return true,
            Some(command) => debug!(?command, "command ignored on server stream"),
            None => return false,
        }
    }
}

pub(crate) async fn client_stream<F>(
    call: F,
    mut outbound: Outbound,
    driver: Driver<ClientStreamEvent>,
) where
    F: Future<Output = std::result::Result<Value, Status>>,
{
    let Driver {
        mut commands,
        mut sink,
    } = driver;
    tokio::pin!(call);
    loop {
        tokio::select! {
            result = &mut call => {
                let event = match result {
                    Ok(value) => ClientStreamEvent::Response(sink.ok(value)),
                    Err(status) => ClientStreamEvent::Error(sink.failure(&status)),
                };
                sink.emit(event).await;
                return;
            }
            command = commands.recv() => {
                if !apply(command, &mut outbound, &mut sink, ClientStreamEvent::Error).await {
                    return;
                }
            }
        }
    }
}

pub(crate) async fn server_stream<F>(open: F, driver: Driver<ServerStreamEvent>)
where
    F: Future<Output = std::result::Result<ResponseStream, Status>>,
{
    let Driver {
        mut commands,
        mut sink,
    } = driver;
    let mut responses = tokio::select! {
        result = open => match result {
            Ok(responses) => responses,
            Err(status) => {
                sink.emit(ServerStreamEvent::Error(sink.failure(&status))).await;
                return;
            }
        },
        cancel = cancel_requested(&mut commands) => {
            if cancel {
                sink.emit(ServerStreamEvent::Cancelled).await;
            }
            return;
        }
    };
    // Commands are checked first so a cancel is not queued behind responses.
    loop {
        tokio::select! {
            biased;
            cancel = cancel_requested(&mut commands) => {
                if cancel {
                    sink.emit(ServerStreamEvent::Cancelled).await;
                }
                return;
            }
            item = responses.next() => match item {
                Some(Ok(value)) => {
                    sink.emit(ServerStreamEvent::Response(sink.ok(value))).await;
                }
                Some(Err(status)) => {
                    sink.emit(ServerStreamEvent::Error(sink.failure(&status))).await;
                    return;
                }
                None => {
                    sink.emit(ServerStreamEvent::End).await;
                    return;
                }
            },
        }
    }
}

pub(crate) async fn bidi_stream<F>(
    open: F,
    mut outbound: Outbound,
    driver: Driver<BidiStreamEvent>,
) where
    F: Future<Output = std::result::Result<ResponseStream, Status>>,
{
    let Driver {
        mut commands,
        mut sink,
    } = driver;
    tokio::pin!(open);
    // Requests keep flowing while the response headers are pending.
    let mut responses = loop {
        tokio::select! {
            result = &mut open => match result {
                Ok(responses) => break responses,
                Err(status) => {
                    sink.emit(BidiStreamEvent::Error(sink.failure(&status))).await;
                    return;
                }
            },
            command = commands.recv() => {
                if !apply(command, &mut outbound, &mut sink, BidiStreamEvent::Error).await {
                    return;
                }
            }
        }
    };
    loop {
        tokio::select! {
            biased;
            command = commands.recv() => {
                if !apply(command, &mut outbound, &mut sink, BidiStreamEvent::Error).await {
                    return;
                }
            }
            item = responses.next() => match item {
                Some(Ok(value)) => {
                    sink.emit(BidiStreamEvent::Response(sink.ok(value))).await;
                }
                Some(Err(status)) => {
                    sink.emit(BidiStreamEvent::Error(sink.failure(&status))).await;
                    return;
                }
                None => {
                    sink.emit(BidiStreamEvent::EndServerStream).await;
                    return;
                }
            },
        }
    }
}

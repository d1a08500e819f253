// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Websocket transport. Writes go through an unbounded channel to a dedicated writer task, so
//! any thread can send without awaiting; the read half is owned by the client's receive loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures_util::stream::{SplitStream, StreamExt};
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::ClientError;

/// The write side of a connection, as seen by the client.
pub trait Transport: Send + Sync {
    fn send_text(&self, text: String) -> Result<(), ClientError>;
    /// A transport-level ping, not an application request.
    fn ping(&self, payload: Vec<u8>) -> Result<(), ClientError>;
    /// Close the connection and wake the reader. Idempotent.
    fn close(&self);
    fn is_open(&self) -> bool;
}

/// An inbound frame worth the client's attention.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(Bytes),
    /// Ping, pong, close or binary. Only counts as proof of life.
    Control,
}

#[derive(Debug)]
pub enum Received {
    Frame(Frame),
    /// The peer sent a text frame that was not valid UTF-8.
    Corrupt,
    /// The transport was closed from our side.
    Cancelled,
    /// The peer ended the connection.
    Closed,
    /// Reading failed.
    Failed(String),
}

pub struct WsTransport {
    outbound: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsReader {
    stream: SplitStream<WsStream>,
    cancel: CancellationToken,
}

/// Connect to `endpoint`, returning the write side and the read side.
pub async fn open(endpoint: &str) -> Result<(Arc<WsTransport>, WsReader), ClientError> {
    let (stream, _response) =
        connect_async(endpoint)
            .await
            .map_err(|e| ClientError::CouldNotConnect {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
    let (mut sink, read) = stream.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let open = Arc::new(AtomicBool::new(true));
    let cancel = CancellationToken::new();

    let writer_open = open.clone();
    tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = sink.send(message).await {
                warn!(error = %e, "Websocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
        writer_open.store(false, Ordering::Release);
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Websocket did not close cleanly");
        }
    });

    let transport = Arc::new(WsTransport {
        outbound,
        open,
        cancel: cancel.clone(),
    });
    Ok((
        transport,
        WsReader {
            stream: read,
            cancel,
        },
    ))
}

impl Transport for WsTransport {
    fn send_text(&self, text: String) -> Result<(), ClientError> {
        if !self.is_open() {
            return Err(ClientError::NotConnected);
        }
        self.outbound
            .send(Message::text(text))
            .map_err(|_| ClientError::Transport("websocket writer has stopped".to_string()))
    }

    fn ping(&self, payload: Vec<u8>) -> Result<(), ClientError> {
        if !self.is_open() {
            return Err(ClientError::NotConnected);
        }
        self.outbound
            .send(Message::Ping(payload.into()))
            .map_err(|_| ClientError::Transport("websocket writer has stopped".to_string()))
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            // The writer may already be gone.
            let _ = self.outbound.send(Message::Close(None));
        }
        self.cancel.cancel();
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.outbound.is_closed()
    }
}

impl WsReader {
    pub async fn recv(&mut self) -> Received {
        select! {
            _ = self.cancel.cancelled() => Received::Cancelled,
            message = self.stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    Received::Frame(Frame::Text(Bytes::copy_from_slice(text.as_bytes())))
                }
                Some(Ok(_)) => Received::Frame(Frame::Control),
                Some(Err(Error::Utf8 { .. })) => Received::Corrupt,
                Some(Err(Error::ConnectionClosed | Error::AlreadyClosed)) | None => {
                    Received::Closed
                }
                Some(Err(e)) => Received::Failed(e.to_string()),
            },
        }
    }
}
